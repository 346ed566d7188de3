//! Integration tests for the signal graph
//!
//! Covers delivery semantics across signals, derived values and
//! subscriptions:
//! 1. Equal writes never notify
//! 2. Batched writes notify each subscriber once with final values
//! 3. Derived nodes only notify when their value changes
//! 4. Faulty subscribers do not stop their siblings
//! 5. Scheduler ticks coalesce back-to-back writes

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use futures::executor::LocalPool;
use rstest::{fixture, rstest};
use tessera_reactive::{Derived, ReactiveError, Runtime, Signal};

type Log<T> = Rc<RefCell<Vec<T>>>;

#[fixture]
fn rt() -> Runtime {
	Runtime::new()
}

fn recorder<T: Clone + 'static>() -> (Log<T>, impl Fn(&T) + 'static) {
	let log: Log<T> = Rc::new(RefCell::new(Vec::new()));
	let sink = log.clone();
	(log, move |value: &T| sink.borrow_mut().push(value.clone()))
}

/// Two subscribers on one signal; an equal write after a delivered write
/// fires nothing.
#[rstest]
fn test_two_subscribers_then_equal_write(rt: Runtime) {
	let signal = Signal::new(&rt, 0);
	let (first_log, first) = recorder::<i32>();
	let (second_log, second) = recorder::<i32>();
	let _first = signal.subscribe(first);
	let _second = signal.subscribe(second);

	signal.set(1);
	rt.flush();
	assert_eq!(*first_log.borrow(), vec![1]);
	assert_eq!(*second_log.borrow(), vec![1]);

	signal.set(1);
	rt.flush();
	assert_eq!(*first_log.borrow(), vec![1]);
	assert_eq!(*second_log.borrow(), vec![1]);
}

#[rstest]
#[case(1)]
#[case(5)]
#[case(50)]
fn test_batch_notifies_once(rt: Runtime, #[case] writes: i32) {
	let a = Signal::new(&rt, 0);
	let b = Signal::new(&rt, 0);
	let sum = Derived::new(&rt, {
		let (a, b) = (a.clone(), b.clone());
		move |cx| cx.get(&a) + cx.get(&b)
	});
	let (a_log, a_cb) = recorder::<i32>();
	let (sum_log, sum_cb) = recorder::<i32>();
	let _a = a.subscribe(a_cb);
	let _sum = sum.subscribe(sum_cb);

	rt.batch(|| {
		for i in 1..=writes {
			a.set(i);
			b.set(i * 10);
		}
	});

	assert_eq!(*a_log.borrow(), vec![writes]);
	assert_eq!(*sum_log.borrow(), vec![writes * 11]);
}

#[rstest]
fn test_nested_batch_flushes_at_outermost_exit(rt: Runtime) {
	let signal = Signal::new(&rt, 0);
	let (log, cb) = recorder::<i32>();
	let _sub = signal.subscribe(cb);

	rt.batch(|| {
		signal.set(1);
		rt.batch(|| signal.set(2));
		assert!(log.borrow().is_empty());
		signal.set(3);
	});
	assert_eq!(*log.borrow(), vec![3]);
}

#[rstest]
fn test_round_trip_inside_batch_is_suppressed(rt: Runtime) {
	let signal = Signal::new(&rt, 0);
	let (log, cb) = recorder::<i32>();
	let _sub = signal.subscribe(cb);

	rt.batch(|| {
		signal.set(5);
		signal.set(0);
	});
	assert!(log.borrow().is_empty());
}

#[rstest]
fn test_derived_notifies_only_on_change(rt: Runtime) {
	let count = Signal::new(&rt, 1);
	let parity = count.map(|n| n % 2 == 0);
	let (log, cb) = recorder::<bool>();
	let _sub = parity.subscribe(cb);

	count.set(3);
	rt.flush();
	assert!(log.borrow().is_empty());

	count.set(4);
	rt.flush();
	assert_eq!(*log.borrow(), vec![true]);
}

#[rstest]
fn test_diamond_recomputes_once_without_glitch(rt: Runtime) {
	let source = Signal::new(&rt, 1);
	let left = source.map(|n| n + 1);
	let right = source.map(|n| n * 10);
	let computations = Rc::new(Cell::new(0));
	let joined = Derived::new(&rt, {
		let (left, right, computations) = (left.clone(), right.clone(), computations.clone());
		move |cx| {
			computations.set(computations.get() + 1);
			(cx.get(&left), cx.get(&right))
		}
	});
	let (log, cb) = recorder::<(i32, i32)>();
	let _sub = joined.subscribe(cb);
	computations.set(0);

	source.set(2);
	rt.flush();
	assert_eq!(computations.get(), 1);
	assert_eq!(*log.borrow(), vec![(3, 20)]);
}

/// A derived node moves onto a deeper input chain without changing its
/// value; its dependent must still be ordered after the new chain.
#[rstest]
fn test_switching_to_deeper_chain_keeps_dependents_ordered(rt: Runtime) {
	let direct = Signal::new(&rt, true);
	let a = Signal::new(&rt, 1);
	let hop = a.map(|n| *n);
	let deep = hop.map(|n| *n);
	let picked = Derived::new(&rt, {
		let (direct, a, deep) = (direct.clone(), a.clone(), deep.clone());
		move |cx| {
			if cx.get(&direct) {
				cx.get(&a)
			} else {
				cx.get(&deep)
			}
		}
	});
	let seen_inputs = Rc::new(RefCell::new(Vec::new()));
	let total = Derived::new(&rt, {
		let (picked, a, seen_inputs) = (picked.clone(), a.clone(), seen_inputs.clone());
		move |cx| {
			let inputs = (cx.get(&picked), cx.get(&a));
			seen_inputs.borrow_mut().push(inputs);
			inputs.0 + inputs.1
		}
	});
	let (log, cb) = recorder::<i32>();
	let _sub = total.subscribe(cb);

	direct.set(false);
	rt.flush();
	assert!(log.borrow().is_empty());
	seen_inputs.borrow_mut().clear();

	a.set(10);
	let summary = rt.try_flush().unwrap();
	assert_eq!(*log.borrow(), vec![20]);
	assert_eq!(summary.notified, 1);
	assert_eq!(*seen_inputs.borrow(), vec![(10, 10)]);
}

#[rstest]
fn test_panicking_subscriber_does_not_stop_siblings(rt: Runtime) {
	let signal = Signal::new(&rt, 0);
	let (before_log, before) = recorder::<i32>();
	let (after_log, after) = recorder::<i32>();
	let _before = signal.subscribe(before);
	let _faulty = signal.subscribe(|n: &i32| {
		if *n > 0 {
			panic!("listener failure");
		}
	});
	let _after = signal.subscribe(after);

	signal.set(1);
	let summary = rt.try_flush().unwrap();
	assert_eq!(summary.faults, 1);
	assert_eq!(summary.notified, 3);
	assert_eq!(*before_log.borrow(), vec![1]);
	assert_eq!(*after_log.borrow(), vec![1]);

	// The graph keeps working for later writes.
	signal.set(2);
	rt.flush();
	assert_eq!(*after_log.borrow(), vec![1, 2]);
	assert_eq!(rt.fault_count(), 2);
}

#[rstest]
fn test_unsubscribe_before_flush_cancels_delivery(rt: Runtime) {
	let signal = Signal::new(&rt, 0);
	let (log, cb) = recorder::<i32>();
	let sub = signal.subscribe(cb);

	signal.set(1);
	sub.unsubscribe();
	rt.flush();
	assert!(log.borrow().is_empty());
}

#[rstest]
fn test_subscriber_released_mid_flush_is_skipped(rt: Runtime) {
	let signal = Signal::new(&rt, 0);
	let (log, cb) = recorder::<i32>();
	let victim = Rc::new(RefCell::new(None));
	let killer = {
		let victim = victim.clone();
		signal.subscribe(move |_| {
			if let Some(sub) = victim.borrow_mut().take() {
				drop::<tessera_reactive::Subscription>(sub);
			}
		})
	};
	*victim.borrow_mut() = Some(signal.subscribe(cb));

	signal.set(1);
	rt.flush();
	assert!(log.borrow().is_empty());
	drop(killer);
}

#[rstest]
fn test_writes_from_subscribers_run_in_next_round(rt: Runtime) {
	let input = Signal::new(&rt, 0);
	let echo = Signal::new(&rt, 0);
	let (log, cb) = recorder::<i32>();
	let _forward = input.subscribe({
		let echo = echo.clone();
		move |n| {
			echo.set(*n * 2);
		}
	});
	let _echo = echo.subscribe(cb);

	input.set(4);
	let summary = rt.try_flush().unwrap();
	assert_eq!(summary.rounds, 2);
	assert_eq!(*log.borrow(), vec![8]);
}

#[rstest]
fn test_runaway_feedback_hits_round_limit(rt: Runtime) {
	let counter = Signal::new(&rt, 0_usize);
	let _loop = counter.subscribe({
		let counter = counter.clone();
		move |n| {
			counter.set(n + 1);
		}
	});

	counter.set(1);
	let err = rt.try_flush().unwrap_err();
	assert!(matches!(err, ReactiveError::RoundLimit(_)));
	assert!(!rt.has_pending());
}

#[rstest]
fn test_flush_from_subscriber_is_reentrant_noop(rt: Runtime) {
	let signal = Signal::new(&rt, 0);
	let inner_result = Rc::new(RefCell::new(None));
	let _sub = signal.subscribe({
		let (rt, inner_result) = (rt.clone(), inner_result.clone());
		move |_| {
			*inner_result.borrow_mut() = Some(rt.try_flush());
		}
	});

	signal.set(1);
	rt.flush();
	assert_eq!(
		*inner_result.borrow(),
		Some(Err(ReactiveError::Reentrant))
	);
}

#[rstest]
fn test_spawner_scheduler_coalesces_writes() {
	let mut pool = LocalPool::new();
	let rt = Runtime::with_spawner(pool.spawner());
	let signal = Signal::new(&rt, 0);
	let (log, cb) = recorder::<i32>();
	let _sub = signal.subscribe(cb);

	signal.set(1);
	signal.set(2);
	signal.set(3);
	assert!(log.borrow().is_empty());

	pool.run_until_stalled();
	assert_eq!(*log.borrow(), vec![3]);

	signal.set(4);
	pool.run_until_stalled();
	assert_eq!(*log.borrow(), vec![3, 4]);
}

#[rstest]
fn test_dropping_everything_leaves_empty_graph(rt: Runtime) {
	{
		let a = Signal::new(&rt, 1);
		let b = a.map(|n| n + 1);
		let c = b.map(|n| n * 2);
		let _sub = c.subscribe(|_| {});
		assert_eq!(rt.node_count(), 3);
	}
	assert_eq!(rt.node_count(), 0);
}
