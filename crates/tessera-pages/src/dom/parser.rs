//! Markup parser built on nom parser combinators.
//!
//! Accepts the markup subset the SSR renderer emits plus what hand-written
//! fixtures typically contain: elements with quoted, unquoted or bare
//! attributes, void and self-closing elements, text with the common
//! entities, comments, and a leading doctype.

use nom::{
	IResult, Parser,
	branch::alt,
	bytes::complete::{tag, tag_no_case, take_until, take_while1},
	character::complete::{char, multispace0, multispace1},
	combinator::{map, opt, value},
	error::{ErrorKind, ParseError},
	multi::many0,
	sequence::{delimited, preceded},
};

use crate::error::{MarkupError, MarkupResult};
use crate::view::is_void_element;

/// A parsed node.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Markup {
	Element {
		tag: String,
		attributes: Vec<(String, String)>,
		children: Vec<Markup>,
	},
	Text(String),
	Comment(String),
}

#[derive(Debug)]
enum Failure<'a> {
	Nom(&'a str, ErrorKind),
	Unbalanced { expected: String, found: String },
}

impl<'a> ParseError<&'a str> for Failure<'a> {
	fn from_error_kind(input: &'a str, kind: ErrorKind) -> Self {
		Failure::Nom(input, kind)
	}

	fn append(_input: &'a str, _kind: ErrorKind, other: Self) -> Self {
		other
	}
}

type PResult<'a, O> = IResult<&'a str, O, Failure<'a>>;

/// Parse a markup fragment into top-level nodes.
pub(crate) fn parse_markup(source: &str) -> MarkupResult<Vec<Markup>> {
	let offset = |rest: &str| source.len() - rest.len();

	let (rest, _) = opt(doctype).parse(source).map_err(|err| to_markup_error(source, err))?;
	let (rest, nodes) = many0(node)
		.parse(rest)
		.map_err(|err| to_markup_error(source, err))?;
	if !rest.is_empty() {
		return Err(MarkupError::TrailingInput(offset(rest)));
	}
	Ok(nodes)
}

fn to_markup_error(source: &str, err: nom::Err<Failure<'_>>) -> MarkupError {
	match err {
		nom::Err::Incomplete(_) => MarkupError::Syntax {
			offset: source.len(),
			message: "unexpected end of input".to_string(),
		},
		nom::Err::Error(failure) | nom::Err::Failure(failure) => match failure {
			Failure::Nom(rest, kind) => MarkupError::Syntax {
				offset: source.len() - rest.len(),
				message: kind.description().to_string(),
			},
			Failure::Unbalanced { expected, found } => MarkupError::UnbalancedTag { expected, found },
		},
	}
}

fn doctype(input: &str) -> PResult<'_, ()> {
	value(
		(),
		(tag_no_case("<!doctype"), take_until(">"), char('>'), multispace0),
	)
	.parse(input)
}

fn node(input: &str) -> PResult<'_, Markup> {
	alt((comment, element, text)).parse(input)
}

fn comment(input: &str) -> PResult<'_, Markup> {
	map(
		delimited(tag("<!--"), take_until("-->"), tag("-->")),
		|body: &str| Markup::Comment(body.to_string()),
	)
	.parse(input)
}

fn text(input: &str) -> PResult<'_, Markup> {
	map(take_while1(|c: char| c != '<'), |raw: &str| {
		Markup::Text(decode_entities(raw))
	})
	.parse(input)
}

fn tag_name(input: &str) -> PResult<'_, &str> {
	take_while1(|c: char| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | ':')).parse(input)
}

fn attr_name(input: &str) -> PResult<'_, &str> {
	take_while1(|c: char| !c.is_whitespace() && !matches!(c, '=' | '>' | '/' | '"' | '\'' | '<'))
		.parse(input)
}

fn attr_value(input: &str) -> PResult<'_, &str> {
	alt((
		delimited(char('"'), take_until("\""), char('"')),
		delimited(char('\''), take_until("'"), char('\'')),
		take_while1(|c: char| !c.is_whitespace() && c != '>'),
	))
	.parse(input)
}

/// Parse `name`, `name=value`, `name="value"` or `name='value'`.
fn attribute(input: &str) -> PResult<'_, (String, String)> {
	let (input, name) = attr_name(input)?;
	let (input, raw) =
		opt(preceded((multispace0, char('='), multispace0), attr_value)).parse(input)?;
	Ok((
		input,
		(
			name.to_ascii_lowercase(),
			raw.map(decode_entities).unwrap_or_default(),
		),
	))
}

/// Parse an opening tag; the flag is set for `/>`.
fn open_tag(input: &str) -> PResult<'_, (&str, Vec<(String, String)>, bool)> {
	let (input, (_, name, attributes, _, self_closing)) = (
		char('<'),
		tag_name,
		many0(preceded(multispace1, attribute)),
		multispace0,
		alt((value(true, tag("/>")), value(false, tag(">")))),
	)
		.parse(input)?;
	Ok((input, (name, attributes, self_closing)))
}

fn close_tag(input: &str) -> PResult<'_, &str> {
	delimited(tag("</"), tag_name, preceded(multispace0, char('>'))).parse(input)
}

fn element(input: &str) -> PResult<'_, Markup> {
	let (input, (name, attributes, self_closing)) = open_tag(input)?;
	let tag = name.to_ascii_lowercase();
	if self_closing || is_void_element(&tag) {
		return Ok((
			input,
			Markup::Element {
				tag,
				attributes,
				children: Vec::new(),
			},
		));
	}

	let (input, children) = many0(node).parse(input)?;
	let (rest, closing) = match close_tag(input) {
		Ok(parsed) => parsed,
		Err(nom::Err::Error(_)) => {
			return Err(nom::Err::Failure(Failure::from_error_kind(
				input,
				ErrorKind::Tag,
			)));
		}
		Err(err) => return Err(err),
	};
	if !closing.eq_ignore_ascii_case(&tag) {
		return Err(nom::Err::Failure(Failure::Unbalanced {
			expected: tag,
			found: closing.to_string(),
		}));
	}
	Ok((
		rest,
		Markup::Element {
			tag,
			attributes,
			children,
		},
	))
}

fn decode_entities(raw: &str) -> String {
	if !raw.contains('&') {
		return raw.to_string();
	}
	raw.replace("&lt;", "<")
		.replace("&gt;", ">")
		.replace("&quot;", "\"")
		.replace("&#39;", "'")
		.replace("&#x27;", "'")
		.replace("&nbsp;", "\u{a0}")
		.replace("&amp;", "&")
}
