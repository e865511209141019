//! Selector parser for custom tracker matchers
//!
//! Parses the label selector syntax used in custom tracker configuration:
//!
//! ```text
//! {job="api"}
//! {job="api", env=~"prod-.*", team!="infra"}
//! ```
//!
//! Supports all four label matching operators: `=`, `!=`, `=~`, `!~`.

use nom::{
    branch::alt,
    bytes::complete::{tag, take_while, take_while1},
    character::complete::{char, multispace0},
    combinator::value,
    multi::separated_list1,
    sequence::delimited,
    IResult, Parser,
};

use super::MatchOp;
use crate::error::Error;

/// Parse a full selector string into `(name, op, value)` triples
///
/// The whole input must be consumed; trailing garbage is an error.
pub(crate) fn parse_selector(input: &str) -> Result<Vec<(String, MatchOp, String)>, Error> {
    match parse_label_matchers(input.trim()) {
        Ok((remaining, matchers)) => {
            if remaining.trim().is_empty() {
                Ok(matchers)
            } else {
                Err(Error::InvalidMatcher {
                    selector: input.to_string(),
                    reason: format!("unexpected trailing input: {:?}", remaining.trim()),
                })
            }
        }
        Err(e) => Err(Error::InvalidMatcher {
            selector: input.to_string(),
            reason: format!("{e:?}"),
        }),
    }
}

/// Parse a braced matcher list: `{label1="value1", label2!="value2"}`
///
/// At least one matcher is required; `{}` does not parse.
fn parse_label_matchers(input: &str) -> IResult<&str, Vec<(String, MatchOp, String)>> {
    delimited(
        (multispace0, char('{')),
        separated_list1((multispace0, char(','), multispace0), parse_label_matcher),
        (multispace0, char('}')),
    )
    .parse(input)
}

/// Parse a single matcher: name, operator, quoted value
fn parse_label_matcher(input: &str) -> IResult<&str, (String, MatchOp, String)> {
    let (input, _) = multispace0(input)?;
    let (input, name) = parse_label_name(input)?;
    let (input, _) = multispace0(input)?;

    // =~ and !~ must be tried before = and !=
    let (input, op) = alt((
        value(MatchOp::Re, tag("=~")),
        value(MatchOp::NotRe, tag("!~")),
        value(MatchOp::Ne, tag("!=")),
        value(MatchOp::Eq, tag("=")),
    ))
    .parse(input)?;

    let (input, _) = multispace0(input)?;
    let (input, val) = parse_string_value(input)?;

    Ok((input, (name.to_string(), op, val.to_string())))
}

/// Parse a label name
fn parse_label_name(input: &str) -> IResult<&str, &str> {
    take_while1(|c: char| c.is_alphanumeric() || c == '_')(input)
}

/// Parse a quoted string value
fn parse_string_value(input: &str) -> IResult<&str, &str> {
    alt((
        delimited(char('"'), take_while(|c| c != '"'), char('"')),
        delimited(char('\''), take_while(|c| c != '\''), char('\'')),
    ))
    .parse(input)
}
