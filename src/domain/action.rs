//! Actions and the gateway that parses relay text into them.
//!
//! The relay never interprets actions itself. It hands each inbound line to
//! an [`ActionGateway`] and only cares whether parsing succeeded and whether
//! the result was empty. [`LineParser`] is the default gateway.

use std::fmt;

/// One structured command parsed from a line of relay text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Action {
    /// Action name, e.g. `reload`.
    pub name: String,
    /// Optional argument, e.g. the `ready` in `status:ready`.
    pub argument: Option<String>,
}

impl Action {
    /// Creates an action without an argument.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            argument: None,
        }
    }

    /// Creates an action carrying an argument.
    #[must_use]
    pub fn with_argument(name: impl Into<String>, argument: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            argument: Some(argument.into()),
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.argument {
            Some(arg) => write!(f, "{}({arg})", self.name),
            None => write!(f, "{}", self.name),
        }
    }
}

/// Why a line was rejected by the gateway.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    /// An action name was empty or contained invalid characters. Carries
    /// a short excerpt of the offending text.
    #[error("invalid action name near `{0}`")]
    InvalidName(String),

    /// A `(` argument was never closed.
    #[error("unterminated argument for action: {0}")]
    Unterminated(String),

    /// Something other than `+` followed a complete action.
    #[error("unexpected {found:?} after action: {action}")]
    Unexpected {
        /// Action that was just parsed.
        action: String,
        /// Offending character.
        found: char,
    },
}

/// Turns one line of relay text into an ordered list of actions.
///
/// An empty `Ok` is a well-formed line with nothing to do; relays reject it
/// separately from an `Err`.
pub trait ActionGateway: Send + Sync + fmt::Debug {
    /// Parses `line` into actions.
    ///
    /// # Errors
    ///
    /// Returns a [`ParseError`] when the line is not valid input.
    fn parse(&self, line: &str) -> Result<Vec<Action>, ParseError>;
}

/// Default gateway.
///
/// Actions are joined with `+`. Each one is `name`, `name(arg)` or
/// `name:arg`; the colon form takes the rest of the line as its argument.
#[derive(Debug, Clone, Copy, Default)]
pub struct LineParser;

impl LineParser {
    /// Creates a parser.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

fn is_name_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '-' || c == '_'
}

/// Longest excerpt of input quoted back in a [`ParseError`].
const EXCERPT_CHARS: usize = 16;

/// First whitespace-delimited token of `text`, cut to [`EXCERPT_CHARS`].
fn excerpt(text: &str) -> String {
    let token = text.split_whitespace().next().unwrap_or_default();
    let mut out: String = token.chars().take(EXCERPT_CHARS).collect();
    if token.chars().nth(EXCERPT_CHARS).is_some() {
        out.push_str("...");
    }
    out
}

impl ActionGateway for LineParser {
    fn parse(&self, line: &str) -> Result<Vec<Action>, ParseError> {
        let mut actions = Vec::new();
        let mut rest = line.trim();
        if rest.is_empty() {
            return Ok(actions);
        }

        loop {
            let name_len = rest.find(|c: char| !is_name_char(c)).unwrap_or(rest.len());
            let (name, tail) = rest.split_at(name_len);
            if name.is_empty() {
                return Err(ParseError::InvalidName(excerpt(rest)));
            }

            // `next` is the text after a `+`, or `None` at end of line.
            let mut chars = tail.chars();
            let (action, next) = match chars.next() {
                None => (Action::new(name), None),
                Some('+') => (Action::new(name), Some(chars.as_str())),
                Some(':') => (
                    Action::with_argument(name, chars.as_str().trim_start()),
                    None,
                ),
                Some('(') => {
                    let inner = chars.as_str();
                    let Some(close) = inner.find(')') else {
                        return Err(ParseError::Unterminated(excerpt(name)));
                    };
                    let (arg, after) = inner.split_at(close);
                    let action = if arg.is_empty() {
                        Action::new(name)
                    } else {
                        Action::with_argument(name, arg)
                    };
                    let after = after.get(1..).unwrap_or_default().trim_start();
                    match after.chars().next() {
                        None => (action, None),
                        Some('+') => (action, Some(after.get(1..).unwrap_or_default())),
                        Some(found) => {
                            return Err(ParseError::Unexpected {
                                action: excerpt(name),
                                found,
                            });
                        }
                    }
                }
                Some(found) => {
                    return Err(ParseError::Unexpected {
                        action: excerpt(name),
                        found,
                    });
                }
            };

            actions.push(action);
            let Some(next) = next else {
                break;
            };
            rest = next.trim_start();
            if rest.is_empty() {
                return Err(ParseError::InvalidName(String::new()));
            }
        }

        Ok(actions)
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    fn parse(line: &str) -> Result<Vec<Action>, ParseError> {
        LineParser::new().parse(line)
    }

    #[test]
    fn bare_name() {
        assert_eq!(parse("reload"), Ok(vec![Action::new("reload")]));
    }

    #[test]
    fn empty_parens_have_no_argument() {
        assert_eq!(parse("reload()"), Ok(vec![Action::new("reload")]));
    }

    #[test]
    fn parenthesized_argument() {
        assert_eq!(
            parse("change-prompt(> )"),
            Ok(vec![Action::with_argument("change-prompt", "> ")])
        );
    }

    #[test]
    fn colon_takes_rest_of_line() {
        assert_eq!(
            parse("status: ready+set"),
            Ok(vec![Action::with_argument("status", "ready+set")])
        );
    }

    #[test]
    fn chained_actions_keep_order() {
        let Ok(actions) = parse("first+second(x) + third") else {
            panic!("expected chain to parse");
        };
        let names: Vec<&str> = actions.iter().map(|a| a.name.as_str()).collect();
        assert_eq!(names, ["first", "second", "third"]);
    }

    #[test]
    fn empty_line_is_empty_list() {
        assert_eq!(parse(""), Ok(Vec::new()));
        assert_eq!(parse("   "), Ok(Vec::new()));
    }

    #[test]
    fn unterminated_argument() {
        assert_eq!(
            parse("reload(now"),
            Err(ParseError::Unterminated("reload".to_string()))
        );
    }

    #[test]
    fn dangling_separator_is_rejected() {
        assert!(parse("reload+").is_err());
        assert!(parse("+reload").is_err());
    }

    #[test]
    fn junk_after_action_is_rejected() {
        assert_eq!(
            parse("reload() now"),
            Err(ParseError::Unexpected {
                action: "reload".to_string(),
                found: 'n',
            })
        );
        assert!(parse("not valid").is_err());
    }

    #[test]
    fn errors_quote_a_bounded_excerpt() {
        let line = format!("[bad] {}", "x".repeat(10_000));
        let Err(err) = parse(&line) else {
            panic!("expected a parse error");
        };
        assert_eq!(err, ParseError::InvalidName("[bad]".to_string()));

        let Err(err) = parse(&"?".repeat(10_000)) else {
            panic!("expected a parse error");
        };
        assert!(err.to_string().len() < 64);

        // Feeding an error message back in does not grow it.
        let Err(first) = parse("hello world") else {
            panic!("expected a parse error");
        };
        let Err(second) = parse(&first.to_string()) else {
            panic!("expected a parse error");
        };
        assert!(second.to_string().len() <= first.to_string().len() + EXCERPT_CHARS);
    }

    #[test]
    fn display_round_trips_readable_form() {
        assert_eq!(Action::with_argument("put", "x").to_string(), "put(x)");
        assert_eq!(Action::new("abort").to_string(), "abort");
    }
}
