//! Tool calls encoded in model replies.
//!
//! The model requests a tool by replying with
//! `<tool_code>toolName(key='value', key2="value2")</tool_code>`. Values are strings,
//! optionally wrapped in either quote character; inside a wrapped value `\'` (or `\"`)
//! stands for the wrapping quote and every other backslash is literal.

use std::sync::LazyLock;

use regex::Regex;

use crate::convert::history_from_json;
use crate::error::{McpError, Result};
use crate::llm::ChatMessage;

/// Tool converting a question into SQL.
pub const TEXT_TO_SQL_TOOL: &str = "textToSqlTool";
/// Tool executing SQL.
pub const QUERY_TOOL: &str = "queryTool";
/// Tool for plain conversation.
pub const CHAT_TOOL: &str = "chatTool";

static TOOL_CALL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"<tool_code>(\w+)\((?s:(.*))\)</tool_code>").expect("tool call pattern is valid")
});

/// A tool call located in a reply, before argument parsing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncodedToolCall<'a> {
    /// Tool name
    pub name: &'a str,
    /// Raw argument text between the parentheses
    pub args: &'a str,
}

/// Locate a tool call in `reply`. Replies without the exact tag pair are plain answers.
pub fn find_tool_call(reply: &str) -> Option<EncodedToolCall<'_>> {
    let caps = TOOL_CALL_RE.captures(reply)?;
    Some(EncodedToolCall {
        name: caps.get(1)?.as_str(),
        args: caps.get(2).map_or("", |m| m.as_str()),
    })
}

/// Escape single quotes so `value` can sit inside a single-quoted argument.
pub fn escape_single_quoted(value: &str) -> String {
    value.replace('\'', "\\'")
}

/// The decision-loop input that asks for `sql` to be executed.
pub fn encode_query_call(sql: &str) -> String {
    format!(
        "<tool_code>{}(sqlQuery='{}')</tool_code>",
        QUERY_TOOL,
        escape_single_quoted(sql)
    )
}

/// Errors from [`parse_args`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ArgParseError {
    /// A piece of the list has no `=`.
    #[error("expected '=' after '{0}'")]
    MissingEquals(String),

    /// An argument name is empty or not a word.
    #[error("invalid argument name '{0}'")]
    InvalidName(String),

    /// An unquoted value is empty.
    #[error("argument '{0}' has no value")]
    EmptyValue(String),

    /// A quoted value never closes.
    #[error("unterminated {quote} quote in value of '{name}'")]
    UnterminatedQuote {
        /// Argument name
        name: String,
        /// The opening quote character
        quote: char,
    },

    /// Something other than `,` follows a quoted value.
    #[error("unexpected '{found}' after value of '{name}'")]
    TrailingText {
        /// Argument name
        name: String,
        /// The offending character
        found: char,
    },
}

impl From<ArgParseError> for McpError {
    fn from(err: ArgParseError) -> Self {
        McpError::ParseFailure(err.to_string())
    }
}

/// Parsed `key=value` pairs, in the order written.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ToolArgs {
    pairs: Vec<(String, String)>,
}

impl ToolArgs {
    /// Value of `key`. When a key repeats, the last one wins.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.pairs
            .iter()
            .rev()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Number of pairs.
    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    /// Whether the list was empty.
    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    fn push(&mut self, key: String, value: String) {
        self.pairs.push((key, value));
    }
}

/// Parse an argument list such as `a='1', b="two, three", c=4`.
///
/// A quoted value runs until its quote character closes it right before the end of the
/// list or before `, name=`. Quotes inside the value need no escaping, so
/// `q='What's new?'` reads as `What's new?`.
pub fn parse_args(input: &str) -> std::result::Result<ToolArgs, ArgParseError> {
    let mut args = ToolArgs::default();
    if input.trim().is_empty() {
        return Ok(args);
    }

    let mut rest = input;
    loop {
        let (key, after_eq) = split_key(rest)?;
        let (raw, next) = split_value(after_eq);
        let value = unwrap_value(&key, raw)?;
        args.push(key, value);

        match next {
            Some(tail) => rest = tail,
            None => return Ok(args),
        }
    }
}

static NEXT_KEY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*\w+\s*=").expect("next key pattern is valid"));

/// Split off a name and its `=`.
fn split_key(piece: &str) -> std::result::Result<(String, &str), ArgParseError> {
    let Some(eq) = piece.find(['=', ',']).filter(|&i| piece[i..].starts_with('=')) else {
        let end = piece.find(',').unwrap_or(piece.len());
        return Err(ArgParseError::MissingEquals(piece[..end].trim().to_string()));
    };

    let key = piece[..eq].trim();
    if key.is_empty() || !key.chars().all(|c| c.is_alphanumeric() || c == '_') {
        return Err(ArgParseError::InvalidName(key.to_string()));
    }
    Ok((key.to_string(), &piece[eq + 1..]))
}

/// Split a value from the rest of the list, returning the trimmed raw value and the text
/// after its separating comma.
fn split_value(text: &str) -> (&str, Option<&str>) {
    let quote = text.trim_start().chars().next().filter(|c| matches!(c, '\'' | '"'));
    for (i, _) in text.match_indices(',') {
        let candidate = text[..i].trim();
        let ends_here = match quote {
            Some(q) => wrapped_body(candidate, q).is_some() && NEXT_KEY_RE.is_match(&text[i + 1..]),
            None => true,
        };
        if ends_here {
            return (candidate, Some(&text[i + 1..]));
        }
    }
    (text.trim(), None)
}

/// Byte offset of the last `quote` in `body` not written as `\` + `quote`.
fn last_unescaped(body: &str, quote: char) -> Option<usize> {
    let mut last = None;
    let mut chars = body.char_indices().peekable();
    while let Some((i, c)) = chars.next() {
        if c == '\\' && chars.peek().is_some_and(|&(_, next)| next == quote) {
            chars.next();
        } else if c == quote {
            last = Some(i);
        }
    }
    last
}

/// Inner text of `raw` when one `quote` pair wraps all of it.
fn wrapped_body(raw: &str, quote: char) -> Option<&str> {
    let body = raw.strip_prefix(quote)?;
    let close = last_unescaped(body, quote)?;
    (close + quote.len_utf8() == body.len()).then(|| &body[..close])
}

fn unwrap_value(key: &str, raw: &str) -> std::result::Result<String, ArgParseError> {
    let quote = match raw.chars().next() {
        None => return Err(ArgParseError::EmptyValue(key.to_string())),
        Some(q @ ('\'' | '"')) => q,
        Some(_) => return Ok(raw.to_string()),
    };

    if let Some(body) = wrapped_body(raw, quote) {
        // Only the enclosing quote is unescaped; other backslashes stay as written.
        return Ok(body.replace(&format!("\\{}", quote), &quote.to_string()));
    }

    let body = &raw[quote.len_utf8()..];
    let found = last_unescaped(body, quote)
        .and_then(|close| body[close + quote.len_utf8()..].trim_start().chars().next());
    Err(match found {
        Some(found) => ArgParseError::TrailingText {
            name: key.to_string(),
            found,
        },
        None => ArgParseError::UnterminatedQuote {
            name: key.to_string(),
            quote,
        },
    })
}

/// A tool call with typed parameters, ready for dispatch.
#[derive(Debug, Clone, PartialEq)]
pub enum ToolCall {
    /// Translate a question into SQL, then run it.
    TextToSql {
        /// Question to translate; the user's question when absent
        natural_query: Option<String>,
        /// Schema to translate against; the live schema when absent
        schema_text: Option<String>,
    },
    /// Execute SQL.
    Query {
        /// Statement to run
        sql_query: String,
    },
    /// Plain conversation.
    Chat {
        /// Message to answer; the user's question when absent
        new_message: Option<String>,
        /// Earlier turns
        history: Vec<ChatMessage>,
        /// System prompt override
        system_prompt: Option<String>,
    },
    /// A name outside the three known tools.
    Unknown(String),
}

impl ToolCall {
    /// Build a typed call from a name and its string arguments.
    pub fn from_args(name: &str, args: &ToolArgs) -> Result<Self> {
        let owned = |key: &str| args.get(key).map(str::to_string);
        match name {
            TEXT_TO_SQL_TOOL => Ok(ToolCall::TextToSql {
                natural_query: owned("naturalQuery").filter(|q| !q.trim().is_empty()),
                schema_text: owned("schemaText").filter(|s| !s.trim().is_empty()),
            }),
            QUERY_TOOL => {
                let sql_query = owned("sqlQuery")
                    .filter(|s| !s.trim().is_empty())
                    .ok_or_else(|| McpError::MissingArg("sqlQuery".to_string()))?;
                Ok(ToolCall::Query { sql_query })
            }
            CHAT_TOOL => {
                let history = match args.get("history") {
                    Some(raw) => {
                        let value = serde_json::from_str(raw).map_err(|e| McpError::InvalidArg {
                            name: "history".to_string(),
                            reason: format!("not valid JSON: {}", e),
                        })?;
                        history_from_json(&value, "history")?
                    }
                    None => Vec::new(),
                };
                Ok(ToolCall::Chat {
                    new_message: owned("newMessage"),
                    history,
                    system_prompt: owned("systemPrompt").filter(|s| !s.trim().is_empty()),
                })
            }
            other => Ok(ToolCall::Unknown(other.to_string())),
        }
    }

    /// Name of the tool as the model writes it.
    pub fn name(&self) -> &str {
        match self {
            ToolCall::TextToSql { .. } => TEXT_TO_SQL_TOOL,
            ToolCall::Query { .. } => QUERY_TOOL,
            ToolCall::Chat { .. } => CHAT_TOOL,
            ToolCall::Unknown(name) => name,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(input: &str) -> ToolArgs {
        parse_args(input).unwrap_or_else(|e| panic!("failed to parse {:?}: {}", input, e))
    }

    #[test]
    fn test_find_tool_call_requires_exact_tags() {
        let call = find_tool_call("<tool_code>queryTool(sqlQuery='SELECT 1')</tool_code>").unwrap();
        assert_eq!(call.name, "queryTool");
        assert_eq!(call.args, "sqlQuery='SELECT 1'");

        assert!(find_tool_call("I would call queryTool(sqlQuery='SELECT 1') here").is_none());
        assert!(find_tool_call("<TOOL_CODE>queryTool()</TOOL_CODE>").is_none());
        assert!(find_tool_call("<tool_code>queryTool(sqlQuery='x')").is_none());
    }

    #[test]
    fn test_find_tool_call_with_surrounding_prose() {
        let reply = "Sure!\n<tool_code>chatTool(newMessage='hi')</tool_code>\nDone.";
        let call = find_tool_call(reply).unwrap();
        assert_eq!(call.name, "chatTool");
        assert_eq!(call.args, "newMessage='hi'");
    }

    #[test]
    fn test_find_tool_call_spans_lines() {
        let reply = "<tool_code>queryTool(sqlQuery='SELECT *\nFROM users')</tool_code>";
        let call = find_tool_call(reply).unwrap();
        assert_eq!(call.args, "sqlQuery='SELECT *\nFROM users'");
    }

    #[test]
    fn test_empty_argument_list() {
        assert!(parse("").is_empty());
        assert!(parse("   ").is_empty());
    }

    #[test]
    fn test_single_and_double_quotes_in_one_list() {
        let args = parse("naturalQuery='Show users', schemaText=\"CREATE TABLE t (a INT);\"");
        assert_eq!(args.len(), 2);
        assert_eq!(args.get("naturalQuery"), Some("Show users"));
        assert_eq!(args.get("schemaText"), Some("CREATE TABLE t (a INT);"));
    }

    #[test]
    fn test_commas_and_equals_inside_quotes() {
        let args = parse("sqlQuery='SELECT a, b FROM t WHERE c = 1', other='x'");
        assert_eq!(args.get("sqlQuery"), Some("SELECT a, b FROM t WHERE c = 1"));
        assert_eq!(args.get("other"), Some("x"));
    }

    #[test]
    fn test_nested_quotes_of_the_other_kind() {
        let args = parse("sqlQuery='SELECT \"Name\" FROM t', msg=\"it's fine\"");
        assert_eq!(args.get("sqlQuery"), Some("SELECT \"Name\" FROM t"));
        assert_eq!(args.get("msg"), Some("it's fine"));
    }

    #[test]
    fn test_escaped_quotes_are_unescaped() {
        let args = parse(r#"sqlQuery='O\'Brien', q="say \"hi\"""#);
        assert_eq!(args.get("sqlQuery"), Some("O'Brien"));
        assert_eq!(args.get("q"), Some("say \"hi\""));
    }

    #[test]
    fn test_only_the_enclosing_quote_is_unescaped() {
        let args = parse(r#"a='keep \" and \n', b="keep \' too""#);
        assert_eq!(args.get("a"), Some(r#"keep \" and \n"#));
        assert_eq!(args.get("b"), Some(r"keep \' too"));
    }

    #[test]
    fn test_escape_round_trip() {
        let original = "SELECT * FROM people WHERE last_name = 'O'Brien'";
        let encoded = format!("sqlQuery='{}'", escape_single_quoted(original));
        let args = parse(&encoded);
        assert_eq!(args.get("sqlQuery"), Some(original));

        let again = format!("sqlQuery='{}'", escape_single_quoted(args.get("sqlQuery").unwrap()));
        assert_eq!(again, encoded);

        let original = r"SELECT * FROM files WHERE path = 'C:\'";
        let encoded = encode_query_call(original);
        let call = find_tool_call(&encoded).unwrap();
        assert_eq!(parse(call.args).get("sqlQuery"), Some(original));
    }

    #[test]
    fn test_apostrophe_inside_wrapped_value() {
        let reply = "<tool_code>textToSqlTool(naturalQuery='What's the total spend?')</tool_code>";
        let call = find_tool_call(reply).unwrap();
        let args = parse(call.args);
        assert_eq!(args.get("naturalQuery"), Some("What's the total spend?"));

        let args = parse("naturalQuery='What's up, doc?', schemaText='x'");
        assert_eq!(args.get("naturalQuery"), Some("What's up, doc?"));
        assert_eq!(args.get("schemaText"), Some("x"));
    }

    #[test]
    fn test_unescaped_inner_literal() {
        let args = parse("sqlQuery='SELECT * FROM t WHERE n = 'a''");
        assert_eq!(args.get("sqlQuery"), Some("SELECT * FROM t WHERE n = 'a'"));

        let args = parse("sqlQuery='SELECT 'a', 'b'', limit=2");
        assert_eq!(args.get("sqlQuery"), Some("SELECT 'a', 'b'"));
        assert_eq!(args.get("limit"), Some("2"));
    }

    #[test]
    fn test_backslashes_before_other_characters_are_literal() {
        let args = parse(r"sqlQuery='SELECT E\'\\n\' AS nl'");
        assert_eq!(args.get("sqlQuery"), Some(r"SELECT E'\\n' AS nl"));
    }

    #[test]
    fn test_interval_example_from_prompt() {
        let args = parse(r"sqlQuery='SELECT name FROM users WHERE created_at > NOW() - INTERVAL \'1 month\''");
        assert_eq!(
            args.get("sqlQuery"),
            Some("SELECT name FROM users WHERE created_at > NOW() - INTERVAL '1 month'")
        );
    }

    #[test]
    fn test_unquoted_values_are_trimmed_strings() {
        let args = parse(" limit = 10 , flag=true");
        assert_eq!(args.get("limit"), Some("10"));
        assert_eq!(args.get("flag"), Some("true"));
    }

    #[test]
    fn test_empty_quoted_value_is_allowed() {
        assert_eq!(parse("a=''").get("a"), Some(""));
    }

    #[test]
    fn test_malformed_lists() {
        assert_eq!(
            parse_args("naturalQuery="),
            Err(ArgParseError::EmptyValue("naturalQuery".into()))
        );
        assert_eq!(
            parse_args("just some words"),
            Err(ArgParseError::MissingEquals("just some words".into()))
        );
        assert_eq!(
            parse_args("a='unterminated"),
            Err(ArgParseError::UnterminatedQuote {
                name: "a".into(),
                quote: '\''
            })
        );
        assert_eq!(
            parse_args("a='x' y"),
            Err(ArgParseError::TrailingText {
                name: "a".into(),
                found: 'y'
            })
        );
        assert_eq!(
            parse_args("='x'"),
            Err(ArgParseError::InvalidName(String::new()))
        );
        assert!(parse_args("a='1',").is_err());
    }

    #[test]
    fn test_encode_query_call_parses_back() {
        let sql = "SELECT * FROM users WHERE name = 'a'";
        let encoded = encode_query_call(sql);
        assert_eq!(
            encoded,
            r"<tool_code>queryTool(sqlQuery='SELECT * FROM users WHERE name = \'a\'')</tool_code>"
        );

        let call = find_tool_call(&encoded).unwrap();
        let args = parse(call.args);
        assert_eq!(args.get("sqlQuery"), Some(sql));
    }

    #[test]
    fn test_typed_calls() {
        let args = parse("naturalQuery='list users'");
        assert_eq!(
            ToolCall::from_args(TEXT_TO_SQL_TOOL, &args).unwrap(),
            ToolCall::TextToSql {
                natural_query: Some("list users".into()),
                schema_text: None
            }
        );

        let args = parse("sqlQuery='SELECT 1'");
        assert_eq!(
            ToolCall::from_args(QUERY_TOOL, &args).unwrap(),
            ToolCall::Query {
                sql_query: "SELECT 1".into()
            }
        );
        assert!(matches!(
            ToolCall::from_args(QUERY_TOOL, &ToolArgs::default()),
            Err(McpError::MissingArg(_))
        ));

        let args = parse(r#"newMessage='hi', history='[{"role":"user","content":"earlier"}]'"#);
        let call = ToolCall::from_args(CHAT_TOOL, &args).unwrap();
        assert_eq!(
            call,
            ToolCall::Chat {
                new_message: Some("hi".into()),
                history: vec![ChatMessage::user("earlier")],
                system_prompt: None
            }
        );

        let args = parse("history='not json'");
        assert!(ToolCall::from_args(CHAT_TOOL, &args).is_err());

        let call = ToolCall::from_args("deleteEverything", &ToolArgs::default()).unwrap();
        assert_eq!(call, ToolCall::Unknown("deleteEverything".into()));
        assert_eq!(call.name(), "deleteEverything");
    }
}
