//! Query evaluation for [`MemoryStore`](crate::MemoryStore).
//!
//! The emulator stands in for the service's query engine, so it understands
//! the subset of the SQL-like language the access patterns issue:
//!
//! ```text
//! SELECT * FROM <alias> [WHERE <alias>.<field>[.<field>...] = <operand> [AND ...]]
//! ```
//!
//! Operands are single-quoted strings (`''` escapes a quote), numbers,
//! `true`, `false`, `null` or `@parameters`. Keywords are case-insensitive,
//! field names are not. Anything else is answered with a bad request, the
//! way the service rejects syntax it cannot compile.

use serde_json::Value;

use crate::{
    error::{StoreError, StoreResult},
    types::{PartitionKeyPath, QueryParameter},
};

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    Star,
    Dot,
    Eq,
    Str(String),
    Num(Value),
    Param(String),
}

#[derive(Debug, Clone, PartialEq)]
enum Operand {
    Literal(Value),
    Parameter(String),
}

#[derive(Debug, Clone, PartialEq)]
struct Condition {
    pointer: String,
    operand: Operand,
}

/// Parsed query, parameters not yet bound.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Filter {
    conditions: Vec<Condition>,
}

/// Query with every parameter resolved, ready to evaluate.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct BoundFilter {
    conditions: Vec<(String, Value)>,
}

impl Filter {
    pub(crate) fn parse(query: &str) -> StoreResult<Self> {
        let tokens = tokenize(query)?;
        let mut parser = Parser { tokens: &tokens, pos: 0 };

        parser.keyword("SELECT")?;
        parser.expect(&Token::Star)?;
        parser.keyword("FROM")?;
        let alias = parser.ident()?;

        let mut conditions = Vec::new();
        if parser.at_end() {
            return Ok(Self { conditions });
        }

        parser.keyword("WHERE")?;
        loop {
            conditions.push(parser.condition(&alias)?);
            if parser.at_end() {
                break;
            }
            parser.keyword("AND")?;
        }

        Ok(Self { conditions })
    }

    pub(crate) fn bind(self, parameters: &[QueryParameter]) -> StoreResult<BoundFilter> {
        let conditions = self
            .conditions
            .into_iter()
            .map(|condition| {
                let value = match condition.operand {
                    Operand::Literal(value) => value,
                    Operand::Parameter(name) => parameters
                        .iter()
                        .find(|p| p.name == name)
                        .map(|p| p.value.clone())
                        .ok_or_else(|| {
                            StoreError::bad_request(format!("query parameter `{name}` is not bound"))
                        })?,
                };
                Ok((condition.pointer, value))
            })
            .collect::<StoreResult<Vec<_>>>()?;

        Ok(BoundFilter { conditions })
    }
}

impl BoundFilter {
    /// Returns `true` when every condition holds for `document`.
    pub(crate) fn matches(&self, document: &Value) -> bool {
        self.conditions.iter().all(|(pointer, expected)| {
            document.pointer(pointer).is_some_and(|actual| values_equal(actual, expected))
        })
    }

    /// Returns the partition-key value the filter pins, if it pins one.
    pub(crate) fn pinned_partition(&self, path: &PartitionKeyPath) -> Option<&str> {
        self.conditions
            .iter()
            .find(|(pointer, _)| pointer == path.as_str())
            .and_then(|(_, value)| value.as_str())
    }
}

fn values_equal(actual: &Value, expected: &Value) -> bool {
    match (actual, expected) {
        (Value::Number(a), Value::Number(b)) => match (a.as_f64(), b.as_f64()) {
            (Some(a), Some(b)) => a == b,
            _ => a == b,
        },
        _ => actual == expected,
    }
}

struct Parser<'a> {
    tokens: &'a [Token],
    pos: usize,
}

impl Parser<'_> {
    fn at_end(&self) -> bool {
        self.pos >= self.tokens.len()
    }

    fn next(&mut self) -> StoreResult<&Token> {
        let token = self
            .tokens
            .get(self.pos)
            .ok_or_else(|| StoreError::bad_request("unexpected end of query"))?;
        self.pos += 1;
        Ok(token)
    }

    fn expect(&mut self, expected: &Token) -> StoreResult<()> {
        let token = self.next()?;
        if token == expected {
            Ok(())
        } else {
            Err(StoreError::bad_request(format!("expected {expected:?}, found {token:?}")))
        }
    }

    fn keyword(&mut self, keyword: &str) -> StoreResult<()> {
        match self.next()? {
            Token::Ident(word) if word.eq_ignore_ascii_case(keyword) => Ok(()),
            other => Err(StoreError::bad_request(format!("expected {keyword}, found {other:?}"))),
        }
    }

    fn ident(&mut self) -> StoreResult<String> {
        match self.next()? {
            Token::Ident(word) => Ok(word.clone()),
            other => Err(StoreError::bad_request(format!("expected identifier, found {other:?}"))),
        }
    }

    fn condition(&mut self, alias: &str) -> StoreResult<Condition> {
        let root = self.ident()?;
        if root != alias {
            return Err(StoreError::bad_request(format!(
                "unknown identifier `{root}`, expected `{alias}`"
            )));
        }

        let mut pointer = String::new();
        while self.tokens.get(self.pos) == Some(&Token::Dot) {
            self.pos += 1;
            let field = self.ident()?;
            pointer.push('/');
            pointer.push_str(&field.replace('~', "~0").replace('/', "~1"));
        }
        if pointer.is_empty() {
            return Err(StoreError::bad_request("comparison must address a document field"));
        }

        self.expect(&Token::Eq)?;

        let operand = match self.next()? {
            Token::Str(s) => Operand::Literal(Value::String(s.clone())),
            Token::Num(n) => Operand::Literal(n.clone()),
            Token::Param(name) => Operand::Parameter(name.clone()),
            Token::Ident(word) if word.eq_ignore_ascii_case("true") => {
                Operand::Literal(Value::Bool(true))
            },
            Token::Ident(word) if word.eq_ignore_ascii_case("false") => {
                Operand::Literal(Value::Bool(false))
            },
            Token::Ident(word) if word.eq_ignore_ascii_case("null") => Operand::Literal(Value::Null),
            other => {
                return Err(StoreError::bad_request(format!("expected a value, found {other:?}")));
            },
        };

        Ok(Condition { pointer, operand })
    }
}

fn tokenize(query: &str) -> StoreResult<Vec<Token>> {
    let mut tokens = Vec::new();
    let mut chars = query.chars().peekable();

    while let Some(&c) = chars.peek() {
        match c {
            c if c.is_whitespace() => {
                chars.next();
            },
            '*' => {
                chars.next();
                tokens.push(Token::Star);
            },
            '.' => {
                chars.next();
                tokens.push(Token::Dot);
            },
            '=' => {
                chars.next();
                tokens.push(Token::Eq);
            },
            '\'' => {
                chars.next();
                let mut literal = String::new();
                loop {
                    match chars.next() {
                        Some('\'') if chars.peek() == Some(&'\'') => {
                            chars.next();
                            literal.push('\'');
                        },
                        Some('\'') => break,
                        Some(ch) => literal.push(ch),
                        None => return Err(StoreError::bad_request("unterminated string literal")),
                    }
                }
                tokens.push(Token::Str(literal));
            },
            '@' => {
                chars.next();
                let mut name = String::from("@");
                while let Some(&ch) = chars.peek() {
                    if ch.is_alphanumeric() || ch == '_' {
                        name.push(ch);
                        chars.next();
                    } else {
                        break;
                    }
                }
                if name.len() == 1 {
                    return Err(StoreError::bad_request("parameter name missing after '@'"));
                }
                tokens.push(Token::Param(name));
            },
            c if c.is_ascii_digit() || c == '-' => {
                let mut text = String::new();
                while let Some(&ch) = chars.peek() {
                    if ch.is_ascii_digit() || matches!(ch, '-' | '+' | '.' | 'e' | 'E') {
                        text.push(ch);
                        chars.next();
                    } else {
                        break;
                    }
                }
                let number = serde_json::from_str::<Value>(&text)
                    .ok()
                    .filter(Value::is_number)
                    .ok_or_else(|| StoreError::bad_request(format!("invalid number `{text}`")))?;
                tokens.push(Token::Num(number));
            },
            c if c.is_alphabetic() || c == '_' => {
                let mut word = String::new();
                while let Some(&ch) = chars.peek() {
                    if ch.is_alphanumeric() || ch == '_' {
                        word.push(ch);
                        chars.next();
                    } else {
                        break;
                    }
                }
                tokens.push(Token::Ident(word));
            },
            other => {
                return Err(StoreError::bad_request(format!("unsupported character `{other}`")));
            },
        }
    }

    Ok(tokens)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use serde_json::json;

    use super::*;

    fn bound(query: &str) -> BoundFilter {
        Filter::parse(query).unwrap().bind(&[]).unwrap()
    }

    #[test]
    fn test_select_all_matches_everything() {
        let filter = bound("SELECT * FROM c");
        assert!(filter.matches(&json!({"id": "a"})));
        assert!(filter.matches(&json!({})));
    }

    #[test]
    fn test_equality_on_partition_key() {
        let filter = bound("SELECT * FROM c WHERE c.partitionKey = 'Andersen'");
        assert!(filter.matches(&json!({"partitionKey": "Andersen"})));
        assert!(!filter.matches(&json!({"partitionKey": "Wakefield"})));
        assert!(!filter.matches(&json!({"PartitionKey": "Andersen"})), "fields are case-sensitive");
    }

    #[test]
    fn test_keywords_are_case_insensitive() {
        let filter = bound("select * from c where c.isRegistered = TRUE and c.lastName = 'Miller'");
        assert!(filter.matches(&json!({"isRegistered": true, "lastName": "Miller"})));
        assert!(!filter.matches(&json!({"isRegistered": false, "lastName": "Miller"})));
    }

    #[test]
    fn test_nested_fields_and_numbers() {
        let filter = bound("SELECT * FROM f WHERE f.address.state = 'NY' AND f.grade = 8");
        assert!(filter.matches(&json!({"address": {"state": "NY"}, "grade": 8})));
        assert!(filter.matches(&json!({"address": {"state": "NY"}, "grade": 8.0})));
        assert!(!filter.matches(&json!({"address": {"state": "NY"}, "grade": 7})));
    }

    #[test]
    fn test_escaped_quote_in_literal() {
        let filter = bound("SELECT * FROM c WHERE c.lastName = 'O''Neil'");
        assert!(filter.matches(&json!({"lastName": "O'Neil"})));
    }

    #[test]
    fn test_parameters_are_bound() {
        let filter = Filter::parse("SELECT * FROM c WHERE c.partitionKey = @pk").unwrap();
        let params = [QueryParameter { name: "@pk".into(), value: json!("Wakefield") }];
        let bound = filter.clone().bind(&params).unwrap();
        assert!(bound.matches(&json!({"partitionKey": "Wakefield"})));

        let missing = filter.bind(&[]);
        assert!(matches!(missing, Err(StoreError::BadRequest { .. })));
    }

    #[test]
    fn test_pinned_partition_detection() {
        let path = PartitionKeyPath::default();
        let pinned = bound("SELECT * FROM c WHERE c.lastName = 'x' AND c.partitionKey = 'Andersen'");
        assert_eq!(pinned.pinned_partition(&path), Some("Andersen"));

        let unpinned = bound("SELECT * FROM c WHERE c.lastName = 'Andersen'");
        assert_eq!(unpinned.pinned_partition(&path), None);
    }

    #[test]
    fn test_rejects_unsupported_syntax() {
        for query in [
            "",
            "SELECT c.id FROM c",
            "SELECT * FROM c WHERE c.grade > 5",
            "SELECT * FROM c WHERE d.id = 'x'",
            "SELECT * FROM c WHERE c = 'x'",
            "SELECT * FROM c WHERE c.id = 'unterminated",
            "SELECT * FROM c ORDER BY c.id",
            "SELECT * FROM c WHERE c.id = 'a' OR c.id = 'b'",
        ] {
            let result = Filter::parse(query);
            assert!(
                matches!(result, Err(StoreError::BadRequest { .. })),
                "expected bad request for {query:?}, got {result:?}"
            );
        }
    }
}
