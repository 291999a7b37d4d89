//! Skill rules: typed conditions over change attributes that activate agents.
//!
//! Conditions are written in a tiny expression language in configuration,
//! for example `lines_changed > 500 && lockfile_touched`, and parsed into a
//! [`RuleCondition`] tree at load time. Evaluation is a plain match over that
//! tree; nothing is ever executed.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::domain::errors::DomainError;
use crate::domain::models::change::ChangeAttributes;

/// Numeric change attributes a rule can compare against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NumericField {
    LinesChanged,
    FilesChanged,
}

impl NumericField {
    fn from_ident(ident: &str) -> Option<Self> {
        match ident {
            "lines_changed" | "loc_changed" => Some(Self::LinesChanged),
            "files_changed" | "files_count" => Some(Self::FilesChanged),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::LinesChanged => "lines_changed",
            Self::FilesChanged => "files_changed",
        }
    }

    fn value(self, attrs: &ChangeAttributes) -> u64 {
        match self {
            Self::LinesChanged => attrs.lines_changed,
            Self::FilesChanged => attrs.files_changed,
        }
    }
}

/// Boolean change attributes a rule can test.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FlagField {
    LockfileTouched,
    ApiTouched,
    SecurityTouched,
    DocsTouched,
    ConfigTouched,
    TestsTouched,
}

impl FlagField {
    fn from_ident(ident: &str) -> Option<Self> {
        match ident {
            "lockfile_touched" => Some(Self::LockfileTouched),
            "api_touched" => Some(Self::ApiTouched),
            "security_touched" => Some(Self::SecurityTouched),
            "docs_touched" => Some(Self::DocsTouched),
            "config_touched" => Some(Self::ConfigTouched),
            "tests_touched" => Some(Self::TestsTouched),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::LockfileTouched => "lockfile_touched",
            Self::ApiTouched => "api_touched",
            Self::SecurityTouched => "security_touched",
            Self::DocsTouched => "docs_touched",
            Self::ConfigTouched => "config_touched",
            Self::TestsTouched => "tests_touched",
        }
    }

    fn value(self, attrs: &ChangeAttributes) -> bool {
        match self {
            Self::LockfileTouched => attrs.lockfile_touched,
            Self::ApiTouched => attrs.api_touched,
            Self::SecurityTouched => attrs.security_touched,
            Self::DocsTouched => attrs.docs_touched,
            Self::ConfigTouched => attrs.config_touched,
            Self::TestsTouched => attrs.tests_touched,
        }
    }
}

/// Comparison operator for numeric conditions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Comparison {
    Gt,
    Ge,
    Lt,
    Le,
    Eq,
    Ne,
}

impl Comparison {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Gt => ">",
            Self::Ge => ">=",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Eq => "==",
            Self::Ne => "!=",
        }
    }

    fn apply(self, lhs: u64, rhs: u64) -> bool {
        match self {
            Self::Gt => lhs > rhs,
            Self::Ge => lhs >= rhs,
            Self::Lt => lhs < rhs,
            Self::Le => lhs <= rhs,
            Self::Eq => lhs == rhs,
            Self::Ne => lhs != rhs,
        }
    }
}

/// Typed predicate over [`ChangeAttributes`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum RuleCondition {
    /// Unconditionally true
    Always,
    /// Numeric comparison, e.g. `files_changed >= 20`
    Compare {
        field: NumericField,
        op: Comparison,
        value: u64,
    },
    /// Boolean attribute test, e.g. `api_touched`
    Flag(FlagField),
    Not(Box<RuleCondition>),
    All(Vec<RuleCondition>),
    Any(Vec<RuleCondition>),
}

impl RuleCondition {
    /// Parse the textual form used in configuration.
    pub fn parse(input: &str) -> Result<Self, DomainError> {
        let tokens = tokenize(input).map_err(|reason| invalid(input, reason))?;
        if tokens.is_empty() {
            return Err(invalid(input, "empty condition".to_string()));
        }

        let mut parser = Parser { tokens, pos: 0 };
        let condition = parser.parse_or().map_err(|reason| invalid(input, reason))?;
        if parser.pos != parser.tokens.len() {
            return Err(invalid(
                input,
                format!("unexpected trailing token {:?}", parser.tokens[parser.pos]),
            ));
        }
        Ok(condition)
    }

    /// Evaluate against the attributes of one change.
    pub fn evaluate(&self, attrs: &ChangeAttributes) -> bool {
        match self {
            Self::Always => true,
            Self::Compare { field, op, value } => op.apply(field.value(attrs), *value),
            Self::Flag(flag) => flag.value(attrs),
            Self::Not(inner) => !inner.evaluate(attrs),
            Self::All(items) => items.iter().all(|c| c.evaluate(attrs)),
            Self::Any(items) => items.iter().any(|c| c.evaluate(attrs)),
        }
    }

    fn is_atom(&self) -> bool {
        matches!(self, Self::Always | Self::Compare { .. } | Self::Flag(_))
    }
}

fn invalid(condition: &str, reason: String) -> DomainError {
    DomainError::InvalidRuleCondition {
        condition: condition.to_string(),
        reason,
    }
}

impl fmt::Display for RuleCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Always => f.write_str("always"),
            Self::Compare { field, op, value } => {
                write!(f, "{} {} {}", field.as_str(), op.as_str(), value)
            }
            Self::Flag(flag) => f.write_str(flag.as_str()),
            Self::Not(inner) if inner.is_atom() => write!(f, "!{inner}"),
            Self::Not(inner) => write!(f, "!({inner})"),
            Self::All(items) => write_joined(f, items, " && "),
            Self::Any(items) => write_joined(f, items, " || "),
        }
    }
}

fn write_joined(f: &mut fmt::Formatter<'_>, items: &[RuleCondition], sep: &str) -> fmt::Result {
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            f.write_str(sep)?;
        }
        if matches!(item, RuleCondition::All(_) | RuleCondition::Any(_)) {
            write!(f, "({item})")?;
        } else {
            write!(f, "{item}")?;
        }
    }
    Ok(())
}

impl FromStr for RuleCondition {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for RuleCondition {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<RuleCondition> for String {
    fn from(condition: RuleCondition) -> Self {
        condition.to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Ident(String),
    Number(u64),
    Op(Comparison),
    And,
    Or,
    Not,
    LParen,
    RParen,
}

fn tokenize(input: &str) -> Result<Vec<Token>, String> {
    let chars: Vec<char> = input.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        let next = chars.get(i + 1).copied();
        match c {
            c if c.is_whitespace() => i += 1,
            '(' => {
                tokens.push(Token::LParen);
                i += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
                i += 1;
            }
            '&' if next == Some('&') => {
                tokens.push(Token::And);
                i += 2;
            }
            '|' if next == Some('|') => {
                tokens.push(Token::Or);
                i += 2;
            }
            '>' | '<' | '=' | '!' => {
                let (token, width) = match (c, next) {
                    ('>', Some('=')) => (Token::Op(Comparison::Ge), 2),
                    ('>', _) => (Token::Op(Comparison::Gt), 1),
                    ('<', Some('=')) => (Token::Op(Comparison::Le), 2),
                    ('<', _) => (Token::Op(Comparison::Lt), 1),
                    ('=', Some('=')) => (Token::Op(Comparison::Eq), 2),
                    ('!', Some('=')) => (Token::Op(Comparison::Ne), 2),
                    ('!', _) => (Token::Not, 1),
                    _ => return Err(format!("unexpected character '{c}' at {i}")),
                };
                tokens.push(token);
                i += width;
            }
            c if c.is_ascii_digit() => {
                let start = i;
                while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '_') {
                    i += 1;
                }
                let literal: String = chars[start..i].iter().filter(|c| **c != '_').collect();
                let number = literal
                    .parse::<u64>()
                    .map_err(|e| format!("invalid number '{literal}': {e}"))?;
                tokens.push(Token::Number(number));
            }
            c if c.is_ascii_alphabetic() || c == '_' => {
                let start = i;
                while i < chars.len() && (chars[i].is_ascii_alphanumeric() || chars[i] == '_') {
                    i += 1;
                }
                tokens.push(Token::Ident(chars[start..i].iter().collect()));
            }
            _ => return Err(format!("unexpected character '{c}' at {i}")),
        }
    }

    Ok(tokens)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        token
    }

    fn parse_or(&mut self) -> Result<RuleCondition, String> {
        let mut items = vec![self.parse_and()?];
        while self.peek() == Some(&Token::Or) {
            self.pos += 1;
            items.push(self.parse_and()?);
        }
        Ok(if items.len() == 1 {
            items.remove(0)
        } else {
            RuleCondition::Any(items)
        })
    }

    fn parse_and(&mut self) -> Result<RuleCondition, String> {
        let mut items = vec![self.parse_unary()?];
        while self.peek() == Some(&Token::And) {
            self.pos += 1;
            items.push(self.parse_unary()?);
        }
        Ok(if items.len() == 1 {
            items.remove(0)
        } else {
            RuleCondition::All(items)
        })
    }

    fn parse_unary(&mut self) -> Result<RuleCondition, String> {
        match self.advance() {
            Some(Token::Not) => Ok(RuleCondition::Not(Box::new(self.parse_unary()?))),
            Some(Token::LParen) => {
                let inner = self.parse_or()?;
                match self.advance() {
                    Some(Token::RParen) => Ok(inner),
                    other => Err(format!("expected ')', found {other:?}")),
                }
            }
            Some(Token::Ident(ident)) => self.parse_atom(&ident),
            other => Err(format!("expected a condition, found {other:?}")),
        }
    }

    fn parse_atom(&mut self, ident: &str) -> Result<RuleCondition, String> {
        match ident {
            "always" | "true" => return Ok(RuleCondition::Always),
            "false" => return Ok(RuleCondition::Not(Box::new(RuleCondition::Always))),
            _ => {}
        }

        if let Some(field) = NumericField::from_ident(ident) {
            let op = match self.advance() {
                Some(Token::Op(op)) => op,
                other => {
                    return Err(format!(
                        "numeric field '{ident}' needs a comparison, found {other:?}"
                    ))
                }
            };
            return match self.advance() {
                Some(Token::Number(value)) => Ok(RuleCondition::Compare { field, op, value }),
                other => Err(format!("expected a number after '{ident}', found {other:?}")),
            };
        }

        if let Some(flag) = FlagField::from_ident(ident) {
            let condition = RuleCondition::Flag(flag);
            if let Some(Token::Op(op @ (Comparison::Eq | Comparison::Ne))) = self.peek().cloned() {
                self.pos += 1;
                let expected = match self.advance() {
                    Some(Token::Ident(v)) if v == "true" => true,
                    Some(Token::Ident(v)) if v == "false" => false,
                    other => {
                        return Err(format!(
                            "flag '{ident}' can only be compared with true/false, found {other:?}"
                        ))
                    }
                };
                let positive = expected == (op == Comparison::Eq);
                return Ok(if positive {
                    condition
                } else {
                    RuleCondition::Not(Box::new(condition))
                });
            }
            return Ok(condition);
        }

        Err(format!("unknown field '{ident}'"))
    }
}

/// Condition-to-activation mapping evaluated per request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkillRule {
    /// Name used in routing traces
    pub name: String,

    /// When the rule fires
    pub condition: RuleCondition,

    /// Agents to activate when the condition holds
    pub activate: Vec<String>,

    /// Rule priority (1-10); higher rules are applied first
    #[serde(default = "default_rule_priority")]
    pub priority: u8,
}

const fn default_rule_priority() -> u8 {
    5
}

impl SkillRule {
    pub fn new(
        name: impl Into<String>,
        condition: RuleCondition,
        activate: &[&str],
        priority: u8,
    ) -> Self {
        Self {
            name: name.into(),
            condition,
            activate: activate.iter().map(|a| (*a).to_string()).collect(),
            priority,
        }
    }
}
