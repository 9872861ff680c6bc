//! Name/value expressions: `NAME`, `NAME=VALUE` and `NAME==VALUE`.
//!
//! A name or value starting with the regex prefix (`%` by default) is a
//! regular expression that must match the whole candidate.

use std::fmt;

use regex::Regex;

use super::union_into;
use crate::schema::{ItemMap, ItemValue, RawItems};

/// Default marker for regular expression names and values.
pub const REGEX_PREFIX: char = '%';

/// Errors building a name/value expression.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ExprError {
    #[error("invalid regex: {pattern:?}: {reason}")]
    InvalidRegex { pattern: String, reason: String },

    #[error("name may not be a regex")]
    RegexNameNotAllowed,

    #[error("filter not allowed")]
    FilterNotAllowed,

    #[error("empty name in {0:?}")]
    EmptyName(String),

    #[error("id: {0}")]
    Id(Box<ExprError>),
}

/// Context-dependent parsing rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParseOptions {
    pub regex_prefix: char,
    /// Whether the name may be a regex.
    pub name_regex_ok: bool,
    /// Whether an operator and value may follow the name.
    pub filter_ok: bool,
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self {
            regex_prefix: REGEX_PREFIX,
            name_regex_ok: true,
            filter_ok: true,
        }
    }
}

impl ParseOptions {
    pub fn with_prefix(regex_prefix: char) -> Self {
        Self {
            regex_prefix,
            ..Default::default()
        }
    }

    pub fn name_regex_ok(self, name_regex_ok: bool) -> Self {
        Self {
            name_regex_ok,
            ..self
        }
    }

    pub fn filter_ok(self, filter_ok: bool) -> Self {
        Self { filter_ok, ..self }
    }
}

/// Value comparison operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NameValueOp {
    /// `==`: every item whose name matches must have a matching value.
    AllEq,
    /// `=`: at least one item whose name matches must have a matching value.
    AnyEq,
}

impl fmt::Display for NameValueOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NameValueOp::AllEq => write!(f, "=="),
            NameValueOp::AnyEq => write!(f, "="),
        }
    }
}

#[derive(Debug, Clone)]
enum NameMatcher {
    Literal(String),
    Regex(Regex),
}

#[derive(Debug, Clone)]
enum ValueMatcher {
    Literal(String),
    /// Parsed number plus its original text.
    Number(f64, String),
    Regex(Regex),
}

/// Compile a regex anchored at both ends.
fn full_match_regex(pattern: &str) -> Result<Regex, ExprError> {
    Regex::new(&format!("^(?:{})$", pattern)).map_err(|e| ExprError::InvalidRegex {
        pattern: pattern.to_string(),
        reason: e.to_string(),
    })
}

impl ValueMatcher {
    fn parse(text: &str, prefix: char) -> Result<Self, ExprError> {
        if let Some(pattern) = text.strip_prefix(prefix) {
            return Ok(ValueMatcher::Regex(full_match_regex(pattern)?));
        }
        Ok(match text.parse::<f64>() {
            Ok(n) => ValueMatcher::Number(n, text.to_string()),
            Err(_) => ValueMatcher::Literal(text.to_string()),
        })
    }

    fn matches(&self, value: &ItemValue) -> bool {
        match self {
            ValueMatcher::Regex(re) => re.is_match(&value.to_string()),
            ValueMatcher::Number(n, raw) => match value.as_f64() {
                Some(v) => *n == v,
                None => *raw == value.to_string(),
            },
            ValueMatcher::Literal(s) => *s == value.to_string(),
        }
    }
}

/// Split at the first operator token, checking `==` before `=`.
fn split_op(text: &str) -> Option<(&str, NameValueOp, &str)> {
    if let Some((name, value)) = text.split_once("==") {
        return Some((name, NameValueOp::AllEq, value));
    }
    text.split_once('=')
        .map(|(name, value)| (name, NameValueOp::AnyEq, value))
}

/// A parsed name/value expression.
#[derive(Debug, Clone)]
pub struct NameValueExpr {
    source: String,
    name: NameMatcher,
    filter: Option<(NameValueOp, ValueMatcher)>,
}

impl NameValueExpr {
    /// Parse an expression string.
    pub fn parse(text: &str, options: ParseOptions) -> Result<Self, ExprError> {
        let prefix = options.regex_prefix;
        if !options.name_regex_ok && text.starts_with(prefix) {
            return Err(ExprError::RegexNameNotAllowed);
        }

        let (name, filter) = match split_op(text) {
            Some((name, op, value)) => {
                if !options.filter_ok {
                    return Err(ExprError::FilterNotAllowed);
                }
                (name, Some((op, ValueMatcher::parse(value, prefix)?)))
            }
            None => (text, None),
        };

        if name.is_empty() {
            return Err(ExprError::EmptyName(text.to_string()));
        }

        let name = match name.strip_prefix(prefix) {
            Some(pattern) => NameMatcher::Regex(full_match_regex(pattern)?),
            None => NameMatcher::Literal(name.to_string()),
        };

        Ok(Self {
            source: text.to_string(),
            name,
            filter,
        })
    }

    pub fn name_is_regex(&self) -> bool {
        matches!(self.name, NameMatcher::Regex(_))
    }

    /// The literal name, if the name is not a regex.
    pub fn literal_name(&self) -> Option<&str> {
        match &self.name {
            NameMatcher::Literal(name) => Some(name),
            NameMatcher::Regex(_) => None,
        }
    }

    pub fn op(&self) -> Option<NameValueOp> {
        self.filter.as_ref().map(|(op, _)| *op)
    }

    pub fn name_matches(&self, name: &str) -> bool {
        match &self.name {
            NameMatcher::Literal(literal) => literal == name,
            NameMatcher::Regex(re) => re.is_match(name),
        }
    }

    /// Names among `candidates` selected by this expression.
    ///
    /// A literal name is returned whether or not it is among the candidates.
    pub fn matching_names<'a, I>(&self, candidates: I) -> Vec<String>
    where
        I: IntoIterator<Item = &'a str>,
    {
        match &self.name {
            NameMatcher::Literal(literal) => vec![literal.clone()],
            NameMatcher::Regex(_) => {
                let mut names = Vec::new();
                union_into(
                    &mut names,
                    candidates
                        .into_iter()
                        .filter(|c| self.name_matches(c))
                        .map(str::to_string),
                );
                names
            }
        }
    }

    pub fn value_matches(&self, value: &ItemValue) -> bool {
        match &self.filter {
            None => true,
            Some((_, matcher)) => matcher.matches(value),
        }
    }

    /// Whether a single name and value satisfy the expression.
    pub fn item_matches(&self, name: &str, value: &ItemValue) -> bool {
        self.name_matches(name) && self.value_matches(value)
    }

    /// Items whose names match, and whether their values satisfy the operator.
    ///
    /// A literal name always yields exactly that item (`Missing` if absent).
    /// The returned items are the full name-matching subset for any operator.
    pub fn filter_items(&self, items: &RawItems) -> (bool, ItemMap) {
        if let NameMatcher::Literal(name) = &self.name {
            let value = ItemValue::lookup(items, name);
            let matches = self.value_matches(&value);
            return (matches, ItemMap::from([(name.clone(), value)]));
        }

        let name_matching: ItemMap = items
            .iter()
            .filter(|(name, _)| self.name_matches(name))
            .map(|(name, value)| (name.clone(), ItemValue::Value(value.clone())))
            .collect();

        let matches = match self.op() {
            None => true,
            Some(op) => {
                let n_value_matches = name_matching
                    .values()
                    .filter(|v| self.value_matches(v))
                    .count();
                match op {
                    NameValueOp::AnyEq => n_value_matches >= 1,
                    NameValueOp::AllEq => n_value_matches == name_matching.len(),
                }
            }
        };
        (matches, name_matching)
    }
}

impl fmt::Display for NameValueExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

/// A conjunction of name/value expressions.
#[derive(Debug, Clone, Default)]
pub struct NameValueExprs(Vec<NameValueExpr>);

impl NameValueExprs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse each string as one expression.
    pub fn parse<S: AsRef<str>>(texts: &[S], options: ParseOptions) -> Result<Self, ExprError> {
        texts
            .iter()
            .map(|t| NameValueExpr::parse(t.as_ref(), options))
            .collect::<Result<Vec<_>, _>>()
            .map(Self)
    }

    pub fn extend(&mut self, other: NameValueExprs) {
        self.0.extend(other.0);
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, NameValueExpr> {
        self.0.iter()
    }

    /// All literal (non-regex) names, in order, without duplicates.
    pub fn all_str_names(&self) -> Vec<String> {
        let mut names = Vec::new();
        union_into(
            &mut names,
            self.0
                .iter()
                .filter_map(|e| e.literal_name().map(str::to_string)),
        );
        names
    }

    /// Names matching any of the expressions.
    pub fn matching_names<'a, I>(&self, candidates: I) -> Vec<String>
    where
        I: IntoIterator<Item = &'a str> + Clone,
    {
        let mut names = Vec::new();
        for expr in &self.0 {
            union_into(&mut names, expr.matching_names(candidates.clone()));
        }
        names
    }

    /// True only if every expression matches; items are the union of all.
    pub fn filter_items(&self, items: &RawItems) -> (bool, ItemMap) {
        let mut all_match = true;
        let mut all_items = ItemMap::new();
        for expr in &self.0 {
            let (matches, name_matching) = expr.filter_items(items);
            all_match &= matches;
            all_items.extend(name_matching);
        }
        (all_match, all_items)
    }
}

impl<'a> IntoIterator for &'a NameValueExprs {
    type Item = &'a NameValueExpr;
    type IntoIter = std::slice::Iter<'a, NameValueExpr>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}
