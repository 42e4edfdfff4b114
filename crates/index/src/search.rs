//! Search specifications and query expressions
//!
//! A [`SearchSpec`] selects documents of one index by comparing their indexed
//! value against a search text. An [`IndexQuery`] combines specs into a tree
//! of `And`, `Or` and `Not` nodes that evaluates to a set of keys.

use crate::document::IndexDocument;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use tempora_core::Result;

/// Comparison between an indexed value and the search text
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StringCondition {
    /// Value equals the text
    Equals,
    /// Value differs from the text
    NotEquals,
    /// Value contains the text
    Contains,
    /// Value does not contain the text
    NotContains,
    /// Value starts with the text
    StartsWith,
    /// Value does not start with the text
    NotStartsWith,
    /// Value ends with the text
    EndsWith,
    /// Value does not end with the text
    NotEndsWith,
}

impl StringCondition {
    /// Evaluate the condition for `value` against `text`
    pub fn evaluate(&self, value: &str, text: &str) -> bool {
        match self {
            StringCondition::Equals => value == text,
            StringCondition::NotEquals => value != text,
            StringCondition::Contains => value.contains(text),
            StringCondition::NotContains => !value.contains(text),
            StringCondition::StartsWith => value.starts_with(text),
            StringCondition::NotStartsWith => !value.starts_with(text),
            StringCondition::EndsWith => value.ends_with(text),
            StringCondition::NotEndsWith => !value.ends_with(text),
        }
    }
}

/// How letter case is treated when matching
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TextMatchMode {
    /// Compare exactly
    #[default]
    Strict,
    /// Compare lowercase forms
    CaseInsensitive,
}

/// Selects documents of one index
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SearchSpec {
    /// Index to search
    pub index_name: String,
    /// Comparison to apply
    pub condition: StringCondition,
    /// Case handling
    pub mode: TextMatchMode,
    /// Text to compare against
    pub search_text: String,
}

impl SearchSpec {
    /// Create a strict search spec
    pub fn new(
        index_name: impl Into<String>,
        condition: StringCondition,
        search_text: impl Into<String>,
    ) -> Self {
        Self {
            index_name: index_name.into(),
            condition,
            mode: TextMatchMode::Strict,
            search_text: search_text.into(),
        }
    }

    /// Indexed value equals `text`
    pub fn equals(index_name: impl Into<String>, text: impl Into<String>) -> Self {
        Self::new(index_name, StringCondition::Equals, text)
    }

    /// Indexed value contains `text`
    pub fn contains(index_name: impl Into<String>, text: impl Into<String>) -> Self {
        Self::new(index_name, StringCondition::Contains, text)
    }

    /// Indexed value starts with `text`
    pub fn starts_with(index_name: impl Into<String>, text: impl Into<String>) -> Self {
        Self::new(index_name, StringCondition::StartsWith, text)
    }

    /// Indexed value ends with `text`
    pub fn ends_with(index_name: impl Into<String>, text: impl Into<String>) -> Self {
        Self::new(index_name, StringCondition::EndsWith, text)
    }

    /// Switch to case-insensitive matching
    pub fn case_insensitive(mut self) -> Self {
        self.mode = TextMatchMode::CaseInsensitive;
        self
    }

    /// Whether `document` satisfies this spec (index name included)
    pub fn matches(&self, document: &IndexDocument) -> bool {
        if document.index_name != self.index_name {
            return false;
        }
        match self.mode {
            TextMatchMode::Strict => self
                .condition
                .evaluate(&document.indexed_value, &self.search_text),
            TextMatchMode::CaseInsensitive => self
                .condition
                .evaluate(&document.lowercase_value(), &self.search_text.to_lowercase()),
        }
    }
}

/// Boolean combination of search specs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum IndexQuery {
    /// Keys with a matching document
    Leaf(SearchSpec),
    /// Keys matched by both sides
    And(Box<IndexQuery>, Box<IndexQuery>),
    /// Keys matched by either side
    Or(Box<IndexQuery>, Box<IndexQuery>),
    /// Keys of the keyspace not matched by the inner query
    Not(Box<IndexQuery>),
}

impl IndexQuery {
    /// Query matching the keys selected by `spec`
    pub fn matching(spec: SearchSpec) -> Self {
        IndexQuery::Leaf(spec)
    }

    /// Intersect with `other`
    pub fn and(self, other: IndexQuery) -> Self {
        IndexQuery::And(Box::new(self), Box::new(other))
    }

    /// Union with `other`
    pub fn or(self, other: IndexQuery) -> Self {
        IndexQuery::Or(Box::new(self), Box::new(other))
    }

    /// Complement within the keyspace
    pub fn negate(self) -> Self {
        IndexQuery::Not(Box::new(self))
    }

    /// All leaf specs, left to right
    pub fn leaves(&self) -> Vec<&SearchSpec> {
        let mut out = Vec::new();
        self.collect_leaves(&mut out);
        out
    }

    fn collect_leaves<'a>(&'a self, out: &mut Vec<&'a SearchSpec>) {
        match self {
            IndexQuery::Leaf(spec) => out.push(spec),
            IndexQuery::And(a, b) | IndexQuery::Or(a, b) => {
                a.collect_leaves(out);
                b.collect_leaves(out);
            }
            IndexQuery::Not(inner) => inner.collect_leaves(out),
        }
    }

    /// Evaluate the tree to a key set
    ///
    /// `leaf` resolves one spec to the keys it matches; `universe` yields
    /// every key of the keyspace and is only called for `Not` nodes.
    pub fn evaluate<L, U>(&self, leaf: &mut L, universe: &mut U) -> Result<BTreeSet<String>>
    where
        L: FnMut(&SearchSpec) -> Result<BTreeSet<String>>,
        U: FnMut() -> Result<BTreeSet<String>>,
    {
        match self {
            IndexQuery::Leaf(spec) => leaf(spec),
            IndexQuery::And(a, b) => {
                let left = a.evaluate(leaf, universe)?;
                if left.is_empty() {
                    return Ok(left);
                }
                let right = b.evaluate(leaf, universe)?;
                Ok(left.intersection(&right).cloned().collect())
            }
            IndexQuery::Or(a, b) => {
                let mut left = a.evaluate(leaf, universe)?;
                left.extend(b.evaluate(leaf, universe)?);
                Ok(left)
            }
            IndexQuery::Not(inner) => {
                let excluded = inner.evaluate(leaf, universe)?;
                let all = universe()?;
                Ok(all.difference(&excluded).cloned().collect())
            }
        }
    }
}

impl From<SearchSpec> for IndexQuery {
    fn from(spec: SearchSpec) -> Self {
        IndexQuery::Leaf(spec)
    }
}
