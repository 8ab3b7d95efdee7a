//! Operator vocabulary shared by the clause builder, validation and the UI.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Boolean combinator used by groups, folds and the root of a segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum LogicalOperator {
    #[default]
    #[serde(rename = "AND", alias = "and")]
    And,
    #[serde(rename = "OR", alias = "or")]
    Or,
}

impl LogicalOperator {
    pub fn as_sql(&self) -> &'static str {
        match self {
            LogicalOperator::And => "AND",
            LogicalOperator::Or => "OR",
        }
    }
}

impl fmt::Display for LogicalOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_sql())
    }
}

/// Attribute comparison operators.
///
/// Anything the UI sends that is not in this list deserializes to
/// [`Operator::Unknown`], which the clause builder renders as an empty fragment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operator {
    Equals,
    NotEquals,
    Contains,
    NotContains,
    StartsWith,
    EndsWith,
    GreaterThan,
    LessThan,
    Between,
    After,
    Before,
    On,
    NotOn,
    RelativeDaysAgo,
    IsNull,
    IsNotNull,
    ContainsAll,
    IsEmpty,
    IsNotEmpty,
    #[serde(other)]
    Unknown,
}

impl Operator {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operator::Equals => "equals",
            Operator::NotEquals => "not_equals",
            Operator::Contains => "contains",
            Operator::NotContains => "not_contains",
            Operator::StartsWith => "starts_with",
            Operator::EndsWith => "ends_with",
            Operator::GreaterThan => "greater_than",
            Operator::LessThan => "less_than",
            Operator::Between => "between",
            Operator::After => "after",
            Operator::Before => "before",
            Operator::On => "on",
            Operator::NotOn => "not_on",
            Operator::RelativeDaysAgo => "relative_days_ago",
            Operator::IsNull => "is_null",
            Operator::IsNotNull => "is_not_null",
            Operator::ContainsAll => "contains_all",
            Operator::IsEmpty => "is_empty",
            Operator::IsNotEmpty => "is_not_empty",
            Operator::Unknown => "unknown",
        }
    }

    /// Operators that ignore `value` entirely.
    pub fn is_unary(&self) -> bool {
        matches!(
            self,
            Operator::IsNull | Operator::IsNotNull | Operator::IsEmpty | Operator::IsNotEmpty
        )
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Attribute type families. Each family offers a fixed subset of operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    Text,
    Number,
    Datetime,
    Boolean,
    Array,
}

impl FieldType {
    pub const ALL: [FieldType; 5] = [
        FieldType::Text,
        FieldType::Number,
        FieldType::Datetime,
        FieldType::Boolean,
        FieldType::Array,
    ];

    /// Built-in operator list for this family.
    pub fn default_operators(&self) -> &'static [Operator] {
        use Operator::*;
        match self {
            FieldType::Text => &[
                Equals, NotEquals, Contains, NotContains, StartsWith, EndsWith, IsNull, IsNotNull,
            ],
            FieldType::Number => &[Equals, NotEquals, GreaterThan, LessThan, Between, IsNull, IsNotNull],
            FieldType::Datetime => &[After, Before, On, NotOn, RelativeDaysAgo, IsNull, IsNotNull],
            FieldType::Boolean => &[Equals, NotEquals],
            FieldType::Array => &[ContainsAll, IsEmpty, IsNotEmpty],
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FieldType::Text => "text",
            FieldType::Number => "number",
            FieldType::Datetime => "datetime",
            FieldType::Boolean => "boolean",
            FieldType::Array => "array",
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Operator table keyed by field type. Families missing from a configured
/// table fall back to their built-in list.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OperatorVocabulary {
    overrides: BTreeMap<FieldType, Vec<Operator>>,
}

impl OperatorVocabulary {
    pub fn with_override(mut self, field_type: FieldType, operators: Vec<Operator>) -> Self {
        self.overrides.insert(field_type, operators);
        self
    }

    pub fn operators_for(&self, field_type: FieldType) -> &[Operator] {
        self.overrides
            .get(&field_type)
            .map(Vec::as_slice)
            .unwrap_or_else(|| field_type.default_operators())
    }

    pub fn allows(&self, field_type: FieldType, operator: Operator) -> bool {
        self.operators_for(field_type).contains(&operator)
    }
}

/// Target engine for statements rendered through sea-query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SqlDialect {
    #[default]
    Postgres,
    Mysql,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_vocabulary_matches_families() {
        let vocabulary = OperatorVocabulary::default();
        assert!(vocabulary.allows(FieldType::Text, Operator::StartsWith));
        assert!(!vocabulary.allows(FieldType::Text, Operator::Between));
        assert!(vocabulary.allows(FieldType::Number, Operator::Between));
        assert!(vocabulary.allows(FieldType::Datetime, Operator::RelativeDaysAgo));
        assert!(!vocabulary.allows(FieldType::Boolean, Operator::IsNull));
        assert_eq!(vocabulary.operators_for(FieldType::Array).len(), 3);
    }

    #[test]
    fn test_override_replaces_only_one_family() {
        let vocabulary =
            OperatorVocabulary::default().with_override(FieldType::Boolean, vec![Operator::Equals]);
        assert!(!vocabulary.allows(FieldType::Boolean, Operator::NotEquals));
        assert!(vocabulary.allows(FieldType::Text, Operator::NotEquals));
    }

    #[test]
    fn test_unknown_operator_deserializes() {
        let op: Operator = serde_json::from_str(r#""fuzzy_match""#).unwrap();
        assert_eq!(op, Operator::Unknown);
        let op: Operator = serde_json::from_str(r#""relative_days_ago""#).unwrap();
        assert_eq!(op, Operator::RelativeDaysAgo);
    }

    #[test]
    fn test_vocabulary_from_json() {
        let vocabulary: OperatorVocabulary =
            serde_json::from_str(r#"{"text": ["equals", "contains"]}"#).unwrap();
        assert_eq!(
            vocabulary.operators_for(FieldType::Text),
            &[Operator::Equals, Operator::Contains]
        );
        assert!(vocabulary.allows(FieldType::Number, Operator::GreaterThan));
    }

    #[test]
    fn test_logical_operator_accepts_lowercase() {
        let op: LogicalOperator = serde_json::from_str(r#""or""#).unwrap();
        assert_eq!(op, LogicalOperator::Or);
        assert_eq!(serde_json::to_string(&op).unwrap(), r#""OR""#);
    }
}
