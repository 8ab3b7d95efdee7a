//! Attribute clause builder and the shared fold rule.
//!
//! Values are rendered as-is: strings become single-quoted literals with embedded
//! quotes doubled, everything else is written verbatim. No type checking happens
//! here, callers are expected to hand over values that fit the column.

use crate::condition::AttributeCondition;
use crate::operator::{LogicalOperator, Operator};
use serde_json::Value;

/// Render one attribute comparison against `table`.
///
/// Returns an empty string for operators the builder does not know, and for
/// conditions that cannot be rendered (`between` without an upper bound,
/// `contains_all` without elements).
pub fn build_attribute_clause(table: &str, condition: &AttributeCondition) -> String {
    let column = format!("{}.{}", table, condition.field);
    let value = &condition.value;

    match condition.operator {
        Operator::Equals | Operator::On => format!("{} = {}", column, render_value(value)),
        Operator::NotEquals | Operator::NotOn => format!("{} != {}", column, render_value(value)),
        Operator::Contains => format!("{} LIKE {}", column, like_pattern(value, "%", "%")),
        Operator::NotContains => format!("{} NOT LIKE {}", column, like_pattern(value, "%", "%")),
        Operator::StartsWith => format!("{} LIKE {}", column, like_pattern(value, "", "%")),
        Operator::EndsWith => format!("{} LIKE {}", column, like_pattern(value, "%", "")),
        Operator::GreaterThan | Operator::After => format!("{} > {}", column, render_value(value)),
        Operator::LessThan | Operator::Before => format!("{} < {}", column, render_value(value)),
        Operator::Between => match &condition.value2 {
            Some(upper) => format!(
                "{} BETWEEN {} AND {}",
                column,
                render_value(value),
                render_value(upper)
            ),
            None => String::new(),
        },
        Operator::RelativeDaysAgo => format!(
            "{} >= DATE_SUB(CURRENT_DATE, INTERVAL {} DAY)",
            column,
            render_value(value)
        ),
        Operator::IsNull => format!("{} IS NULL", column),
        Operator::IsNotNull => format!("{} IS NOT NULL", column),
        Operator::ContainsAll => {
            let elements: Vec<&Value> = match value {
                Value::Array(items) => items.iter().collect(),
                Value::Null => Vec::new(),
                other => vec![other],
            };
            let fragments = elements
                .into_iter()
                .map(|element| format!("{} LIKE {}", column, like_pattern(element, "%", "%")));
            fold_clauses(LogicalOperator::And, fragments)
        }
        Operator::IsEmpty => format!("JSON_LENGTH({}) = 0", column),
        Operator::IsNotEmpty => format!("JSON_LENGTH({}) > 0", column),
        Operator::Unknown => String::new(),
    }
}

/// Drop empty fragments, parenthesize the rest and join them with `operator`.
///
/// Zero surviving fragments yields an empty string, which callers read as
/// "no constraint".
pub fn fold_clauses<I, S>(operator: LogicalOperator, clauses: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let separator = format!(" {} ", operator.as_sql());
    clauses
        .into_iter()
        .filter(|clause| !clause.as_ref().trim().is_empty())
        .map(|clause| format!("({})", clause.as_ref()))
        .collect::<Vec<_>>()
        .join(&separator)
}

/// Quote a string literal, doubling embedded single quotes.
pub fn quote_literal(text: &str) -> String {
    format!("'{}'", text.replace('\'', "''"))
}

/// Render a value as a SQL literal.
pub fn render_value(value: &Value) -> String {
    match value {
        Value::String(s) => quote_literal(s),
        Value::Null => "NULL".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        other => quote_literal(&other.to_string()),
    }
}

fn like_pattern(value: &Value, prefix: &str, suffix: &str) -> String {
    let text = match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    };
    quote_literal(&format!("{}{}{}", prefix, text, suffix))
}
