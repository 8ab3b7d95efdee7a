//! Event clause builder: correlated `EXISTS` sub-queries over the event table.

use crate::clause::{build_attribute_clause, fold_clauses};
use crate::condition::{EventCondition, EventType, RelatedCondition};
use crate::operator::LogicalOperator;
use serde::{Deserialize, Serialize};

/// The table events are read from and its timestamp column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EventSource {
    pub table: String,
    pub timestamp_column: String,
}

impl Default for EventSource {
    fn default() -> Self {
        Self {
            table: "transactions".to_string(),
            timestamp_column: "transaction_date".to_string(),
        }
    }
}

/// Render an event condition correlated with `outer_table` using the default
/// `transactions` source.
pub fn build_event_clause(outer_table: &str, event: &EventCondition) -> String {
    build_event_clause_with(&EventSource::default(), outer_table, event)
}

/// Render an event condition against an explicit event source.
///
/// Unknown event types render as an empty string.
pub fn build_event_clause_with(source: &EventSource, outer_table: &str, event: &EventCondition) -> String {
    let table = source.table.as_str();
    let window = event.time_window().map(|(value, period)| interval(value, period));

    let mut correlation = format!(
        "{}.{} = {}.{}",
        table, event.column_key, outer_table, event.related_col_key
    );
    if let Some(interval) = &window {
        correlation.push_str(&format!(
            " AND {}.{} >= NOW() - {}",
            table, source.timestamp_column, interval
        ));
    }

    let attribute_fold = fold_clauses(
        event.attribute_operator,
        event
            .attribute_conditions
            .iter()
            .filter_map(|c| c.as_attribute())
            .map(|c| build_attribute_clause(table, c)),
    );

    let mut joins = String::new();
    let mut related_folds = Vec::new();
    for related in event.related_conditions.iter().filter(|r| is_joinable(r)) {
        let dataset = related.related_dataset.as_str();
        let key = related.join_with_key.as_str();
        joins.push_str(&format!(
            " INNER JOIN {} ON {}.{} = {}.{}",
            dataset, table, key, dataset, key
        ));
        related_folds.push(fold_clauses(
            related.operator,
            related
                .related_attribute_conditions
                .iter()
                .map(|c| build_attribute_clause(dataset, c)),
        ));
    }

    let mut parts = vec![correlation, attribute_fold];
    parts.extend(related_folds);
    let combined = fold_clauses(LogicalOperator::And, parts);

    let group_by = format!(" GROUP BY {}.{}", table, event.column_key);
    match event.event_type {
        EventType::Performed => {
            let having = event
                .frequency
                .and_then(|f| f.comparison())
                .map(|op| format!(" HAVING COUNT(*) {} {}", op, event.count))
                .unwrap_or_default();
            format!(
                "EXISTS (SELECT 1 FROM {}{} WHERE {}{}{})",
                table, joins, combined, group_by, having
            )
        }
        EventType::NotPerformed => {
            format!("NOT EXISTS (SELECT 1 FROM {}{} WHERE {})", table, joins, combined)
        }
        EventType::FirstTime | EventType::LastTime => {
            let aggregate = if event.event_type == EventType::FirstTime {
                "MIN"
            } else {
                "MAX"
            };
            let having = window
                .map(|interval| {
                    format!(
                        " HAVING {}({}.{}) >= NOW() - {}",
                        aggregate, table, source.timestamp_column, interval
                    )
                })
                .unwrap_or_default();
            format!(
                "EXISTS (SELECT 1 FROM {}{} WHERE {}{}{})",
                table, joins, combined, group_by, having
            )
        }
        EventType::Unknown => String::new(),
    }
}

fn interval(value: i64, period: &str) -> String {
    format!("INTERVAL '{} {}'", value, period.replace('\'', "''"))
}

// Rows the UI has not finished filling in produce no join.
fn is_joinable(related: &RelatedCondition) -> bool {
    !related.related_dataset.trim().is_empty() && !related.join_with_key.trim().is_empty()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::condition::{AttributeCondition, Frequency};
    use crate::operator::Operator;

    fn purchase() -> EventCondition {
        EventCondition::new(1, "customer_id", "customer_id", EventType::Performed)
    }

    #[test]
    fn test_performed_with_frequency_and_window() {
        let event = purchase().with_frequency(Frequency::AtLeast, 3).within(30, "days");
        assert_eq!(
            build_event_clause("customers", &event),
            "EXISTS (SELECT 1 FROM transactions WHERE (transactions.customer_id = customers.customer_id \
             AND transactions.transaction_date >= NOW() - INTERVAL '30 days') \
             GROUP BY transactions.customer_id HAVING COUNT(*) >= 3)"
        );
    }

    #[test]
    fn test_frequency_comparisons() {
        let exactly = build_event_clause("customers", &purchase().with_frequency(Frequency::Exactly, 2));
        assert!(exactly.ends_with("HAVING COUNT(*) = 2)"));
        let at_most = build_event_clause("customers", &purchase().with_frequency(Frequency::AtMost, 5));
        assert!(at_most.ends_with("HAVING COUNT(*) <= 5)"));
    }

    #[test]
    fn test_performed_without_frequency_omits_having() {
        let clause = build_event_clause("customers", &purchase());
        assert_eq!(
            clause,
            "EXISTS (SELECT 1 FROM transactions WHERE (transactions.customer_id = customers.customer_id) \
             GROUP BY transactions.customer_id)"
        );
        let unknown = build_event_clause("customers", &purchase().with_frequency(Frequency::Unknown, 4));
        assert!(!unknown.contains("HAVING"));
    }

    #[test]
    fn test_not_performed_has_no_aggregation() {
        let mut event = purchase().with_frequency(Frequency::AtLeast, 1).within(7, "days");
        event.event_type = EventType::NotPerformed;
        let clause = build_event_clause("customers", &event);
        assert!(clause.starts_with("NOT EXISTS (SELECT 1 FROM transactions WHERE"));
        assert!(!clause.contains("GROUP BY"));
        assert!(!clause.contains("HAVING"));
        assert!(clause.contains("INTERVAL '7 days'"));
    }

    #[test]
    fn test_first_and_last_time_gate_on_aggregate() {
        let mut event = purchase().with_frequency(Frequency::AtLeast, 9).within(14, "days");
        event.event_type = EventType::FirstTime;
        let first = build_event_clause("customers", &event);
        assert!(first.contains("HAVING MIN(transactions.transaction_date) >= NOW() - INTERVAL '14 days'"));
        assert!(!first.contains("COUNT(*)"));

        event.event_type = EventType::LastTime;
        let last = build_event_clause("customers", &event);
        assert!(last.contains("HAVING MAX(transactions.transaction_date) >= NOW() - INTERVAL '14 days'"));
    }

    #[test]
    fn test_unknown_event_type_renders_nothing() {
        let mut event = purchase();
        event.event_type = EventType::Unknown;
        assert_eq!(build_event_clause("customers", &event), "");
    }

    #[test]
    fn test_attribute_and_related_filters() {
        let mut event = purchase().with_frequency(Frequency::AtLeast, 1);
        event.attribute_operator = LogicalOperator::Or;
        event
            .attribute_conditions
            .push(AttributeCondition::new(2, "channel", Operator::Equals, "web").into());
        event
            .attribute_conditions
            .push(AttributeCondition::new(3, "amount", Operator::GreaterThan, 100).into());

        let mut related = RelatedCondition::new(4, "products", "product_id");
        related
            .related_attribute_conditions
            .push(AttributeCondition::new(5, "category", Operator::Equals, "shoes"));
        event.related_conditions.push(related);

        assert_eq!(
            build_event_clause("customers", &event),
            "EXISTS (SELECT 1 FROM transactions INNER JOIN products ON transactions.product_id = products.product_id \
             WHERE (transactions.customer_id = customers.customer_id) \
             AND ((transactions.channel = 'web') OR (transactions.amount > 100)) \
             AND ((products.category = 'shoes')) \
             GROUP BY transactions.customer_id HAVING COUNT(*) >= 1)"
        );
    }

    #[test]
    fn test_incomplete_related_condition_is_skipped() {
        let mut event = purchase();
        event.related_conditions.push(RelatedCondition::new(2, "", "product_id"));
        let clause = build_event_clause("customers", &event);
        assert!(!clause.contains("JOIN"));
    }

    #[test]
    fn test_custom_event_source() {
        let source = EventSource {
            table: "orders".to_string(),
            timestamp_column: "ordered_at".to_string(),
        };
        let event = purchase().within(2, "weeks");
        let clause = build_event_clause_with(&source, "users", &event);
        assert!(clause.contains("FROM orders WHERE (orders.customer_id = users.customer_id"));
        assert!(clause.contains("orders.ordered_at >= NOW() - INTERVAL '2 weeks'"));
    }
}
