//! Checks a condition tree against the operator vocabulary and configured table schemas.
//!
//! Generation never rejects a tree; these checks are advisory and let the UI or
//! the CLI point at conditions that will render as empty or unexpected SQL.

use crate::condition::{
    AttributeCondition, Condition, ConditionGroup, EventCondition, EventType, FilterCriteria, Frequency,
    GroupItem,
};
use crate::config::SegmentConfig;
use crate::operator::{FieldType, Operator};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationIssue {
    #[error("condition {id}: unknown operator")]
    UnknownOperator { id: u64 },

    #[error("condition {id}: unknown event type")]
    UnknownEventType { id: u64 },

    #[error("condition {id}: unknown frequency")]
    UnknownFrequency { id: u64 },

    #[error("condition {id}: operator `{operator}` is not available for {field_type} field `{field}`")]
    OperatorNotAllowed {
        id: u64,
        field: String,
        operator: Operator,
        field_type: FieldType,
    },

    #[error("condition {id}: `{table}` has no field `{field}`")]
    UnknownField { id: u64, table: String, field: String },

    #[error("condition {id}: `between` needs a second value")]
    MissingSecondValue { id: u64 },

    #[error("group {id} has no conditions")]
    EmptyGroup { id: u64 },
}

impl ValidationIssue {
    /// Id of the node the issue is about.
    pub fn id(&self) -> u64 {
        match self {
            ValidationIssue::UnknownOperator { id }
            | ValidationIssue::UnknownEventType { id }
            | ValidationIssue::UnknownFrequency { id }
            | ValidationIssue::OperatorNotAllowed { id, .. }
            | ValidationIssue::UnknownField { id, .. }
            | ValidationIssue::MissingSecondValue { id }
            | ValidationIssue::EmptyGroup { id } => *id,
        }
    }
}

/// Every issue in `criteria`, in tree order. An empty list means the tree is clean.
pub fn validate_criteria(criteria: &FilterCriteria, dataset: &str, config: &SegmentConfig) -> Vec<ValidationIssue> {
    let mut validator = Validator {
        config,
        issues: Vec::new(),
    };
    for condition in &criteria.conditions {
        validator.condition(dataset, condition);
    }
    for group in &criteria.condition_groups {
        validator.group(dataset, group);
    }
    validator.issues
}

struct Validator<'a> {
    config: &'a SegmentConfig,
    issues: Vec<ValidationIssue>,
}

impl Validator<'_> {
    fn group(&mut self, table: &str, group: &ConditionGroup) {
        if group.conditions.is_empty() {
            self.issues.push(ValidationIssue::EmptyGroup { id: group.id });
        }
        for item in &group.conditions {
            match item {
                GroupItem::Condition(condition) => self.condition(table, condition),
                GroupItem::Group(nested) => self.group(table, nested),
            }
        }
    }

    fn condition(&mut self, table: &str, condition: &Condition) {
        match condition {
            Condition::Attribute(attribute) => self.attribute(table, attribute),
            Condition::Event(event) => self.event(event),
        }
    }

    fn event(&mut self, event: &EventCondition) {
        if event.event_type == EventType::Unknown {
            self.issues.push(ValidationIssue::UnknownEventType { id: event.id });
        }
        if event.frequency == Some(Frequency::Unknown) {
            self.issues.push(ValidationIssue::UnknownFrequency { id: event.id });
        }

        let config = self.config;
        let event_table = config.events.table.as_str();
        for attribute in event.attribute_conditions.iter().filter_map(Condition::as_attribute) {
            self.attribute(event_table, attribute);
        }
        for related in &event.related_conditions {
            for attribute in &related.related_attribute_conditions {
                self.attribute(&related.related_dataset, attribute);
            }
        }
    }

    fn attribute(&mut self, table: &str, condition: &AttributeCondition) {
        let id = condition.id;
        if condition.operator == Operator::Unknown {
            self.issues.push(ValidationIssue::UnknownOperator { id });
            return;
        }
        if condition.operator == Operator::Between && condition.value2.is_none() {
            self.issues.push(ValidationIssue::MissingSecondValue { id });
        }

        if self.config.schema_for(table).is_none() {
            return;
        }
        match self.config.field_type(table, &condition.field) {
            None => self.issues.push(ValidationIssue::UnknownField {
                id,
                table: table.to_string(),
                field: condition.field.clone(),
            }),
            Some(field_type) if !self.config.operators.allows(field_type, condition.operator) => {
                self.issues.push(ValidationIssue::OperatorNotAllowed {
                    id,
                    field: condition.field.clone(),
                    operator: condition.operator,
                    field_type,
                })
            }
            Some(_) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::condition::RelatedCondition;
    use crate::operator::LogicalOperator;
    use serde_json::json;

    fn config() -> SegmentConfig {
        serde_json::from_value(json!({
            "datasets": {
                "customers": { "city": "text", "age": "number", "tags": "array" },
                "transactions": { "channel": "text", "amount": "number" },
                "products": { "category": "text" }
            }
        }))
        .unwrap()
    }

    fn criteria(groups: Vec<ConditionGroup>) -> FilterCriteria {
        FilterCriteria {
            conditions: Vec::new(),
            condition_groups: groups,
            root_operator: LogicalOperator::And,
        }
    }

    #[test]
    fn test_clean_tree_has_no_issues() {
        let group = ConditionGroup::new(1, LogicalOperator::And)
            .with_condition(AttributeCondition::new(2, "city", Operator::Equals, "Hanoi"))
            .with_condition(AttributeCondition::new(3, "age", Operator::Between, 18).with_second_value(30));
        assert!(validate_criteria(&criteria(vec![group]), "customers", &config()).is_empty());
    }

    #[test]
    fn test_operator_family_mismatch() {
        let group = ConditionGroup::new(1, LogicalOperator::And)
            .with_condition(AttributeCondition::new(2, "city", Operator::GreaterThan, 3));
        let issues = validate_criteria(&criteria(vec![group]), "customers", &config());
        assert_eq!(
            issues,
            vec![ValidationIssue::OperatorNotAllowed {
                id: 2,
                field: "city".to_string(),
                operator: Operator::GreaterThan,
                field_type: FieldType::Text,
            }]
        );
        assert_eq!(
            issues[0].to_string(),
            "condition 2: operator `greater_than` is not available for text field `city`"
        );
    }

    #[test]
    fn test_unknown_values_and_missing_bound() {
        let mut event = EventCondition::new(4, "customer_id", "customer_id", EventType::Unknown);
        event.frequency = Some(Frequency::Unknown);
        let group = ConditionGroup::new(1, LogicalOperator::And)
            .with_condition(AttributeCondition::new(2, "city", Operator::Unknown, "x"))
            .with_condition(AttributeCondition::new(3, "age", Operator::Between, 18))
            .with_condition(event);
        let issues = validate_criteria(&criteria(vec![group]), "customers", &config());
        assert_eq!(
            issues,
            vec![
                ValidationIssue::UnknownOperator { id: 2 },
                ValidationIssue::MissingSecondValue { id: 3 },
                ValidationIssue::UnknownEventType { id: 4 },
                ValidationIssue::UnknownFrequency { id: 4 },
            ]
        );
    }

    #[test]
    fn test_unknown_field_only_with_schema() {
        let group = ConditionGroup::new(1, LogicalOperator::And)
            .with_condition(AttributeCondition::new(2, "nickname", Operator::Equals, "x"));
        let with_schema = criteria(vec![group]);
        let issues = validate_criteria(&with_schema, "customers", &config());
        assert!(matches!(&issues[..], [ValidationIssue::UnknownField { id: 2, .. }]));

        assert!(validate_criteria(&with_schema, "leads", &config()).is_empty());
    }

    #[test]
    fn test_event_filters_use_their_own_tables() {
        let mut event = EventCondition::new(2, "customer_id", "customer_id", EventType::Performed)
            .with_frequency(Frequency::AtLeast, 1);
        event
            .attribute_conditions
            .push(AttributeCondition::new(3, "channel", Operator::Equals, "web").into());
        event
            .attribute_conditions
            .push(AttributeCondition::new(4, "city", Operator::Equals, "Hue").into());
        let mut related = RelatedCondition::new(5, "products", "product_id");
        related
            .related_attribute_conditions
            .push(AttributeCondition::new(6, "category", Operator::Between, "a").with_second_value("b"));
        event.related_conditions.push(related);

        let group = ConditionGroup::new(1, LogicalOperator::And).with_condition(event);
        let issues = validate_criteria(&criteria(vec![group]), "customers", &config());
        let ids: Vec<u64> = issues.iter().map(ValidationIssue::id).collect();
        assert_eq!(ids, vec![4, 6]);
        assert!(matches!(issues[0], ValidationIssue::UnknownField { ref table, .. } if table == "transactions"));
    }

    #[test]
    fn test_empty_groups_are_reported() {
        let nested = ConditionGroup::new(2, LogicalOperator::Or);
        let outer = ConditionGroup::new(1, LogicalOperator::And).with_condition(nested);
        let issues = validate_criteria(&criteria(vec![outer, ConditionGroup::new(3, LogicalOperator::And)]), "customers", &config());
        assert_eq!(
            issues,
            vec![
                ValidationIssue::EmptyGroup { id: 2 },
                ValidationIssue::EmptyGroup { id: 3 },
            ]
        );
    }

    #[test]
    fn test_flat_conditions_are_checked() {
        let criteria = FilterCriteria {
            conditions: vec![AttributeCondition::new(1, "tags", Operator::Equals, "vip").into()],
            ..Default::default()
        };
        let issues = validate_criteria(&criteria, "customers", &config());
        assert!(matches!(
            &issues[..],
            [ValidationIssue::OperatorNotAllowed { field_type: FieldType::Array, .. }]
        ));
    }
}
