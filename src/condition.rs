//! Segment condition tree.
//!
//! The shapes here are the `filter_criteria` payload the backend persists and the
//! UI edits, so field names follow the JSON (camelCase) rather than Rust style.

use crate::operator::{LogicalOperator, Operator};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A leaf or event node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Condition {
    Attribute(AttributeCondition),
    Event(EventCondition),
}

impl Condition {
    pub fn id(&self) -> u64 {
        match self {
            Condition::Attribute(c) => c.id,
            Condition::Event(e) => e.id,
        }
    }

    pub fn set_id(&mut self, id: u64) {
        match self {
            Condition::Attribute(c) => c.id = id,
            Condition::Event(e) => e.id = id,
        }
    }

    pub fn as_attribute(&self) -> Option<&AttributeCondition> {
        match self {
            Condition::Attribute(c) => Some(c),
            Condition::Event(_) => None,
        }
    }

    pub fn as_event_mut(&mut self) -> Option<&mut EventCondition> {
        match self {
            Condition::Event(e) => Some(e),
            Condition::Attribute(_) => None,
        }
    }

    /// Largest id in this node, including ids nested inside an event.
    pub fn max_id(&self) -> u64 {
        match self {
            Condition::Attribute(c) => c.id,
            Condition::Event(e) => e.max_id(),
        }
    }
}

impl From<AttributeCondition> for Condition {
    fn from(condition: AttributeCondition) -> Self {
        Condition::Attribute(condition)
    }
}

impl From<EventCondition> for Condition {
    fn from(condition: EventCondition) -> Self {
        Condition::Event(condition)
    }
}

/// Column comparison, e.g. `city equals 'Hanoi'`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttributeCondition {
    pub id: u64,
    pub field: String,
    pub operator: Operator,
    #[serde(default)]
    pub value: Value,
    /// Upper bound, only read by `between`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value2: Option<Value>,
}

impl AttributeCondition {
    pub fn new(id: u64, field: impl Into<String>, operator: Operator, value: impl Into<Value>) -> Self {
        Self {
            id,
            field: field.into(),
            operator,
            value: value.into(),
            value2: None,
        }
    }

    pub fn with_second_value(mut self, value2: impl Into<Value>) -> Self {
        self.value2 = Some(value2.into());
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    Performed,
    NotPerformed,
    FirstTime,
    LastTime,
    #[serde(other)]
    Unknown,
}

/// Count constraint of a `performed` event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Frequency {
    AtLeast,
    Exactly,
    AtMost,
    #[serde(other)]
    Unknown,
}

impl Frequency {
    pub fn comparison(&self) -> Option<&'static str> {
        match self {
            Frequency::AtLeast => Some(">="),
            Frequency::Exactly => Some("="),
            Frequency::AtMost => Some("<="),
            Frequency::Unknown => None,
        }
    }
}

/// "Did the customer perform this event" over the transaction table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventCondition {
    pub id: u64,
    /// Key column on the event table.
    pub column_key: String,
    /// Key column on the outer (dataset) table.
    pub related_col_key: String,
    pub event_type: EventType,
    #[serde(default)]
    pub frequency: Option<Frequency>,
    #[serde(default)]
    pub count: u32,
    #[serde(default)]
    pub time_value: Option<i64>,
    #[serde(default)]
    pub time_period: Option<String>,
    #[serde(default)]
    pub attribute_operator: LogicalOperator,
    /// Attribute filters on the event table. Event entries here are ignored.
    #[serde(default)]
    pub attribute_conditions: Vec<Condition>,
    #[serde(default)]
    pub operator: LogicalOperator,
    #[serde(default)]
    pub related_conditions: Vec<RelatedCondition>,
}

impl EventCondition {
    pub fn new(
        id: u64,
        column_key: impl Into<String>,
        related_col_key: impl Into<String>,
        event_type: EventType,
    ) -> Self {
        Self {
            id,
            column_key: column_key.into(),
            related_col_key: related_col_key.into(),
            event_type,
            frequency: None,
            count: 0,
            time_value: None,
            time_period: None,
            attribute_operator: LogicalOperator::And,
            attribute_conditions: Vec::new(),
            operator: LogicalOperator::And,
            related_conditions: Vec::new(),
        }
    }

    pub fn with_frequency(mut self, frequency: Frequency, count: u32) -> Self {
        self.frequency = Some(frequency);
        self.count = count;
        self
    }

    pub fn within(mut self, time_value: i64, time_period: impl Into<String>) -> Self {
        self.time_value = Some(time_value);
        self.time_period = Some(time_period.into());
        self
    }

    /// `(value, unit)` when both halves of the time window are set.
    pub fn time_window(&self) -> Option<(i64, &str)> {
        match (self.time_value, self.time_period.as_deref()) {
            (Some(value), Some(period)) if !period.trim().is_empty() => Some((value, period.trim())),
            _ => None,
        }
    }

    pub fn max_id(&self) -> u64 {
        let nested = self.attribute_conditions.iter().map(Condition::max_id);
        let related = self.related_conditions.iter().map(RelatedCondition::max_id);
        nested.chain(related).fold(self.id, u64::max)
    }
}

/// Filter on a table joined to the event table through a shared key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelatedCondition {
    pub id: u64,
    pub related_dataset: String,
    pub join_with_key: String,
    /// Columns of the related table, informational only.
    #[serde(default)]
    pub fields: Vec<String>,
    #[serde(default)]
    pub operator: LogicalOperator,
    #[serde(default)]
    pub related_attribute_conditions: Vec<AttributeCondition>,
}

impl RelatedCondition {
    pub fn new(id: u64, related_dataset: impl Into<String>, join_with_key: impl Into<String>) -> Self {
        Self {
            id,
            related_dataset: related_dataset.into(),
            join_with_key: join_with_key.into(),
            fields: Vec::new(),
            operator: LogicalOperator::And,
            related_attribute_conditions: Vec::new(),
        }
    }

    pub fn max_id(&self) -> u64 {
        self.related_attribute_conditions
            .iter()
            .map(|c| c.id)
            .fold(self.id, u64::max)
    }
}

/// Conditions combined by one shared operator. Serialized with `"type": "group"`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename = "group")]
pub struct ConditionGroup {
    pub id: u64,
    #[serde(default)]
    pub operator: LogicalOperator,
    #[serde(default)]
    pub conditions: Vec<GroupItem>,
}

impl ConditionGroup {
    pub fn new(id: u64, operator: LogicalOperator) -> Self {
        Self {
            id,
            operator,
            conditions: Vec::new(),
        }
    }

    pub fn with_condition(mut self, condition: impl Into<GroupItem>) -> Self {
        self.conditions.push(condition.into());
        self
    }

    pub fn max_id(&self) -> u64 {
        self.conditions.iter().map(GroupItem::max_id).fold(self.id, u64::max)
    }
}

/// Member of a group. The UI only builds conditions, but groups may nest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum GroupItem {
    Condition(Condition),
    Group(ConditionGroup),
}

impl GroupItem {
    pub fn id(&self) -> u64 {
        match self {
            GroupItem::Condition(c) => c.id(),
            GroupItem::Group(g) => g.id,
        }
    }

    pub fn max_id(&self) -> u64 {
        match self {
            GroupItem::Condition(c) => c.max_id(),
            GroupItem::Group(g) => g.max_id(),
        }
    }
}

impl From<Condition> for GroupItem {
    fn from(condition: Condition) -> Self {
        GroupItem::Condition(condition)
    }
}

impl From<AttributeCondition> for GroupItem {
    fn from(condition: AttributeCondition) -> Self {
        GroupItem::Condition(condition.into())
    }
}

impl From<EventCondition> for GroupItem {
    fn from(condition: EventCondition) -> Self {
        GroupItem::Condition(condition.into())
    }
}

impl From<ConditionGroup> for GroupItem {
    fn from(group: ConditionGroup) -> Self {
        GroupItem::Group(group)
    }
}

/// The persisted `filter_criteria` payload.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterCriteria {
    #[serde(default)]
    pub conditions: Vec<Condition>,
    #[serde(default)]
    pub condition_groups: Vec<ConditionGroup>,
    #[serde(default)]
    pub root_operator: LogicalOperator,
}

impl FilterCriteria {
    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty() && self.condition_groups.is_empty()
    }

    /// Largest id anywhere in the tree, 0 for an empty tree.
    pub fn max_id(&self) -> u64 {
        let conditions = self.conditions.iter().map(Condition::max_id);
        let groups = self.condition_groups.iter().map(ConditionGroup::max_id);
        conditions.chain(groups).max().unwrap_or(0)
    }
}

/// A saved segment as exchanged with the backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SegmentDefinition {
    pub segment_id: String,
    pub segment_name: String,
    pub dataset: String,
    #[serde(default)]
    pub filter_criteria: FilterCriteria,
}

impl SegmentDefinition {
    pub fn new(name: impl Into<String>, dataset: impl Into<String>, filter_criteria: FilterCriteria) -> Self {
        let segment_name = name.into();
        Self {
            segment_id: segment_id_for(&segment_name),
            segment_name,
            dataset: dataset.into(),
            filter_criteria,
        }
    }
}

/// `segment:<slug>` where the slug is lowercase ASCII alphanumerics joined by `_`.
pub fn segment_id_for(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    for c in name.chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
        } else if !slug.is_empty() && !slug.ends_with('_') {
            slug.push('_');
        }
    }
    while slug.ends_with('_') {
        slug.pop();
    }
    format!("segment:{}", slug)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_deserialize_filter_criteria() {
        let payload = json!({
            "conditions": [
                {"id": 1, "type": "attribute", "field": "city", "operator": "equals", "value": "Hanoi"}
            ],
            "conditionGroups": [
                {
                    "id": 2,
                    "type": "group",
                    "operator": "OR",
                    "conditions": [
                        {"id": 3, "type": "attribute", "field": "age", "operator": "between", "value": 18, "value2": 30},
                        {
                            "id": 4,
                            "type": "event",
                            "columnKey": "customer_id",
                            "relatedColKey": "customer_id",
                            "eventType": "performed",
                            "frequency": "at_least",
                            "count": 3,
                            "timeValue": 30,
                            "timePeriod": "days",
                            "attributeOperator": "AND",
                            "attributeConditions": [],
                            "operator": "AND",
                            "relatedConditions": []
                        }
                    ]
                }
            ],
            "rootOperator": "AND"
        });

        let criteria: FilterCriteria = serde_json::from_value(payload).unwrap();
        assert_eq!(criteria.conditions.len(), 1);
        assert_eq!(criteria.condition_groups.len(), 1);

        let group = &criteria.condition_groups[0];
        assert_eq!(group.operator, LogicalOperator::Or);
        match &group.conditions[1] {
            GroupItem::Condition(Condition::Event(event)) => {
                assert_eq!(event.event_type, EventType::Performed);
                assert_eq!(event.frequency, Some(Frequency::AtLeast));
                assert_eq!(event.time_window(), Some((30, "days")));
            }
            other => panic!("Expected event condition, got {:?}", other),
        }
        assert_eq!(criteria.max_id(), 4);
    }

    #[test]
    fn test_group_serializes_type_tag() {
        let group = ConditionGroup::new(7, LogicalOperator::And)
            .with_condition(AttributeCondition::new(8, "city", Operator::Equals, "Hanoi"));
        let value = serde_json::to_value(&group).unwrap();
        assert_eq!(value["type"], "group");
        assert_eq!(value["conditions"][0]["type"], "attribute");

        let back: ConditionGroup = serde_json::from_value(value).unwrap();
        assert_eq!(back, group);
    }

    #[test]
    fn test_nested_group_item() {
        let payload = json!({
            "id": 1,
            "type": "group",
            "operator": "AND",
            "conditions": [
                {"id": 2, "type": "group", "operator": "OR", "conditions": []}
            ]
        });
        let group: ConditionGroup = serde_json::from_value(payload).unwrap();
        assert!(matches!(group.conditions[0], GroupItem::Group(_)));
    }

    #[test]
    fn test_unknown_event_type_is_tolerated() {
        let payload = json!({
            "id": 1,
            "type": "event",
            "columnKey": "customer_id",
            "relatedColKey": "customer_id",
            "eventType": "abandoned_cart",
            "frequency": "sometimes"
        });
        let condition: Condition = serde_json::from_value(payload).unwrap();
        match condition {
            Condition::Event(event) => {
                assert_eq!(event.event_type, EventType::Unknown);
                assert_eq!(event.frequency, Some(Frequency::Unknown));
                assert!(event.time_window().is_none());
            }
            _ => panic!("Expected event condition"),
        }
    }

    #[test]
    fn test_time_window_requires_both_halves() {
        let mut event = EventCondition::new(1, "customer_id", "customer_id", EventType::Performed);
        event.time_value = Some(7);
        assert!(event.time_window().is_none());
        event.time_period = Some("  ".to_string());
        assert!(event.time_window().is_none());
    }

    #[test]
    fn test_max_id_includes_nested_event_ids() {
        let mut event = EventCondition::new(2, "customer_id", "customer_id", EventType::Performed);
        event
            .attribute_conditions
            .push(AttributeCondition::new(9, "amount", Operator::GreaterThan, 10).into());
        let mut related = RelatedCondition::new(5, "products", "product_id");
        related
            .related_attribute_conditions
            .push(AttributeCondition::new(11, "category", Operator::Equals, "shoes"));
        event.related_conditions.push(related);

        let criteria = FilterCriteria {
            conditions: vec![event.into()],
            ..Default::default()
        };
        assert_eq!(criteria.max_id(), 11);
        assert_eq!(FilterCriteria::default().max_id(), 0);
    }

    #[test]
    fn test_segment_id_slug() {
        assert_eq!(segment_id_for("High Value  Customers!"), "segment:high_value_customers");
        assert_eq!(segment_id_for("  VIP"), "segment:vip");
        let segment = SegmentDefinition::new("Repeat Buyers", "customers", FilterCriteria::default());
        assert_eq!(segment.segment_id, "segment:repeat_buyers");
    }
}
