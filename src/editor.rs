//! Editing session over a segment's condition tree.
//!
//! Mirrors what the segment builder UI does with its in-memory tree: nodes get
//! fresh ids on insert, edits address nodes by id, and the SQL editor replaces
//! the whole tree with whatever the reverse compiler recovers from typed SQL.

use crate::condition::{
    AttributeCondition, Condition, ConditionGroup, EventCondition, FilterCriteria, GroupItem, RelatedCondition,
    SegmentDefinition,
};
use crate::operator::LogicalOperator;
use crate::sql_compiler::SqlCompiler;
use crate::sql_parser::{parse_sql, sql_equivalent, DroppedFragment};
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EditError {
    #[error("no condition or group with id {0}")]
    NotFound(u64),
    #[error("no group with id {0}")]
    GroupNotFound(u64),
    #[error("no event condition with id {0}")]
    EventNotFound(u64),
}

/// Hands out ids that are never reused within a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdAllocator {
    next: u64,
}

impl Default for IdAllocator {
    fn default() -> Self {
        Self { next: 1 }
    }
}

impl IdAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start after the largest id already present in `criteria`.
    pub fn seeded_from(criteria: &FilterCriteria) -> Self {
        Self {
            next: criteria.max_id() + 1,
        }
    }

    pub fn next_id(&mut self) -> u64 {
        let id = self.next;
        self.next += 1;
        id
    }

    /// Give `condition` and everything nested in it fresh ids.
    pub fn assign_condition(&mut self, condition: &mut Condition) {
        self.assign_nested(condition);
        condition.set_id(self.next_id());
    }

    fn assign_nested(&mut self, condition: &mut Condition) {
        if let Some(event) = condition.as_event_mut() {
            for nested in &mut event.attribute_conditions {
                self.assign_condition(nested);
            }
            for related in &mut event.related_conditions {
                self.assign_related(related);
            }
        }
    }

    pub fn assign_related(&mut self, related: &mut RelatedCondition) {
        for attribute in &mut related.related_attribute_conditions {
            attribute.id = self.next_id();
        }
        related.id = self.next_id();
    }

    pub fn assign_group(&mut self, group: &mut ConditionGroup) {
        for item in &mut group.conditions {
            self.assign_item(item);
        }
        group.id = self.next_id();
    }

    pub fn assign_item(&mut self, item: &mut GroupItem) {
        match item {
            GroupItem::Condition(condition) => self.assign_condition(condition),
            GroupItem::Group(group) => self.assign_group(group),
        }
    }
}

/// A segment being edited, either node by node or through typed SQL.
#[derive(Debug, Clone)]
pub struct SegmentEditor {
    dataset: String,
    criteria: FilterCriteria,
    ids: IdAllocator,
    compiler: SqlCompiler,
    dropped: Vec<DroppedFragment>,
}

impl SegmentEditor {
    pub fn new(dataset: impl Into<String>, compiler: SqlCompiler) -> Self {
        Self::with_criteria(dataset, FilterCriteria::default(), compiler)
    }

    pub fn with_criteria(dataset: impl Into<String>, criteria: FilterCriteria, compiler: SqlCompiler) -> Self {
        Self {
            dataset: dataset.into(),
            ids: IdAllocator::seeded_from(&criteria),
            criteria,
            compiler,
            dropped: Vec::new(),
        }
    }

    pub fn from_segment(segment: SegmentDefinition, compiler: SqlCompiler) -> Self {
        Self::with_criteria(segment.dataset, segment.filter_criteria, compiler)
    }

    pub fn dataset(&self) -> &str {
        &self.dataset
    }

    pub fn criteria(&self) -> &FilterCriteria {
        &self.criteria
    }

    pub fn into_criteria(self) -> FilterCriteria {
        self.criteria
    }

    /// Fragments the last [`SegmentEditor::apply_sql`] could not keep.
    pub fn dropped(&self) -> &[DroppedFragment] {
        &self.dropped
    }

    /// SQL for the current tree.
    pub fn sql(&self) -> String {
        self.compiler.compile_criteria(&self.dataset, &self.criteria)
    }

    /// Whether `typed_sql` differs from the SQL of the current tree.
    pub fn has_unsaved_changes(&self, typed_sql: &str) -> bool {
        !sql_equivalent(typed_sql, &self.sql())
    }

    /// Replace the tree with the one recovered from `sql`.
    pub fn apply_sql(&mut self, sql: &str) -> &[DroppedFragment] {
        let parsed = parse_sql(sql);
        if let Some(dataset) = parsed.dataset.as_deref() {
            if dataset != self.dataset {
                info!(from = %self.dataset, to = %dataset, "segment dataset changed by SQL edit");
                self.dataset = dataset.to_string();
            }
        }
        self.dropped = parsed.dropped.clone();
        for fragment in &self.dropped {
            warn!(reason = %fragment.reason, text = %fragment.text, "dropped SQL fragment");
        }

        self.criteria = parsed.into_criteria();
        self.ids = IdAllocator::seeded_from(&self.criteria);
        debug!(sql = %self.sql(), "regenerated SQL after edit");
        &self.dropped
    }

    pub fn set_root_operator(&mut self, operator: LogicalOperator) {
        self.criteria.root_operator = operator;
    }

    pub fn set_group_operator(&mut self, group_id: u64, operator: LogicalOperator) -> Result<(), EditError> {
        let group = find_group_mut(&mut self.criteria.condition_groups, group_id)
            .ok_or(EditError::GroupNotFound(group_id))?;
        group.operator = operator;
        Ok(())
    }

    /// Append to the root condition list; returns the new id.
    pub fn add_condition(&mut self, condition: impl Into<Condition>) -> u64 {
        let mut condition = condition.into();
        self.ids.assign_condition(&mut condition);
        let id = condition.id();
        self.criteria.conditions.push(condition);
        id
    }

    /// Append an empty group to the root; returns the new id.
    pub fn add_group(&mut self, operator: LogicalOperator) -> u64 {
        let id = self.ids.next_id();
        self.criteria.condition_groups.push(ConditionGroup::new(id, operator));
        id
    }

    pub fn add_to_group(&mut self, group_id: u64, item: impl Into<GroupItem>) -> Result<u64, EditError> {
        let group = find_group_mut(&mut self.criteria.condition_groups, group_id)
            .ok_or(EditError::GroupNotFound(group_id))?;
        let mut item = item.into();
        self.ids.assign_item(&mut item);
        let id = item.id();
        group.conditions.push(item);
        Ok(id)
    }

    pub fn add_event_attribute(&mut self, event_id: u64, condition: AttributeCondition) -> Result<u64, EditError> {
        let event = find_event_mut(&mut self.criteria, event_id)?;
        let mut condition = Condition::from(condition);
        self.ids.assign_condition(&mut condition);
        let id = condition.id();
        event.attribute_conditions.push(condition);
        Ok(id)
    }

    pub fn add_related_condition(&mut self, event_id: u64, related: RelatedCondition) -> Result<u64, EditError> {
        let event = find_event_mut(&mut self.criteria, event_id)?;
        let mut related = related;
        self.ids.assign_related(&mut related);
        let id = related.id;
        event.related_conditions.push(related);
        Ok(id)
    }

    /// Replace the condition `id`, keeping its id. Nested nodes of the
    /// replacement get fresh ids.
    pub fn update_condition(&mut self, id: u64, replacement: impl Into<Condition>) -> Result<(), EditError> {
        let slot = find_condition_mut(&mut self.criteria, id).ok_or(EditError::NotFound(id))?;
        let mut replacement = replacement.into();
        self.ids.assign_nested(&mut replacement);
        replacement.set_id(id);
        *slot = replacement;
        Ok(())
    }

    /// Remove any node by id: condition, group, event filter or related condition.
    pub fn remove(&mut self, id: u64) -> Result<(), EditError> {
        if remove_node(&mut self.criteria, id) {
            Ok(())
        } else {
            Err(EditError::NotFound(id))
        }
    }
}

fn find_event_mut(criteria: &mut FilterCriteria, id: u64) -> Result<&mut EventCondition, EditError> {
    find_condition_mut(criteria, id)
        .and_then(Condition::as_event_mut)
        .ok_or(EditError::EventNotFound(id))
}

fn find_group_mut(groups: &mut [ConditionGroup], id: u64) -> Option<&mut ConditionGroup> {
    groups.iter_mut().find_map(|group| {
        if group.id == id {
            Some(group)
        } else {
            group.conditions.iter_mut().find_map(|item| match item {
                GroupItem::Group(nested) => find_group_mut(std::slice::from_mut(nested), id),
                GroupItem::Condition(_) => None,
            })
        }
    })
}

fn find_condition_mut(criteria: &mut FilterCriteria, id: u64) -> Option<&mut Condition> {
    if let Some(index) = criteria.conditions.iter().position(|c| c.id() == id) {
        return criteria.conditions.get_mut(index);
    }
    criteria
        .condition_groups
        .iter_mut()
        .find_map(|group| find_condition_in_items(&mut group.conditions, id))
}

fn find_condition_in_items(items: &mut [GroupItem], id: u64) -> Option<&mut Condition> {
    items.iter_mut().find_map(|item| match item {
        GroupItem::Condition(condition) if condition.id() == id => Some(condition),
        GroupItem::Condition(_) => None,
        GroupItem::Group(group) => find_condition_in_items(&mut group.conditions, id),
    })
}

fn remove_node(criteria: &mut FilterCriteria, id: u64) -> bool {
    if let Some(index) = criteria.conditions.iter().position(|c| c.id() == id) {
        criteria.conditions.remove(index);
        return true;
    }
    if let Some(index) = criteria.condition_groups.iter().position(|g| g.id == id) {
        criteria.condition_groups.remove(index);
        return true;
    }
    criteria.conditions.iter_mut().any(|c| remove_from_event(c, id))
        || criteria.condition_groups.iter_mut().any(|g| remove_from_group(g, id))
}

fn remove_from_group(group: &mut ConditionGroup, id: u64) -> bool {
    if let Some(index) = group.conditions.iter().position(|item| item.id() == id) {
        group.conditions.remove(index);
        return true;
    }
    group.conditions.iter_mut().any(|item| match item {
        GroupItem::Condition(condition) => remove_from_event(condition, id),
        GroupItem::Group(nested) => remove_from_group(nested, id),
    })
}

fn remove_from_event(condition: &mut Condition, id: u64) -> bool {
    let Some(event) = condition.as_event_mut() else {
        return false;
    };
    if let Some(index) = event.attribute_conditions.iter().position(|c| c.id() == id) {
        event.attribute_conditions.remove(index);
        return true;
    }
    if let Some(index) = event.related_conditions.iter().position(|r| r.id == id) {
        event.related_conditions.remove(index);
        return true;
    }
    event.related_conditions.iter_mut().any(|related| {
        match related.related_attribute_conditions.iter().position(|a| a.id == id) {
            Some(index) => {
                related.related_attribute_conditions.remove(index);
                true
            }
            None => false,
        }
    })
}
