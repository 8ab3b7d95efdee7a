//! SQL compiler that turns a condition tree into a segment query.
//!
//! `generate_sql` output is assembled by hand so that identical trees always
//! produce byte-identical text. Preview and count statements wrap the same WHERE
//! clause through sea-query so they pick up the configured dialect's quoting.

use crate::clause::{build_attribute_clause, fold_clauses};
use crate::condition::{Condition, ConditionGroup, FilterCriteria, GroupItem, SegmentDefinition};
use crate::event_clause::{build_event_clause_with, EventSource};
use crate::operator::{LogicalOperator, SqlDialect};
use sea_query::{
    Alias, Asterisk, Expr, Func, MysqlQueryBuilder, PostgresQueryBuilder, Query, SelectStatement,
};

/// Clause substituted when nothing constrains the segment.
pub const MATCH_ALL: &str = "1=1";

/// Compiler settings
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CompilerConfig {
    pub event_source: EventSource,
    /// Dialect used for preview and count statements
    pub dialect: SqlDialect,
}

/// SQL Compiler that converts condition trees to SQL queries
#[derive(Debug, Clone, Default)]
pub struct SqlCompiler {
    config: CompilerConfig,
}

impl SqlCompiler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(config: CompilerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &CompilerConfig {
        &self.config
    }

    /// Render a single attribute or event condition.
    pub fn condition_clause(&self, table: &str, condition: &Condition) -> String {
        match condition {
            Condition::Attribute(attribute) => build_attribute_clause(table, attribute),
            Condition::Event(event) => build_event_clause_with(&self.config.event_source, table, event),
        }
    }

    /// Fold a group's members with the group's operator, recursing into nested groups.
    pub fn group_clause(&self, group: &ConditionGroup, table: &str) -> String {
        let clauses = group.conditions.iter().map(|item| match item {
            GroupItem::Condition(condition) => self.condition_clause(table, condition),
            GroupItem::Group(nested) => self.group_clause(nested, table),
        });
        fold_clauses(group.operator, clauses)
    }

    /// WHERE body for the given tree, `1=1` when nothing survives the fold.
    pub fn where_clause(
        &self,
        table: &str,
        conditions: &[Condition],
        groups: &[ConditionGroup],
        root_operator: LogicalOperator,
    ) -> String {
        let mut fragments: Vec<String> = conditions
            .iter()
            .map(|condition| self.condition_clause(table, condition))
            .collect();
        fragments.extend(
            groups
                .iter()
                .map(|group| self.group_clause(group, table))
                .filter(|clause| !clause.is_empty()),
        );

        let folded = fold_clauses(root_operator, fragments);
        if folded.is_empty() {
            MATCH_ALL.to_string()
        } else {
            folded
        }
    }

    /// `SELECT * FROM <dataset> WHERE <clause>;`
    pub fn generate_sql(
        &self,
        dataset: &str,
        conditions: &[Condition],
        groups: &[ConditionGroup],
        root_operator: LogicalOperator,
    ) -> String {
        let clause = self.where_clause(dataset, conditions, groups, root_operator);
        format!("SELECT * FROM {} WHERE {};", dataset, clause)
            .trim()
            .to_string()
    }

    pub fn compile_criteria(&self, dataset: &str, criteria: &FilterCriteria) -> String {
        self.generate_sql(
            dataset,
            &criteria.conditions,
            &criteria.condition_groups,
            criteria.root_operator,
        )
    }

    pub fn compile_segment(&self, segment: &SegmentDefinition) -> String {
        self.compile_criteria(&segment.dataset, &segment.filter_criteria)
    }

    /// Row preview of the segment, limited to `limit` rows.
    pub fn preview_sql(&self, dataset: &str, criteria: &FilterCriteria, limit: u64) -> String {
        let statement = Query::select()
            .column(Asterisk)
            .from(Alias::new(dataset))
            .and_where(Expr::cust(self.criteria_clause(dataset, criteria)))
            .limit(limit)
            .to_owned();
        self.render(&statement)
    }

    /// Number of rows matching the segment.
    pub fn count_sql(&self, dataset: &str, criteria: &FilterCriteria) -> String {
        let statement = Query::select()
            .expr(Func::count(Expr::col(Asterisk)))
            .from(Alias::new(dataset))
            .and_where(Expr::cust(self.criteria_clause(dataset, criteria)))
            .to_owned();
        self.render(&statement)
    }

    fn criteria_clause(&self, dataset: &str, criteria: &FilterCriteria) -> String {
        self.where_clause(
            dataset,
            &criteria.conditions,
            &criteria.condition_groups,
            criteria.root_operator,
        )
    }

    fn render(&self, statement: &SelectStatement) -> String {
        match self.config.dialect {
            SqlDialect::Postgres => statement.to_string(PostgresQueryBuilder),
            SqlDialect::Mysql => statement.to_string(MysqlQueryBuilder),
        }
    }
}

/// Generate a segment query with the default event source.
pub fn generate_sql(
    dataset: &str,
    conditions: &[Condition],
    groups: &[ConditionGroup],
    root_operator: LogicalOperator,
) -> String {
    SqlCompiler::new().generate_sql(dataset, conditions, groups, root_operator)
}

/// Fold one group with the default event source.
pub fn build_group_clause(group: &ConditionGroup, table: &str) -> String {
    SqlCompiler::new().group_clause(group, table)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::condition::{AttributeCondition, EventCondition, EventType, Frequency};
    use crate::operator::Operator;

    fn city(id: u64, value: &str) -> AttributeCondition {
        AttributeCondition::new(id, "city", Operator::Equals, value)
    }

    fn purchases(id: u64) -> EventCondition {
        EventCondition::new(id, "customer_id", "customer_id", EventType::Performed)
            .with_frequency(Frequency::AtLeast, 3)
            .within(30, "days")
    }

    #[test]
    fn test_empty_tree_matches_everything() {
        assert_eq!(
            generate_sql("table", &[], &[], LogicalOperator::And),
            "SELECT * FROM table WHERE 1=1;"
        );
    }

    #[test]
    fn test_unrenderable_conditions_fall_back_to_match_all() {
        let unknown = AttributeCondition::new(1, "city", Operator::Unknown, "x");
        let empty_group = ConditionGroup::new(2, LogicalOperator::Or);
        assert_eq!(
            generate_sql("customers", &[unknown.into()], &[empty_group], LogicalOperator::Or),
            "SELECT * FROM customers WHERE 1=1;"
        );
    }

    #[test]
    fn test_flat_conditions() {
        let sql = generate_sql(
            "customers",
            &[city(1, "Hanoi").into(), AttributeCondition::new(2, "age", Operator::GreaterThan, 18).into()],
            &[],
            LogicalOperator::And,
        );
        assert_eq!(
            sql,
            "SELECT * FROM customers WHERE (customers.city = 'Hanoi') AND (customers.age > 18);"
        );
    }

    #[test]
    fn test_group_with_one_condition_adds_one_paren_layer() {
        let condition = city(1, "Hanoi");
        let group = ConditionGroup::new(2, LogicalOperator::And).with_condition(condition.clone());
        assert_eq!(
            build_group_clause(&group, "customers"),
            format!("({})", build_attribute_clause("customers", &condition))
        );
    }

    #[test]
    fn test_nested_groups_recurse() {
        let inner = ConditionGroup::new(3, LogicalOperator::Or)
            .with_condition(city(4, "Hanoi"))
            .with_condition(city(5, "Hue"));
        let outer = ConditionGroup::new(1, LogicalOperator::And)
            .with_condition(AttributeCondition::new(2, "age", Operator::LessThan, 40))
            .with_condition(inner);
        assert_eq!(
            build_group_clause(&outer, "customers"),
            "(customers.age < 40) AND ((customers.city = 'Hanoi') OR (customers.city = 'Hue'))"
        );
    }

    #[test]
    fn test_root_or_between_groups() {
        let first = ConditionGroup::new(1, LogicalOperator::And)
            .with_condition(city(2, "Hanoi"))
            .with_condition(AttributeCondition::new(3, "age", Operator::GreaterThan, 18));
        let second = ConditionGroup::new(4, LogicalOperator::And).with_condition(city(5, "Hue"));
        let groups = [first, second];

        let or_sql = generate_sql("customers", &[], &groups, LogicalOperator::Or);
        assert!(or_sql.contains(")) OR (("));
        assert_eq!(
            or_sql,
            "SELECT * FROM customers WHERE ((customers.city = 'Hanoi') AND (customers.age > 18)) \
             OR ((customers.city = 'Hue'));"
        );

        let and_sql = generate_sql("customers", &[], &groups, LogicalOperator::And);
        assert!(!and_sql.contains(")) OR (("));
    }

    #[test]
    fn test_event_count_threshold() {
        let sql = generate_sql("customers", &[purchases(1).into()], &[], LogicalOperator::And);
        assert!(sql.contains("HAVING COUNT(*) >= 3"));
        assert!(sql.contains("INTERVAL '30 days'"));
    }

    #[test]
    fn test_string_values_are_escaped() {
        let sql = generate_sql("customers", &[city(1, "O'Brien").into()], &[], LogicalOperator::And);
        assert!(sql.contains("'O''Brien'"));
    }

    #[test]
    fn test_generation_is_deterministic() {
        let groups = [ConditionGroup::new(1, LogicalOperator::Or)
            .with_condition(city(2, "Hanoi"))
            .with_condition(purchases(3))];
        let conditions: [Condition; 1] =
            [AttributeCondition::new(4, "age", Operator::Between, 18).with_second_value(30).into()];
        let compiler = SqlCompiler::new();
        let first = compiler.generate_sql("customers", &conditions, &groups, LogicalOperator::And);
        let second = compiler.generate_sql("customers", &conditions, &groups, LogicalOperator::And);
        assert_eq!(first, second);
    }

    #[test]
    fn test_compile_segment_uses_dataset() {
        let criteria = FilterCriteria {
            conditions: vec![city(1, "Hanoi").into()],
            ..Default::default()
        };
        let segment = SegmentDefinition::new("Hanoi", "members", criteria);
        assert_eq!(
            SqlCompiler::new().compile_segment(&segment),
            "SELECT * FROM members WHERE (members.city = 'Hanoi');"
        );
    }

    #[test]
    fn test_custom_event_source_flows_into_groups() {
        let compiler = SqlCompiler::from_config(CompilerConfig {
            event_source: EventSource {
                table: "orders".to_string(),
                timestamp_column: "created_at".to_string(),
            },
            ..Default::default()
        });
        let group = ConditionGroup::new(1, LogicalOperator::And).with_condition(purchases(2));
        let clause = compiler.group_clause(&group, "customers");
        assert!(clause.contains("FROM orders"));
        assert!(clause.contains("orders.created_at >= NOW() - INTERVAL '30 days'"));
    }

    #[test]
    fn test_preview_and_count_statements() {
        let criteria = FilterCriteria {
            conditions: vec![city(1, "Hanoi").into()],
            ..Default::default()
        };
        let compiler = SqlCompiler::new();

        let preview = compiler.preview_sql("customers", &criteria, 25);
        assert!(preview.starts_with("SELECT * FROM \"customers\""));
        assert!(preview.contains("(customers.city = 'Hanoi')"));
        assert!(preview.ends_with("LIMIT 25"));

        let count = compiler.count_sql("customers", &FilterCriteria::default());
        assert!(count.contains("COUNT(*)"));
        assert!(count.contains("1=1"));
    }

    #[test]
    fn test_mysql_preview_quotes_with_backticks() {
        let compiler = SqlCompiler::from_config(CompilerConfig {
            dialect: SqlDialect::Mysql,
            ..Default::default()
        });
        let preview = compiler.preview_sql("customers", &FilterCriteria::default(), 10);
        assert!(preview.contains("FROM `customers`"));
    }
}
