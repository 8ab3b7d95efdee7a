//! Reverse compiler: turns SQL in the generator's dialect back into a condition tree.
//!
//! This is not a general SQL parser. It understands the nesting shape
//! `generate_sql` emits and reconstructs a tree from it:
//!
//! * every fragment of the root fold becomes one group, even single conditions;
//! * only `table.field = 'text'` and `table.field BETWEEN 'a' AND 'b'` come back
//!   as attribute conditions;
//! * any `EXISTS`/`NOT EXISTS` sub-query comes back as a `performed` /
//!   `at_least` event joined on `customer_id`, keeping only its count threshold,
//!   its time window and the nested filters it can recognise.
//!
//! Everything else is dropped and reported in [`ParsedSql::dropped`].

use crate::ast::{CompOp, Expr, Join, Operand, Predicate, Subquery};
use crate::condition::{
    AttributeCondition, Condition, ConditionGroup, EventCondition, EventType, FilterCriteria, Frequency,
    GroupItem, RelatedCondition,
};
use crate::lexer::tokenize;
use crate::operator::{LogicalOperator, Operator};
use crate::parser::Parser;
use crate::token::{Token, TokenKind};
use serde::Serialize;
use std::fmt;

/// Join key assumed for events recovered from SQL.
pub const DEFAULT_JOIN_KEY: &str = "customer_id";

/// Count assumed for an event sub-query without `HAVING COUNT(*)`.
pub const DEFAULT_EVENT_COUNT: u32 = 1;

/// Result of reverse-compiling a SQL statement.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ParsedSql {
    /// Always empty: recovered conditions are wrapped in groups
    pub conditions: Vec<Condition>,
    pub group_conditions: Vec<ConditionGroup>,
    pub root_operator: LogicalOperator,
    /// Table named in the outer `FROM`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dataset: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub dropped: Vec<DroppedFragment>,
}

impl ParsedSql {
    pub fn into_criteria(self) -> FilterCriteria {
        FilterCriteria {
            conditions: self.conditions,
            condition_groups: self.group_conditions,
            root_operator: self.root_operator,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty() && self.group_conditions.is_empty()
    }
}

/// A piece of the input that did not make it into the tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DroppedFragment {
    pub text: String,
    pub reason: DropReason,
}

impl DroppedFragment {
    fn new(text: impl Into<String>, reason: DropReason) -> Self {
        Self {
            text: text.into(),
            reason,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DropReason {
    NoWhereClause,
    Unparseable,
    UnsupportedPredicate,
    UnsupportedEvent,
    Negation,
    TrailingInput,
}

impl fmt::Display for DropReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            DropReason::NoWhereClause => "no WHERE clause",
            DropReason::Unparseable => "could not be parsed",
            DropReason::UnsupportedPredicate => "only equals and between conditions are recognised",
            DropReason::UnsupportedEvent => "event sub-query without a WHERE clause",
            DropReason::Negation => "negated conditions are not recognised",
            DropReason::TrailingInput => "text after the WHERE clause was ignored",
        })
    }
}

impl fmt::Display for DroppedFragment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.reason, self.text)
    }
}

/// Trim and make sure the statement ends with `;`.
pub fn normalize_sql(sql: &str) -> String {
    let mut normalized = sql.trim().to_string();
    if !normalized.ends_with(';') {
        normalized.push(';');
    }
    normalized
}

/// Whether two statements are the same token for token. Whitespace, comments,
/// keyword case and a missing trailing `;` are not differences.
pub fn sql_equivalent(a: &str, b: &str) -> bool {
    let (a, b) = (normalize_sql(a), normalize_sql(b));
    let (left, right) = (tokenize(&a), tokenize(&b));
    left.len() == right.len() && left.iter().zip(&right).all(|(l, r)| l.kind == r.kind)
}

/// Reverse-compile `sql`. Never fails: unrecognised input yields an empty tree
/// with `AND` as root operator and the reasons in `dropped`.
pub fn parse_sql(sql: &str) -> ParsedSql {
    let normalized = normalize_sql(sql);
    let tokens = tokenize(&normalized);
    let mut result = ParsedSql {
        dataset: outer_dataset(&tokens),
        ..Default::default()
    };

    let Some(body) = where_body(&tokens) else {
        result.dropped.push(DroppedFragment::new(
            normalized.trim_end_matches(';'),
            DropReason::NoWhereClause,
        ));
        return result;
    };

    let mut parser = Parser::new(&normalized, body);
    let expr = match parser.parse_expression() {
        Ok(expr) => expr,
        Err(_) => {
            result.dropped.push(DroppedFragment::new(
                normalized.trim_end_matches(';').trim_end(),
                DropReason::Unparseable,
            ));
            return result;
        }
    };
    if parser.expect_end().is_err() {
        let rest = parser.remaining();
        if let (Some(first), Some(last)) = (rest.first(), rest.last()) {
            let text = normalized.get(first.span.start..last.span.end).unwrap_or_default();
            result
                .dropped
                .push(DroppedFragment::new(text, DropReason::TrailingInput));
        }
    }

    let mut builder = TreeBuilder::default();
    let (groups, root_operator) = builder.build(&expr);
    result.group_conditions = groups;
    result.root_operator = root_operator;
    result.dropped.extend(builder.dropped);
    result
}

/// Tokens between the outer `WHERE` and the statement's `;`.
fn where_body<'t, 'a>(tokens: &'t [Token<'a>]) -> Option<&'t [Token<'a>]> {
    let mut depth = 0usize;
    let mut start = None;
    for (index, token) in tokens.iter().enumerate() {
        match token.kind {
            TokenKind::LParen => depth += 1,
            TokenKind::RParen => depth = depth.saturating_sub(1),
            TokenKind::Where if depth == 0 && start.is_none() => start = Some(index + 1),
            TokenKind::Semicolon if depth == 0 => {
                if let Some(start) = start {
                    return Some(&tokens[start..index]);
                }
            }
            _ => {}
        }
    }
    start.map(|start| &tokens[start..])
}

fn outer_dataset(tokens: &[Token<'_>]) -> Option<String> {
    let mut depth = 0usize;
    for pair in tokens.windows(2) {
        match (&pair[0].kind, &pair[1].kind) {
            (TokenKind::LParen, _) => depth += 1,
            (TokenKind::RParen, _) => depth = depth.saturating_sub(1),
            (TokenKind::From, TokenKind::Identifier(name)) if depth == 0 => return Some(name.to_string()),
            _ => {}
        }
    }
    None
}

/// Rebuilds groups from a WHERE expression, handing out ids from 1.
#[derive(Default)]
struct TreeBuilder {
    last_id: u64,
    dropped: Vec<DroppedFragment>,
}

impl TreeBuilder {
    fn next_id(&mut self) -> u64 {
        self.last_id += 1;
        self.last_id
    }

    fn drop_fragment(&mut self, text: impl Into<String>, reason: DropReason) {
        self.dropped.push(DroppedFragment::new(text, reason));
    }

    fn build(&mut self, expr: &Expr) -> (Vec<ConditionGroup>, LogicalOperator) {
        let (root_operator, fragments) = match expr {
            Expr::Or(items) => (LogicalOperator::Or, items.as_slice()),
            Expr::And(items) => (LogicalOperator::And, items.as_slice()),
            other => (LogicalOperator::And, std::slice::from_ref(other)),
        };
        let groups = fragments
            .iter()
            .filter_map(|fragment| self.group(fragment))
            .collect();
        (groups, root_operator)
    }

    /// One fragment of a fold becomes one group; empty groups are discarded.
    fn group(&mut self, fragment: &Expr) -> Option<ConditionGroup> {
        let (operator, members) = split_fold(fragment.unwrap_group());
        let conditions: Vec<GroupItem> = members
            .iter()
            .filter_map(|member| self.member(member))
            .collect();
        if conditions.is_empty() {
            return None;
        }
        Some(ConditionGroup {
            id: self.next_id(),
            operator,
            conditions,
        })
    }

    fn member(&mut self, expr: &Expr) -> Option<GroupItem> {
        let inner = expr.unwrap_group();
        match inner {
            Expr::And(_) | Expr::Or(_) => self.group(inner).map(GroupItem::Group),
            Expr::Grouped(nested) => self.member(nested),
            Expr::Exists { subquery, .. } => self
                .event(subquery, inner)
                .map(|event| GroupItem::Condition(event.into())),
            Expr::Predicate(predicate) => self
                .attribute(predicate)
                .map(|attribute| GroupItem::Condition(attribute.into())),
            Expr::Not(_) => {
                self.drop_fragment(inner.to_string(), DropReason::Negation);
                None
            }
        }
    }

    fn attribute(&mut self, predicate: &Predicate) -> Option<AttributeCondition> {
        match predicate {
            Predicate::Compare {
                left: Operand::Column(column),
                op: CompOp::Eq,
                right: Operand::String(value),
            } => Some(AttributeCondition::new(
                self.next_id(),
                column.column.as_str(),
                Operator::Equals,
                value.as_str(),
            )),
            Predicate::Between {
                target: Operand::Column(column),
                low: Operand::String(low),
                high: Operand::String(high),
                negated: false,
            } => Some(
                AttributeCondition::new(self.next_id(), column.column.as_str(), Operator::Between, low.as_str())
                    .with_second_value(high.as_str()),
            ),
            p if is_match_all(p) => None,
            Predicate::Unparsed(text) => {
                self.drop_fragment(text.as_str(), DropReason::Unparseable);
                None
            }
            other => {
                self.drop_fragment(other.to_string(), DropReason::UnsupportedPredicate);
                None
            }
        }
    }

    fn event(&mut self, subquery: &Subquery, source: &Expr) -> Option<EventCondition> {
        let Some(filter) = &subquery.filter else {
            self.drop_fragment(source.to_string(), DropReason::UnsupportedEvent);
            return None;
        };

        let count = match subquery.having.as_ref() {
            Some(having) => match having_count(having) {
                Some(count) => count,
                None => {
                    if having.interval().is_none() {
                        self.drop_fragment(having.to_string(), DropReason::UnsupportedPredicate);
                    }
                    DEFAULT_EVENT_COUNT
                }
            },
            None => DEFAULT_EVENT_COUNT,
        };
        let mut event = EventCondition::new(0, DEFAULT_JOIN_KEY, DEFAULT_JOIN_KEY, EventType::Performed)
            .with_frequency(Frequency::AtLeast, count);

        let interval = filter
            .predicates()
            .into_iter()
            .find_map(Predicate::interval)
            .or_else(|| subquery.having.as_ref().and_then(Predicate::interval));
        if let Some((value, period)) = interval.and_then(split_interval) {
            event = event.within(value, period);
        }

        let mut related: Vec<RelatedCondition> = subquery
            .joins
            .iter()
            .map(|join| RelatedCondition::new(0, join.table.as_str(), join_key(join)))
            .collect();

        let conjuncts = match filter {
            Expr::And(items) => items.as_slice(),
            other => std::slice::from_ref(other),
        };
        for conjunct in conjuncts {
            let body = conjunct.unwrap_group();
            if is_correlation(body) {
                continue;
            }
            let (operator, members) = split_fold(body);
            let table = members
                .iter()
                .find_map(|member| match member.innermost() {
                    Expr::Predicate(predicate) => predicate_table(predicate),
                    _ => None,
                })
                .unwrap_or(subquery.table.as_str());

            if table == subquery.table {
                event.attribute_operator = operator;
                for member in members {
                    if let Some(attribute) = self.nested_attribute(member) {
                        event.attribute_conditions.push(attribute.into());
                    }
                }
            } else if let Some(target) = related.iter_mut().find(|r| r.related_dataset == table) {
                target.operator = operator;
                let mut attributes = Vec::new();
                for member in members {
                    attributes.extend(self.nested_attribute(member));
                }
                target.related_attribute_conditions.extend(attributes);
            } else {
                self.drop_fragment(body.to_string(), DropReason::UnsupportedPredicate);
            }
        }

        for condition in &mut related {
            condition.id = self.next_id();
        }
        event.related_conditions = related;
        event.id = self.next_id();
        Some(event)
    }

    fn nested_attribute(&mut self, member: &Expr) -> Option<AttributeCondition> {
        match member.innermost() {
            Expr::Predicate(predicate) => self.attribute(predicate),
            other => {
                self.drop_fragment(other.to_string(), DropReason::UnsupportedPredicate);
                None
            }
        }
    }
}

/// Operator and members of a fold; a lone expression is an `AND` of one.
fn split_fold(expr: &Expr) -> (LogicalOperator, &[Expr]) {
    match expr {
        Expr::And(items) => (LogicalOperator::And, items.as_slice()),
        Expr::Or(items) => (LogicalOperator::Or, items.as_slice()),
        other => (LogicalOperator::And, std::slice::from_ref(other)),
    }
}

/// The literal `1=1` the generator emits for an empty tree.
fn is_match_all(predicate: &Predicate) -> bool {
    matches!(
        predicate,
        Predicate::Compare { left: Operand::Number(a), op: CompOp::Eq, right: Operand::Number(b) } if a == b
    )
}

/// Column-to-column joins and time-window comparisons tie the sub-query to the
/// outer row; they carry no user filter.
fn is_correlation(expr: &Expr) -> bool {
    let predicates = expr.predicates();
    !predicates.is_empty()
        && predicates.iter().all(|predicate| match predicate {
            Predicate::Compare { left: Operand::Column(_), op: CompOp::Eq, right: Operand::Column(_) } => true,
            other => other.interval().is_some(),
        })
}

fn predicate_table(predicate: &Predicate) -> Option<&str> {
    let target = match predicate {
        Predicate::Compare { left, .. } => left,
        Predicate::Between { target, .. }
        | Predicate::Like { target, .. }
        | Predicate::IsNull { target, .. }
        | Predicate::In { target, .. } => target,
        Predicate::Bare(_) | Predicate::Unparsed(_) => return None,
    };
    target.as_column().and_then(|column| column.table.as_deref())
}

fn join_key(join: &Join) -> &str {
    join.left.column.as_str()
}

/// Threshold of `COUNT(*) <op> n`. Counts past `u32::MAX` saturate.
fn having_count(having: &Predicate) -> Option<u32> {
    match having {
        Predicate::Compare {
            left: Operand::Call { name, .. },
            right: Operand::Number(count),
            ..
        } if name.eq_ignore_ascii_case("COUNT") && !count.is_empty() && count.bytes().all(|b| b.is_ascii_digit()) => {
            Some(count.parse().unwrap_or(u32::MAX))
        }
        _ => None,
    }
}

/// `"30 days"` → `(30, "days")`
fn split_interval(text: &str) -> Option<(i64, String)> {
    let mut parts = text.split_whitespace();
    let value = parts.next()?.parse().ok()?;
    let period = parts.collect::<Vec<_>>().join(" ");
    if period.is_empty() {
        return None;
    }
    Some((value, period))
}
