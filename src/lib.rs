//! Segment condition trees and the SQL they compile to.
//!
//! `sql_compiler` turns a [`FilterCriteria`] into a `SELECT * FROM <dataset> WHERE ...;`
//! statement; `sql_parser` recovers a best-effort tree from such a statement.

pub mod ast;
pub mod clause;
pub mod condition;
pub mod config;
pub mod editor;
pub mod event_clause;
pub mod lexer;
pub mod operator;
pub mod parser;
pub mod sql_compiler;
pub mod sql_parser;
pub mod token;
pub mod validate;

pub use condition::{
    segment_id_for, AttributeCondition, Condition, ConditionGroup, EventCondition, EventType, FilterCriteria,
    Frequency, GroupItem, RelatedCondition, SegmentDefinition,
};
pub use config::{ConfigError, SegmentConfig};
pub use editor::{EditError, IdAllocator, SegmentEditor};
pub use operator::{FieldType, LogicalOperator, Operator, OperatorVocabulary, SqlDialect};
pub use sql_compiler::{build_group_clause, generate_sql, SqlCompiler};
pub use sql_parser::{parse_sql, DroppedFragment, ParsedSql};
pub use validate::{validate_criteria, ValidationIssue};
