//! Boolean expression tree for a parsed WHERE clause.

use std::fmt;

/// A WHERE-clause expression. `And`/`Or` are flat n-ary folds.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    And(Vec<Expr>),
    Or(Vec<Expr>),
    /// A parenthesized expression; kept so the nesting shape of generated SQL survives
    Grouped(Box<Expr>),
    Not(Box<Expr>),
    Exists { negated: bool, subquery: Box<Subquery> },
    Predicate(Predicate),
}

impl Expr {
    /// Strip exactly one layer of parentheses, if present.
    pub fn unwrap_group(&self) -> &Expr {
        match self {
            Expr::Grouped(inner) => inner,
            other => other,
        }
    }

    /// Strip every layer of parentheses.
    pub fn innermost(&self) -> &Expr {
        let mut expr = self;
        while let Expr::Grouped(inner) = expr {
            expr = inner;
        }
        expr
    }

    /// Visit every predicate reachable without entering sub-queries.
    pub fn predicates(&self) -> Vec<&Predicate> {
        let mut found = Vec::new();
        self.collect_predicates(&mut found);
        found
    }

    fn collect_predicates<'a>(&'a self, found: &mut Vec<&'a Predicate>) {
        match self {
            Expr::And(items) | Expr::Or(items) => {
                items.iter().for_each(|item| item.collect_predicates(found))
            }
            Expr::Grouped(inner) | Expr::Not(inner) => inner.collect_predicates(found),
            Expr::Exists { .. } => {}
            Expr::Predicate(predicate) => found.push(predicate),
        }
    }
}

/// `SELECT ... FROM <table> [INNER JOIN ...] [WHERE ...] [GROUP BY ...] [HAVING ...]`
#[derive(Debug, Clone, PartialEq)]
pub struct Subquery {
    pub table: String,
    pub joins: Vec<Join>,
    pub filter: Option<Expr>,
    pub group_by: Option<ColumnRef>,
    pub having: Option<Predicate>,
}

/// `INNER JOIN <table> ON <left> = <right>`
#[derive(Debug, Clone, PartialEq)]
pub struct Join {
    pub table: String,
    pub left: ColumnRef,
    pub right: ColumnRef,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnRef {
    pub table: Option<String>,
    pub column: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    Compare { left: Operand, op: CompOp, right: Operand },
    Between { target: Operand, low: Operand, high: Operand, negated: bool },
    Like { target: Operand, pattern: Operand, negated: bool },
    IsNull { target: Operand, negated: bool },
    In { target: Operand, values: Vec<Operand>, negated: bool },
    /// An operand used as a condition on its own, e.g. `TRUE`
    Bare(Operand),
    /// Source text the parser could not make sense of
    Unparsed(String),
}

/// 比较运算符
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompOp {
    Eq,    // =
    NotEq, // !=
    Gt,    // >
    Lt,    // <
    Gte,   // >=
    Lte,   // <=
}

#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    Column(ColumnRef),
    String(String),
    Number(String),
    Null,
    Star,
    /// `INTERVAL '30 days'` or `INTERVAL 7 DAY`, stored as `30 days` / `7 DAY`
    Interval(String),
    Call { name: String, args: Vec<Operand> },
    Arithmetic { left: Box<Operand>, op: char, right: Box<Operand> },
}

impl Operand {
    pub fn as_column(&self) -> Option<&ColumnRef> {
        match self {
            Operand::Column(column) => Some(column),
            _ => None,
        }
    }

    pub fn as_string(&self) -> Option<&str> {
        match self {
            Operand::String(s) => Some(s),
            _ => None,
        }
    }

    /// First interval literal inside this operand.
    pub fn interval(&self) -> Option<&str> {
        match self {
            Operand::Interval(text) => Some(text),
            Operand::Call { args, .. } => args.iter().find_map(Operand::interval),
            Operand::Arithmetic { left, right, .. } => left.interval().or_else(|| right.interval()),
            _ => None,
        }
    }
}

impl Predicate {
    pub fn interval(&self) -> Option<&str> {
        match self {
            Predicate::Compare { left, right, .. } => left.interval().or_else(|| right.interval()),
            _ => None,
        }
    }
}

impl fmt::Display for ColumnRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.table {
            Some(table) => write!(f, "{}.{}", table, self.column),
            None => f.write_str(&self.column),
        }
    }
}

impl fmt::Display for CompOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            CompOp::Eq => "=",
            CompOp::NotEq => "!=",
            CompOp::Gt => ">",
            CompOp::Lt => "<",
            CompOp::Gte => ">=",
            CompOp::Lte => "<=",
        })
    }
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::Column(column) => write!(f, "{}", column),
            Operand::String(s) => write!(f, "'{}'", s.replace('\'', "''")),
            Operand::Number(n) => f.write_str(n),
            Operand::Null => f.write_str("NULL"),
            Operand::Star => f.write_str("*"),
            Operand::Interval(text) => write!(f, "INTERVAL '{}'", text),
            Operand::Call { name, args } => {
                let args: Vec<String> = args.iter().map(ToString::to_string).collect();
                write!(f, "{}({})", name, args.join(", "))
            }
            Operand::Arithmetic { left, op, right } => write!(f, "{} {} {}", left, op, right),
        }
    }
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let not = |negated: &bool| if *negated { "NOT " } else { "" };
        match self {
            Predicate::Compare { left, op, right } => write!(f, "{} {} {}", left, op, right),
            Predicate::Between { target, low, high, negated } => {
                write!(f, "{} {}BETWEEN {} AND {}", target, not(negated), low, high)
            }
            Predicate::Like { target, pattern, negated } => {
                write!(f, "{} {}LIKE {}", target, not(negated), pattern)
            }
            Predicate::IsNull { target, negated } => write!(f, "{} IS {}NULL", target, not(negated)),
            Predicate::In { target, values, negated } => {
                let values: Vec<String> = values.iter().map(ToString::to_string).collect();
                write!(f, "{} {}IN ({})", target, not(negated), values.join(", "))
            }
            Predicate::Bare(operand) => write!(f, "{}", operand),
            Predicate::Unparsed(text) => f.write_str(text),
        }
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::And(items) | Expr::Or(items) => {
                let separator = if matches!(self, Expr::And(_)) { " AND " } else { " OR " };
                let parts: Vec<String> = items.iter().map(ToString::to_string).collect();
                f.write_str(&parts.join(separator))
            }
            Expr::Grouped(inner) => write!(f, "({})", inner),
            Expr::Not(inner) => write!(f, "NOT {}", inner),
            Expr::Exists { negated, subquery } => {
                if *negated {
                    f.write_str("NOT ")?;
                }
                write!(f, "EXISTS (SELECT 1 FROM {}", subquery.table)?;
                for join in &subquery.joins {
                    write!(f, " INNER JOIN {} ON {} = {}", join.table, join.left, join.right)?;
                }
                if let Some(filter) = &subquery.filter {
                    write!(f, " WHERE {}", filter)?;
                }
                if let Some(column) = &subquery.group_by {
                    write!(f, " GROUP BY {}", column)?;
                }
                if let Some(having) = &subquery.having {
                    write!(f, " HAVING {}", having)?;
                }
                f.write_str(")")
            }
            Expr::Predicate(predicate) => write!(f, "{}", predicate),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn column(table: &str, name: &str) -> Operand {
        Operand::Column(ColumnRef {
            table: Some(table.to_string()),
            column: name.to_string(),
        })
    }

    #[test]
    fn test_display_round_trips_simple_shapes() {
        let expr = Expr::Or(vec![
            Expr::Grouped(Box::new(Expr::Predicate(Predicate::Compare {
                left: column("t", "city"),
                op: CompOp::Eq,
                right: Operand::String("O'Brien".to_string()),
            }))),
            Expr::Grouped(Box::new(Expr::Predicate(Predicate::Between {
                target: column("t", "age"),
                low: Operand::Number("10".to_string()),
                high: Operand::Number("20".to_string()),
                negated: true,
            }))),
        ]);
        assert_eq!(
            expr.to_string(),
            "(t.city = 'O''Brien') OR (t.age NOT BETWEEN 10 AND 20)"
        );
    }

    #[test]
    fn test_unwrap_group_strips_one_layer() {
        let leaf = Expr::Predicate(Predicate::Bare(Operand::Null));
        let wrapped = Expr::Grouped(Box::new(Expr::Grouped(Box::new(leaf.clone()))));
        assert!(matches!(wrapped.unwrap_group(), Expr::Grouped(_)));
        assert_eq!(wrapped.innermost(), &leaf);
    }

    #[test]
    fn test_interval_search_descends_into_operands() {
        let predicate = Predicate::Compare {
            left: column("t", "created_at"),
            op: CompOp::Gte,
            right: Operand::Arithmetic {
                left: Box::new(Operand::Call { name: "NOW".to_string(), args: vec![] }),
                op: '-',
                right: Box::new(Operand::Interval("30 days".to_string())),
            },
        };
        assert_eq!(predicate.interval(), Some("30 days"));
        assert_eq!(predicate.to_string(), "t.created_at >= NOW() - INTERVAL '30 days'");
    }
}
