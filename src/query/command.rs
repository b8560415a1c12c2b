//! The query command: the parsed, declarative form the planner consumes.

use crate::document::PropertyValue;
use crate::path::Path;

/// One named selector a query reads from.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SelectorDecl {
    /// Selector name as declared in the schema.
    pub name: String,
    /// Alias declared in the query's own scope, if any.
    pub alias: Option<String>,
}

impl SelectorDecl {
    /// A selector without an alias.
    pub fn named(name: impl Into<String>) -> Self {
        SelectorDecl {
            name: name.into(),
            alias: None,
        }
    }

    /// A selector with an alias.
    pub fn aliased(name: impl Into<String>, alias: impl Into<String>) -> Self {
        SelectorDecl {
            name: name.into(),
            alias: Some(alias.into()),
        }
    }

    /// The name the query's own scope binds: the alias when declared,
    /// otherwise the selector name.
    pub fn binding(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.name)
    }
}

/// Reference to a column, optionally qualified by selector binding.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ColumnRef {
    /// Selector binding; `None` means "search every selector in scope".
    pub selector: Option<String>,
    /// Column name.
    pub column: String,
}

impl ColumnRef {
    /// An unqualified column reference.
    pub fn unqualified(column: impl Into<String>) -> Self {
        ColumnRef {
            selector: None,
            column: column.into(),
        }
    }

    /// A selector-qualified column reference.
    pub fn qualified(selector: impl Into<String>, column: impl Into<String>) -> Self {
        ColumnRef {
            selector: Some(selector.into()),
            column: column.into(),
        }
    }
}

/// How two sources combine.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum JoinType {
    /// Rows must satisfy the condition on both sides.
    Inner,
    /// All left rows, right side padded when unmatched.
    LeftOuter,
    /// Every pairing; no condition.
    Cross,
}

/// Condition attached to a join.
#[derive(Clone, Debug, PartialEq)]
pub enum JoinCondition {
    /// Column equality across the two sides.
    Equi {
        /// Left operand.
        left: ColumnRef,
        /// Right operand.
        right: ColumnRef,
    },
    /// Both sides select the same node.
    SameNode {
        /// Left selector binding.
        left: String,
        /// Right selector binding.
        right: String,
    },
    /// The right side selects children of the left side's node.
    ChildNode {
        /// Parent selector binding.
        parent: String,
        /// Child selector binding.
        child: String,
    },
}

/// One join clause combining the sources declared so far with the next one.
#[derive(Clone, Debug, PartialEq)]
pub struct JoinClause {
    /// Join flavor.
    pub join_type: JoinType,
    /// Condition; absent for cross joins.
    pub condition: Option<JoinCondition>,
}

/// Comparison operators usable in constraints.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum CompareOp {
    /// Equal.
    Eq,
    /// Not equal.
    Ne,
    /// Less than.
    Lt,
    /// Less than or equal.
    Le,
    /// Greater than.
    Gt,
    /// Greater than or equal.
    Ge,
    /// SQL-style `LIKE` pattern match.
    Like,
}

/// WHERE-clause constraint tree.
#[derive(Clone, Debug, PartialEq)]
pub enum Constraint {
    /// Both sides must hold.
    And(Box<Constraint>, Box<Constraint>),
    /// Either side must hold.
    Or(Box<Constraint>, Box<Constraint>),
    /// The inner constraint must not hold.
    Not(Box<Constraint>),
    /// Compare a column against a literal.
    Comparison {
        /// Column operand.
        operand: ColumnRef,
        /// Operator.
        op: CompareOp,
        /// Literal to compare against.
        value: PropertyValue,
    },
    /// The property behind the column must exist.
    PropertyExists(ColumnRef),
    /// The selector's node must be a descendant of the path.
    DescendantOf {
        /// Selector binding.
        selector: String,
        /// Ancestor path.
        path: Path,
    },
    /// The selector's node must be a direct child of the path.
    ChildOf {
        /// Selector binding.
        selector: String,
        /// Parent path.
        path: Path,
    },
    /// The selector's node must be exactly the path's node.
    SameNode {
        /// Selector binding.
        selector: String,
        /// Required path.
        path: Path,
    },
}

impl Constraint {
    /// Splits a constraint into its top-level conjuncts, in source order.
    /// Planner step: each conjunct gets its own selection wrapper so later
    /// passes can push them down independently.
    pub fn conjuncts(&self) -> Vec<&Constraint> {
        let mut out = Vec::new();
        fn walk<'a>(c: &'a Constraint, out: &mut Vec<&'a Constraint>) {
            match c {
                Constraint::And(a, b) => {
                    walk(a, out);
                    walk(b, out);
                }
                other => out.push(other),
            }
        }
        walk(self, &mut out);
        out
    }
}

/// Sort direction.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum SortOrder {
    /// Smallest first.
    Ascending,
    /// Largest first.
    Descending,
}

/// One ordering term.
#[derive(Clone, Debug, PartialEq)]
pub struct OrderingTerm {
    /// Column to order by.
    pub operand: ColumnRef,
    /// Direction.
    pub order: SortOrder,
}

/// Row-count bound.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Limit {
    /// Maximum rows returned.
    pub count: u64,
    /// Rows skipped before counting.
    pub offset: u64,
}

/// The SELECT list.
#[derive(Clone, Debug, PartialEq)]
pub enum ProjectionList {
    /// `*`: every column of every selector in scope, in schema order.
    All,
    /// Explicit columns.
    Columns(Vec<ProjectedColumn>),
}

/// One explicitly projected column.
#[derive(Clone, Debug, PartialEq)]
pub struct ProjectedColumn {
    /// Referenced column.
    pub column: ColumnRef,
    /// Output alias, if any.
    pub alias: Option<String>,
}

/// The full declarative query the planner consumes.
#[derive(Clone, Debug, PartialEq)]
pub struct QueryCommand {
    /// Sources in declaration order.
    pub selectors: Vec<SelectorDecl>,
    /// `joins[i]` combines the tree over `selectors[..=i]` with
    /// `selectors[i + 1]`; missing clauses default to a cross join.
    pub joins: Vec<JoinClause>,
    /// WHERE-clause constraint, if any.
    pub constraint: Option<Constraint>,
    /// SELECT list.
    pub projections: ProjectionList,
    /// ORDER BY terms.
    pub orderings: Vec<OrderingTerm>,
    /// LIMIT/OFFSET.
    pub limit: Option<Limit>,
}

impl QueryCommand {
    /// A `SELECT *` query over one selector.
    pub fn select_all_from(selector: impl Into<String>) -> Self {
        QueryCommand {
            selectors: vec![SelectorDecl::named(selector)],
            joins: Vec::new(),
            constraint: None,
            projections: ProjectionList::All,
            orderings: Vec::new(),
            limit: None,
        }
    }

    /// A query over one selector projecting the named columns.
    pub fn select_from<S: Into<String>>(
        selector: impl Into<String>,
        columns: impl IntoIterator<Item = S>,
    ) -> Self {
        QueryCommand {
            selectors: vec![SelectorDecl::named(selector)],
            joins: Vec::new(),
            constraint: None,
            projections: ProjectionList::Columns(
                columns
                    .into_iter()
                    .map(|c| ProjectedColumn {
                        column: ColumnRef::unqualified(c),
                        alias: None,
                    })
                    .collect(),
            ),
            orderings: Vec::new(),
            limit: None,
        }
    }

    /// Adds a WHERE constraint, AND-ing with any existing one.
    pub fn with_constraint(mut self, constraint: Constraint) -> Self {
        self.constraint = Some(match self.constraint {
            Some(existing) => Constraint::And(Box::new(existing), Box::new(constraint)),
            None => constraint,
        });
        self
    }

    /// Adds an ordering term.
    pub fn order_by(mut self, column: ColumnRef, order: SortOrder) -> Self {
        self.orderings.push(OrderingTerm {
            operand: column,
            order,
        });
        self
    }

    /// Sets the LIMIT/OFFSET.
    pub fn with_limit(mut self, count: u64, offset: u64) -> Self {
        self.limit = Some(Limit { count, offset });
        self
    }

    /// Joins another selector onto the query.
    pub fn join(mut self, selector: SelectorDecl, clause: JoinClause) -> Self {
        self.selectors.push(selector);
        self.joins.push(clause);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conjuncts_split_only_top_level_ands() {
        let c = Constraint::And(
            Box::new(Constraint::PropertyExists(ColumnRef::unqualified("a"))),
            Box::new(Constraint::Or(
                Box::new(Constraint::PropertyExists(ColumnRef::unqualified("b"))),
                Box::new(Constraint::PropertyExists(ColumnRef::unqualified("c"))),
            )),
        );
        let parts = c.conjuncts();
        assert_eq!(parts.len(), 2);
        assert!(matches!(parts[1], Constraint::Or(_, _)));
    }
}
