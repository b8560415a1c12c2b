//! The canonical logical plan the planner emits and the executor consumes.

use std::fmt;

use super::command::{Constraint, JoinCondition, JoinType, Limit, OrderingTerm};
use super::schemata::{Column, ColumnType};

/// One column of a `Project` node, fully resolved against the plan's
/// sources.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PlannedColumn {
    /// Binding of the selector that produces the column.
    pub selector: String,
    /// Column name within the selector.
    pub name: String,
    /// Output alias, defaulting to the column name.
    pub alias: Option<String>,
    /// Declared type.
    pub ty: ColumnType,
}

/// Operator carried by one plan node.
///
/// A closed set of variants, each holding only the fields relevant to its
/// kind; consumers dispatch by matching.
#[derive(Clone, Debug, PartialEq)]
pub enum PlanOp {
    /// Access to one named selector.
    Source {
        /// Selector name in the schema.
        name: String,
        /// Alias bound in the query scope, when declared.
        alias: Option<String>,
        /// Columns the selector makes available.
        columns: Vec<Column>,
    },
    /// Combination of two subtrees.
    Join {
        /// Join flavor.
        join_type: JoinType,
        /// Condition; absent for cross joins.
        condition: Option<JoinCondition>,
    },
    /// One conjunct of the WHERE clause.
    Select {
        /// The constraint this node applies.
        constraint: Constraint,
    },
    /// The projection at (or near) the root.
    Project {
        /// Resolved output columns, in SELECT-list order.
        columns: Vec<PlannedColumn>,
    },
    /// Ordering of the projected rows.
    Sort {
        /// Ordering terms, most significant first.
        orderings: Vec<OrderingTerm>,
    },
    /// Row-count bound.
    Limit {
        /// The bound.
        limit: Limit,
    },
}

impl PlanOp {
    /// Short operator name for rendering.
    pub fn label(&self) -> &'static str {
        match self {
            PlanOp::Source { .. } => "SOURCE",
            PlanOp::Join { .. } => "JOIN",
            PlanOp::Select { .. } => "SELECT",
            PlanOp::Project { .. } => "PROJECT",
            PlanOp::Sort { .. } => "SORT",
            PlanOp::Limit { .. } => "LIMIT",
        }
    }
}

/// One node of the logical plan tree. Created by the planner in a single
/// pass; consumed read-only by the executor.
#[derive(Clone, Debug, PartialEq)]
pub struct PlanNode {
    /// The operator at this node.
    pub op: PlanOp,
    /// Ordered child subtrees feeding this operator.
    pub inputs: Vec<PlanNode>,
}

impl PlanNode {
    /// A leaf node.
    pub fn new(op: PlanOp) -> Self {
        PlanNode {
            op,
            inputs: Vec::new(),
        }
    }

    /// A node over the given inputs.
    pub fn with_inputs(op: PlanOp, inputs: Vec<PlanNode>) -> Self {
        PlanNode { op, inputs }
    }

    /// Every `Source` node in this subtree, left to right.
    pub fn sources(&self) -> Vec<&PlanNode> {
        let mut out = Vec::new();
        fn walk<'a>(node: &'a PlanNode, out: &mut Vec<&'a PlanNode>) {
            if matches!(node.op, PlanOp::Source { .. }) {
                out.push(node);
            }
            for input in &node.inputs {
                walk(input, out);
            }
        }
        walk(self, &mut out);
        out
    }

    fn render(&self, f: &mut fmt::Formatter<'_>, depth: usize) -> fmt::Result {
        for _ in 0..depth {
            f.write_str("  ")?;
        }
        match &self.op {
            PlanOp::Source {
                name,
                alias,
                columns,
            } => {
                write!(f, "SOURCE {name}")?;
                if let Some(alias) = alias {
                    write!(f, " AS {alias}")?;
                }
                write!(f, " [{} columns]", columns.len())?;
            }
            PlanOp::Join {
                join_type,
                condition,
            } => {
                write!(f, "JOIN {join_type:?}")?;
                if condition.is_some() {
                    write!(f, " ON ...")?;
                }
            }
            PlanOp::Select { .. } => write!(f, "SELECT")?,
            PlanOp::Project { columns } => {
                write!(f, "PROJECT [")?;
                for (i, c) in columns.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}.{}", c.selector, c.name)?;
                }
                write!(f, "]")?;
            }
            PlanOp::Sort { orderings } => write!(f, "SORT [{} terms]", orderings.len())?,
            PlanOp::Limit { limit } => {
                write!(f, "LIMIT {} OFFSET {}", limit.count, limit.offset)?
            }
        }
        writeln!(f)?;
        for input in &self.inputs {
            input.render(f, depth + 1)?;
        }
        Ok(())
    }
}

impl fmt::Display for PlanNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.render(f, 0)
    }
}
