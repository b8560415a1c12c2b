//! Query planning: from a declarative [`QueryCommand`] to a canonical
//! logical [`PlanNode`] tree, validated against a [`Schemata`].
//!
//! The executor that turns the plan into physical access lives outside
//! this crate; it receives the `Project`-rooted tree plus the accumulated
//! [`Problems`] and is expected to check [`Problems::has_errors`] before
//! running anything.

mod command;
mod plan;
mod planner;
mod problems;
mod schemata;

pub use command::{
    ColumnRef, CompareOp, Constraint, JoinClause, JoinCondition, JoinType, Limit, OrderingTerm,
    ProjectedColumn, ProjectionList, QueryCommand, SelectorDecl, SortOrder,
};
pub use plan::{PlanNode, PlanOp, PlannedColumn};
pub use planner::{Planner, QueryContext};
pub use problems::{Problem, Problems, Severity};
pub use schemata::{Column, ColumnType, Schemata, SchemataBuilder};
