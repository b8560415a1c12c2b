//! Canonical logical-plan construction.
//!
//! Single-pass, bottom-up: sources, then join composition, then one
//! selection wrapper per top-level conjunct, then the validated projection,
//! then trailing sort/limit. Recoverable issues never abort planning; they
//! are appended to the context's [`Problems`] and the pass continues, so a
//! plan (possibly degenerate) always comes back.

use tracing::trace;

use super::command::{
    ColumnRef, Constraint, JoinClause, JoinCondition, JoinType, ProjectionList, QueryCommand,
};
use super::plan::{PlanNode, PlanOp, PlannedColumn};
use super::problems::Problems;
use super::schemata::{Column, Schemata};

/// Per-query planning context: the immutable schema plus the shared
/// problem accumulator.
pub struct QueryContext {
    /// Selectors and columns visible to the query.
    pub schemata: Schemata,
    /// Diagnostics accumulated while planning.
    pub problems: Problems,
}

impl QueryContext {
    /// A context over the given schema with no recorded problems.
    pub fn new(schemata: Schemata) -> Self {
        QueryContext {
            schemata,
            problems: Problems::new(),
        }
    }
}

/// One selector in the query's (single, flat) scope.
struct SourceInfo {
    binding: String,
    is_alias: bool,
    columns: Vec<Column>,
}

/// The query planner.
pub struct Planner;

impl Planner {
    /// Builds the canonical logical plan for `query`.
    ///
    /// Never fails: unknown selectors plan against an empty column set,
    /// unresolved projection columns are omitted from the `Project` node,
    /// and every such recovery is recorded in `ctx.problems` at error
    /// severity.
    pub fn create_plan(ctx: &mut QueryContext, query: &QueryCommand) -> PlanNode {
        let mut sources: Vec<SourceInfo> = Vec::new();
        let mut tree: Option<PlanNode> = None;

        for (i, decl) in query.selectors.iter().enumerate() {
            let columns = match ctx.schemata.columns(&decl.name) {
                Some(cols) => cols.to_vec(),
                None => {
                    ctx.problems.error(
                        "UnknownSelector",
                        format!("selector '{}' does not exist in the schema", decl.name),
                    );
                    Vec::new()
                }
            };
            let binding = decl.binding().to_string();
            if sources.iter().any(|s| s.binding == binding) {
                ctx.problems.error(
                    "DuplicateSelector",
                    format!("binding '{binding}' is declared more than once"),
                );
            }
            sources.push(SourceInfo {
                binding,
                is_alias: decl.alias.is_some(),
                columns: columns.clone(),
            });

            let source = PlanNode::new(PlanOp::Source {
                name: decl.name.clone(),
                alias: decl.alias.clone(),
                columns,
            });
            tree = Some(match tree.take() {
                None => source,
                Some(left) => {
                    let clause = query.joins.get(i - 1).cloned().unwrap_or(JoinClause {
                        join_type: JoinType::Cross,
                        condition: None,
                    });
                    if let Some(condition) = &clause.condition {
                        validate_join_condition(&sources, condition, &mut ctx.problems);
                    }
                    PlanNode::with_inputs(
                        PlanOp::Join {
                            join_type: clause.join_type,
                            condition: clause.condition,
                        },
                        vec![left, source],
                    )
                }
            });
        }

        let mut tree = match tree {
            Some(tree) => tree,
            None => {
                ctx.problems
                    .error("NoSelectors", "query declares no selectors");
                PlanNode::new(PlanOp::Project {
                    columns: Vec::new(),
                })
            }
        };

        if let Some(constraint) = &query.constraint {
            for conjunct in constraint.conjuncts() {
                validate_constraint(&sources, conjunct, &mut ctx.problems);
                tree = PlanNode::with_inputs(
                    PlanOp::Select {
                        constraint: conjunct.clone(),
                    },
                    vec![tree],
                );
            }
        }

        let columns = match &query.projections {
            ProjectionList::All => sources
                .iter()
                .flat_map(|s| {
                    s.columns.iter().map(|c| PlannedColumn {
                        selector: s.binding.clone(),
                        name: c.name.clone(),
                        alias: None,
                        ty: c.ty,
                    })
                })
                .collect(),
            ProjectionList::Columns(listed) => {
                let mut resolved = Vec::with_capacity(listed.len());
                for projected in listed {
                    // Unresolvable columns are omitted rather than carried
                    // as null markers; the recorded error already blocks
                    // execution for callers that check first.
                    if let Some(mut col) =
                        resolve_column(&sources, &projected.column, &mut ctx.problems)
                    {
                        col.alias = projected.alias.clone();
                        resolved.push(col);
                    }
                }
                resolved
            }
        };
        tree = PlanNode::with_inputs(PlanOp::Project { columns }, vec![tree]);

        if !query.orderings.is_empty() {
            for term in &query.orderings {
                resolve_column(&sources, &term.operand, &mut ctx.problems);
            }
            tree = PlanNode::with_inputs(
                PlanOp::Sort {
                    orderings: query.orderings.clone(),
                },
                vec![tree],
            );
        }
        if let Some(limit) = query.limit {
            tree = PlanNode::with_inputs(PlanOp::Limit { limit }, vec![tree]);
        }

        trace!(problems = ctx.problems.len(), "plan constructed");
        tree
    }
}

/// Finds the source a binding refers to. An alias declared in the query's
/// own scope wins over a selector that happens to share the name.
fn resolve_selector<'a>(sources: &'a [SourceInfo], binding: &str) -> Option<&'a SourceInfo> {
    sources
        .iter()
        .find(|s| s.is_alias && s.binding == binding)
        .or_else(|| sources.iter().find(|s| s.binding == binding))
}

fn resolve_column(
    sources: &[SourceInfo],
    reference: &ColumnRef,
    problems: &mut Problems,
) -> Option<PlannedColumn> {
    match &reference.selector {
        Some(binding) => {
            let Some(source) = resolve_selector(sources, binding) else {
                problems.error(
                    "UnknownSelector",
                    format!("column '{}' names unknown selector '{binding}'", reference.column),
                );
                return None;
            };
            match source.columns.iter().find(|c| c.name == reference.column) {
                Some(col) => Some(PlannedColumn {
                    selector: source.binding.clone(),
                    name: col.name.clone(),
                    alias: None,
                    ty: col.ty,
                }),
                None => {
                    problems.error(
                        "UnknownColumn",
                        format!(
                            "selector '{}' has no column '{}'",
                            source.binding, reference.column
                        ),
                    );
                    None
                }
            }
        }
        None => {
            let mut matches = sources.iter().filter_map(|s| {
                s.columns
                    .iter()
                    .find(|c| c.name == reference.column)
                    .map(|c| (s, c))
            });
            match (matches.next(), matches.next()) {
                (Some((source, col)), None) => Some(PlannedColumn {
                    selector: source.binding.clone(),
                    name: col.name.clone(),
                    alias: None,
                    ty: col.ty,
                }),
                (Some(_), Some(_)) => {
                    problems.error(
                        "AmbiguousColumn",
                        format!(
                            "column '{}' exists in more than one selector; qualify it",
                            reference.column
                        ),
                    );
                    None
                }
                _ => {
                    problems.error(
                        "UnknownColumn",
                        format!("no selector has a column '{}'", reference.column),
                    );
                    None
                }
            }
        }
    }
}

fn validate_join_condition(
    sources: &[SourceInfo],
    condition: &JoinCondition,
    problems: &mut Problems,
) {
    match condition {
        JoinCondition::Equi { left, right } => {
            resolve_column(sources, left, problems);
            resolve_column(sources, right, problems);
        }
        JoinCondition::SameNode { left, right } => {
            for binding in [left, right] {
                require_selector(sources, binding, problems);
            }
        }
        JoinCondition::ChildNode { parent, child } => {
            for binding in [parent, child] {
                require_selector(sources, binding, problems);
            }
        }
    }
}

fn validate_constraint(sources: &[SourceInfo], constraint: &Constraint, problems: &mut Problems) {
    match constraint {
        Constraint::And(a, b) | Constraint::Or(a, b) => {
            validate_constraint(sources, a, problems);
            validate_constraint(sources, b, problems);
        }
        Constraint::Not(inner) => validate_constraint(sources, inner, problems),
        Constraint::Comparison { operand, .. } | Constraint::PropertyExists(operand) => {
            resolve_column(sources, operand, problems);
        }
        Constraint::DescendantOf { selector, .. }
        | Constraint::ChildOf { selector, .. }
        | Constraint::SameNode { selector, .. } => {
            require_selector(sources, selector, problems);
        }
    }
}

fn require_selector(sources: &[SourceInfo], binding: &str, problems: &mut Problems) {
    if resolve_selector(sources, binding).is_none() {
        problems.error(
            "UnknownSelector",
            format!("constraint names unknown selector '{binding}'"),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::PropertyValue;
    use crate::query::command::{
        CompareOp, ProjectedColumn, SelectorDecl, SortOrder,
    };
    use crate::query::schemata::ColumnType;

    fn three_column_schema(selector: &str) -> Schemata {
        Schemata::builder()
            .selector(
                selector,
                [
                    Column::new("column1", ColumnType::String),
                    Column::new("column2", ColumnType::Long),
                    Column::new("column3", ColumnType::Bool),
                ],
            )
            .build()
    }

    #[test]
    fn select_star_produces_project_over_single_source() {
        let mut ctx = QueryContext::new(three_column_schema("__ALLNODES__"));
        let plan = Planner::create_plan(&mut ctx, &QueryCommand::select_all_from("__ALLNODES__"));

        assert!(ctx.problems.is_empty());
        let PlanOp::Project { columns } = &plan.op else {
            panic!("root is {:?}", plan.op.label());
        };
        assert_eq!(columns.len(), 3);
        assert_eq!(plan.inputs.len(), 1);
        match &plan.inputs[0].op {
            PlanOp::Source { name, columns, .. } => {
                assert_eq!(name, "__ALLNODES__");
                assert_eq!(columns.len(), 3);
            }
            other => panic!("unexpected child {:?}", other.label()),
        }
        assert!(plan.inputs[0].inputs.is_empty());
    }

    #[test]
    fn planning_is_total_for_unresolved_columns() {
        let mut ctx = QueryContext::new(three_column_schema("someTable"));
        let query = QueryCommand::select_from("someTable", ["column1", "column4"]);
        let plan = Planner::create_plan(&mut ctx, &query);

        assert!(ctx.problems.has_errors());
        let PlanOp::Project { columns } = &plan.op else {
            panic!("root is {:?}", plan.op.label());
        };
        // Unresolved columns are omitted, never null-marked.
        assert_eq!(columns.len(), 1);
        assert_eq!(columns[0].name, "column1");
    }

    #[test]
    fn unknown_selector_plans_with_empty_columns() {
        let mut ctx = QueryContext::new(Schemata::default());
        let plan = Planner::create_plan(&mut ctx, &QueryCommand::select_all_from("ghost"));
        assert!(ctx.problems.has_errors());
        match &plan.inputs[0].op {
            PlanOp::Source { columns, .. } => assert!(columns.is_empty()),
            other => panic!("unexpected child {:?}", other.label()),
        }
    }

    #[test]
    fn no_selectors_still_yields_a_plan() {
        let mut ctx = QueryContext::new(Schemata::default());
        let query = QueryCommand {
            selectors: Vec::new(),
            joins: Vec::new(),
            constraint: None,
            projections: ProjectionList::All,
            orderings: Vec::new(),
            limit: None,
        };
        let plan = Planner::create_plan(&mut ctx, &query);
        assert!(ctx.problems.has_errors());
        assert!(matches!(plan.op, PlanOp::Project { .. }));
    }

    #[test]
    fn each_top_level_conjunct_gets_its_own_select() {
        let mut ctx = QueryContext::new(three_column_schema("t"));
        let query = QueryCommand::select_from("t", ["column1"])
            .with_constraint(Constraint::Comparison {
                operand: ColumnRef::unqualified("column1"),
                op: CompareOp::Eq,
                value: PropertyValue::String("x".into()),
            })
            .with_constraint(Constraint::Comparison {
                operand: ColumnRef::unqualified("column2"),
                op: CompareOp::Gt,
                value: PropertyValue::Long(3),
            });
        let plan = Planner::create_plan(&mut ctx, &query);
        assert!(!ctx.problems.has_errors());

        let select_outer = &plan.inputs[0];
        assert!(matches!(select_outer.op, PlanOp::Select { .. }));
        let select_inner = &select_outer.inputs[0];
        assert!(matches!(select_inner.op, PlanOp::Select { .. }));
        assert!(matches!(select_inner.inputs[0].op, PlanOp::Source { .. }));
    }

    #[test]
    fn sort_and_limit_wrap_the_project() {
        let mut ctx = QueryContext::new(three_column_schema("t"));
        let query = QueryCommand::select_from("t", ["column1"])
            .order_by(ColumnRef::unqualified("column2"), SortOrder::Descending)
            .with_limit(10, 5);
        let plan = Planner::create_plan(&mut ctx, &query);

        assert!(matches!(plan.op, PlanOp::Limit { .. }));
        let sort = &plan.inputs[0];
        assert!(matches!(sort.op, PlanOp::Sort { .. }));
        assert!(matches!(sort.inputs[0].op, PlanOp::Project { .. }));
    }

    #[test]
    fn two_sources_compose_into_a_join() {
        let schemata = Schemata::builder()
            .selector("left", [Column::new("id", ColumnType::Long)])
            .selector("right", [Column::new("ref", ColumnType::Long)])
            .build();
        let mut ctx = QueryContext::new(schemata);
        let query = QueryCommand::select_from("left", ["id"]).join(
            SelectorDecl::named("right"),
            JoinClause {
                join_type: JoinType::Inner,
                condition: Some(JoinCondition::Equi {
                    left: ColumnRef::qualified("left", "id"),
                    right: ColumnRef::qualified("right", "ref"),
                }),
            },
        );
        let plan = Planner::create_plan(&mut ctx, &query);
        assert!(!ctx.problems.has_errors());

        let join = &plan.inputs[0];
        match &join.op {
            PlanOp::Join {
                join_type,
                condition,
            } => {
                assert_eq!(*join_type, JoinType::Inner);
                assert!(condition.is_some());
            }
            other => panic!("unexpected {:?}", other.label()),
        }
        assert_eq!(join.inputs.len(), 2);
        assert_eq!(plan.sources().len(), 2);
    }

    #[test]
    fn alias_in_query_scope_shadows_selector_name() {
        // The schema knows selectors "t" and "u"; the query binds "u" under
        // the alias "t". A qualified reference to "t" must resolve against
        // the alias, not the shadowed real selector.
        let schemata = Schemata::builder()
            .selector("t", [Column::new("only_in_t", ColumnType::Long)])
            .selector("u", [Column::new("only_in_u", ColumnType::Long)])
            .build();
        let mut ctx = QueryContext::new(schemata);
        let query = QueryCommand {
            selectors: vec![SelectorDecl::aliased("u", "t")],
            joins: Vec::new(),
            constraint: None,
            projections: ProjectionList::Columns(vec![ProjectedColumn {
                column: ColumnRef::qualified("t", "only_in_u"),
                alias: None,
            }]),
            orderings: Vec::new(),
            limit: None,
        };
        let plan = Planner::create_plan(&mut ctx, &query);
        assert!(!ctx.problems.has_errors());
        let PlanOp::Project { columns } = &plan.op else {
            panic!("root is {:?}", plan.op.label());
        };
        assert_eq!(columns[0].name, "only_in_u");

        // And the shadowed selector's own column no longer resolves via "t".
        let mut ctx = QueryContext::new(ctx.schemata.clone());
        let query = QueryCommand {
            projections: ProjectionList::Columns(vec![ProjectedColumn {
                column: ColumnRef::qualified("t", "only_in_t"),
                alias: None,
            }]),
            ..query
        };
        Planner::create_plan(&mut ctx, &query);
        assert!(ctx.problems.has_errors());
    }
}
