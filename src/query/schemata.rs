//! The schema visible to a query: named selectors and their columns.

use std::collections::BTreeMap;
use std::sync::Arc;

/// Scalar type of a column.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum ColumnType {
    /// Unicode strings.
    String,
    /// 64-bit signed integers.
    Long,
    /// 64-bit floats.
    Double,
    /// Booleans.
    Bool,
    /// Timestamps.
    Date,
    /// Node references.
    Reference,
    /// Hierarchical paths.
    Path,
}

/// One column a selector can produce.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Column {
    /// Column name, unique within its selector.
    pub name: String,
    /// Declared type.
    pub ty: ColumnType,
}

impl Column {
    /// A column with the given name and type.
    pub fn new(name: impl Into<String>, ty: ColumnType) -> Self {
        Column {
            name: name.into(),
            ty,
        }
    }
}

/// Immutable mapping from selector name to its ordered columns.
///
/// Built once per query context and never mutated by the planner; clones
/// share the underlying table.
#[derive(Clone, Debug, Default)]
pub struct Schemata {
    selectors: Arc<BTreeMap<String, Vec<Column>>>,
}

impl Schemata {
    /// Starts building a schema.
    pub fn builder() -> SchemataBuilder {
        SchemataBuilder {
            selectors: BTreeMap::new(),
        }
    }

    /// The columns of a selector, if it exists.
    pub fn columns(&self, selector: &str) -> Option<&[Column]> {
        self.selectors.get(selector).map(Vec::as_slice)
    }

    /// Whether the selector exists.
    pub fn has_selector(&self, selector: &str) -> bool {
        self.selectors.contains_key(selector)
    }

    /// Declared selector names, in order.
    pub fn selector_names(&self) -> impl Iterator<Item = &str> {
        self.selectors.keys().map(String::as_str)
    }
}

/// Builder for [`Schemata`].
pub struct SchemataBuilder {
    selectors: BTreeMap<String, Vec<Column>>,
}

impl SchemataBuilder {
    /// Declares a selector with its ordered columns.
    pub fn selector(
        mut self,
        name: impl Into<String>,
        columns: impl IntoIterator<Item = Column>,
    ) -> Self {
        self.selectors
            .insert(name.into(), columns.into_iter().collect());
        self
    }

    /// Finishes the immutable schema.
    pub fn build(self) -> Schemata {
        Schemata {
            selectors: Arc::new(self.selectors),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_preserves_column_order() {
        let schemata = Schemata::builder()
            .selector(
                "someTable",
                [
                    Column::new("column1", ColumnType::String),
                    Column::new("column2", ColumnType::Long),
                ],
            )
            .build();
        let cols = schemata.columns("someTable").unwrap();
        assert_eq!(cols[0].name, "column1");
        assert_eq!(cols[1].name, "column2");
        assert!(!schemata.has_selector("other"));
    }
}
