// Bound statement context consumed by the routing, rewrite and merge engines
pub mod derived;
pub mod segment;

pub use segment::*;

use crate::core::ShardingError;
use crate::metadata::SchemaMetadata;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatementKind {
    Select,
    Insert,
    Update,
    Delete,
}

impl StatementKind {
    #[must_use]
    pub const fn is_write(self) -> bool {
        !matches!(self, Self::Select)
    }
}

/// Everything the pipeline needs to know about one SQL statement, with byte
/// spans pointing back into the original text.
#[derive(Debug, Clone, PartialEq)]
pub struct StatementContext {
    pub kind: StatementKind,
    /// Every table reference in textual order (FROM, JOIN, INTO, UPDATE).
    pub tables: Vec<TableSegment>,
    pub select: Option<SelectSegment>,
    pub insert: Option<InsertSegment>,
    pub assignments: Vec<AssignmentSegment>,
    pub join_conditions: Vec<ConditionExpr>,
    pub where_segment: Option<WhereSegment>,
    pub parameter_count: usize,
}

impl StatementContext {
    #[must_use]
    pub fn new(kind: StatementKind) -> Self {
        Self {
            kind,
            tables: Vec::new(),
            select: None,
            insert: None,
            assignments: Vec::new(),
            join_conditions: Vec::new(),
            where_segment: None,
            parameter_count: 0,
        }
    }

    /// Distinct lowercase logical table names in first-appearance order.
    #[must_use]
    pub fn logic_table_names(&self) -> Vec<String> {
        let mut names: Vec<String> = Vec::new();
        for table in &self.tables {
            let name = table.logic_name();
            if !names.contains(&name) {
                names.push(name);
            }
        }
        names
    }

    /// Logical table an owner (alias or table name) refers to.
    #[must_use]
    pub fn table_by_owner(&self, owner: &str) -> Option<&TableSegment> {
        self.tables.iter().find(|t| t.is_referenced_by(owner))
    }

    /// Logical table a column belongs to: its owner, the only table, or the
    /// first table whose metadata declares the column.
    pub fn table_of_column(&self, column: &ColumnSegment, metadata: &SchemaMetadata) -> Result<String, ShardingError> {
        if let Some(owner) = column.owner_name() {
            return self
                .table_by_owner(owner)
                .map(TableSegment::logic_name)
                .ok_or_else(|| ShardingError::TableNotFound(owner.to_string()));
        }
        let names = self.logic_table_names();
        if names.len() == 1 {
            return Ok(names[0].clone());
        }
        names
            .into_iter()
            .find(|t| metadata.contains_column(t, &column.name))
            .ok_or_else(|| ShardingError::ColumnNotFound(column.name.clone()))
    }

    /// Table targeted by INSERT / UPDATE / DELETE.
    #[must_use]
    pub fn primary_table(&self) -> Option<&TableSegment> {
        self.tables.first()
    }

    #[must_use]
    pub fn order_by(&self) -> &[OrderByItem] {
        self.select.as_ref().map_or(&[], |s| s.order_by.as_slice())
    }

    #[must_use]
    pub fn group_by(&self) -> &[OrderByItem] {
        self.select.as_ref().map_or(&[], |s| s.group_by.as_slice())
    }

    #[must_use]
    pub fn has_aggregation(&self) -> bool {
        self.select.as_ref().is_some_and(|s| {
            s.projections
                .items
                .iter()
                .any(|p| matches!(p.kind, ProjectionKind::Aggregation { .. }))
        })
    }

    #[must_use]
    pub fn is_distinct(&self) -> bool {
        self.select.as_ref().is_some_and(|s| s.projections.distinct)
    }

    /// Expansion of `*` or `owner.*` from metadata, as (table, column) pairs.
    #[must_use]
    pub fn expand_shorthand(&self, owner: Option<&str>, metadata: &SchemaMetadata) -> Option<Vec<(String, String)>> {
        let tables: Vec<String> = match owner {
            Some(owner) => vec![self.table_by_owner(owner)?.logic_name()],
            None => self.logic_table_names(),
        };
        let mut columns = Vec::new();
        for table in tables {
            let meta = metadata.get_table(&table)?;
            columns.extend(meta.column_names().into_iter().map(|c| (table.clone(), c)));
        }
        Some(columns)
    }

    /// Every shard returns grouped rows already sorted by the group key.
    #[must_use]
    pub fn is_stream_grouping(&self) -> bool {
        let (group_by, order_by) = (self.group_by(), self.order_by());
        !group_by.is_empty()
            && group_by.len() == order_by.len()
            && group_by.iter().zip(order_by).all(|(g, o)| {
                g.direction == o.direction
                    && match (&g.target, &o.target) {
                        (OrderByTarget::Column(a), OrderByTarget::Column(b)) => derived::same_column(a, b),
                        (OrderByTarget::Index(a), OrderByTarget::Index(b)) => a == b,
                        _ => false,
                    }
            })
    }

    /// Grouped results must be collected in full before they can be paginated.
    #[must_use]
    pub fn needs_memory_grouping(&self) -> bool {
        (!self.group_by().is_empty() || self.has_aggregation() || self.is_distinct()) && !self.is_stream_grouping()
    }

    /// Every column reference that may carry an owner, for owner rewriting.
    #[must_use]
    pub fn owned_columns(&self) -> Vec<&ColumnSegment> {
        let mut columns = Vec::new();
        if let Some(select) = &self.select {
            for projection in &select.projections.items {
                match &projection.kind {
                    ProjectionKind::Column(c) => columns.push(c),
                    ProjectionKind::Aggregation { argument: Some(c), .. } => columns.push(c),
                    _ => {}
                }
            }
            for item in select.group_by.iter().chain(&select.order_by) {
                if let OrderByTarget::Column(c) = &item.target {
                    columns.push(c);
                }
            }
        }
        for expr in self.join_conditions.iter().chain(self.where_segment.as_ref().map(|w| &w.expr)) {
            for predicate in expr.predicates() {
                columns.push(&predicate.column);
                for right in predicate.expressions() {
                    if let ExpressionSegment::Column(c) = right {
                        columns.push(c);
                    }
                }
            }
        }
        for assignment in &self.assignments {
            columns.push(&assignment.column);
        }
        columns.retain(|c| c.owner.is_some());
        columns
    }
}
