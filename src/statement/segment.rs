use crate::core::Value;

/// Byte range `[start, end)` in the original SQL text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    #[must_use]
    pub const fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    /// Zero-width span used for insertions.
    #[must_use]
    pub const fn at(position: usize) -> Self {
        Self { start: position, end: position }
    }

    #[must_use]
    pub fn text<'a>(&self, sql: &'a str) -> &'a str {
        sql.get(self.start..self.end).unwrap_or_default()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSegment {
    pub name: String,
    pub alias: Option<String>,
    /// Span of the table name only.
    pub span: Span,
}

impl TableSegment {
    #[must_use]
    pub fn logic_name(&self) -> String {
        self.name.to_lowercase()
    }

    /// Whether `owner` refers to this table (by alias, or by name when no alias shadows it).
    #[must_use]
    pub fn is_referenced_by(&self, owner: &str) -> bool {
        match &self.alias {
            Some(alias) if alias.eq_ignore_ascii_case(owner) => true,
            _ => self.name.eq_ignore_ascii_case(owner),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OwnerSegment {
    pub name: String,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnSegment {
    pub name: String,
    pub owner: Option<OwnerSegment>,
    /// Span of `owner.name` as written.
    pub span: Span,
    /// Span of the column name without its owner.
    pub name_span: Span,
}

impl ColumnSegment {
    #[must_use]
    pub fn owner_name(&self) -> Option<&str> {
        self.owner.as_ref().map(|o| o.name.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExpressionSegment {
    Literal { value: Value, span: Span },
    Parameter { index: usize, span: Span },
    Column(ColumnSegment),
}

impl ExpressionSegment {
    #[must_use]
    pub const fn span(&self) -> Span {
        match self {
            Self::Literal { span, .. } | Self::Parameter { span, .. } => *span,
            Self::Column(column) => column.span,
        }
    }

    /// Literal value, or the bound parameter for a `?` marker.
    pub fn resolve(&self, parameters: &[Value]) -> Option<Value> {
        match self {
            Self::Literal { value, .. } => Some(value.clone()),
            Self::Parameter { index, .. } => parameters.get(*index).cloned(),
            Self::Column(_) => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOperator {
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PredicateRight {
    Compare(CompareOperator, ExpressionSegment),
    In(Vec<ExpressionSegment>),
    Between(ExpressionSegment, ExpressionSegment),
    IsNull,
    Like(ExpressionSegment),
}

#[derive(Debug, Clone, PartialEq)]
pub struct PredicateSegment {
    pub column: ColumnSegment,
    pub right: PredicateRight,
    /// `NOT IN`, `NOT BETWEEN`, `NOT LIKE`, `IS NOT NULL`
    pub negated: bool,
    pub span: Span,
}

impl PredicateSegment {
    /// Right-hand expressions in textual order.
    #[must_use]
    pub fn expressions(&self) -> Vec<&ExpressionSegment> {
        match &self.right {
            PredicateRight::Compare(_, e) | PredicateRight::Like(e) => vec![e],
            PredicateRight::In(items) => items.iter().collect(),
            PredicateRight::Between(a, b) => vec![a, b],
            PredicateRight::IsNull => Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ConditionExpr {
    And { items: Vec<ConditionExpr>, span: Span },
    Or { items: Vec<ConditionExpr>, span: Span },
    /// Parenthesised sub-expression; the span includes the parentheses.
    Group { inner: Box<ConditionExpr>, span: Span },
    Predicate(PredicateSegment),
}

impl ConditionExpr {
    #[must_use]
    pub const fn span(&self) -> Span {
        match self {
            Self::And { span, .. } | Self::Or { span, .. } | Self::Group { span, .. } => *span,
            Self::Predicate(p) => p.span,
        }
    }

    /// Top-level AND conjuncts; a lone expression is its own single conjunct.
    #[must_use]
    pub fn and_conjuncts(&self) -> Vec<&Self> {
        match self {
            Self::And { items, .. } => items.iter().collect(),
            other => vec![other],
        }
    }

    /// Every predicate in the tree, in textual order.
    #[must_use]
    pub fn predicates(&self) -> Vec<&PredicateSegment> {
        let mut out = Vec::new();
        self.collect_predicates(&mut out);
        out
    }

    fn collect_predicates<'a>(&'a self, out: &mut Vec<&'a PredicateSegment>) {
        match self {
            Self::And { items, .. } | Self::Or { items, .. } => {
                for item in items {
                    item.collect_predicates(out);
                }
            }
            Self::Group { inner, .. } => inner.collect_predicates(out),
            Self::Predicate(p) => out.push(p),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct WhereSegment {
    /// From the `WHERE` keyword to the end of the condition.
    pub span: Span,
    pub expr: ConditionExpr,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AggregationKind {
    Count,
    Sum,
    Max,
    Min,
    Avg,
}

impl AggregationKind {
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Count => "COUNT",
            Self::Sum => "SUM",
            Self::Max => "MAX",
            Self::Min => "MIN",
            Self::Avg => "AVG",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ProjectionKind {
    Column(ColumnSegment),
    /// `*` or `owner.*`
    Shorthand { owner: Option<String> },
    /// `argument` is `None` for `COUNT(*)`.
    Aggregation {
        kind: AggregationKind,
        distinct: bool,
        argument: Option<ColumnSegment>,
    },
    Literal(Value),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProjectionSegment {
    pub kind: ProjectionKind,
    pub alias: Option<String>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProjectionsSegment {
    pub distinct: bool,
    pub items: Vec<ProjectionSegment>,
    /// From the first projection to the end of the last one.
    pub span: Span,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderDirection {
    Asc,
    Desc,
}

#[derive(Debug, Clone, PartialEq)]
pub enum OrderByTarget {
    Column(ColumnSegment),
    /// 1-based projection position.
    Index(usize),
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrderByItem {
    pub target: OrderByTarget,
    pub direction: OrderDirection,
    pub span: Span,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaginationValue {
    Literal { value: u64, span: Span },
    Parameter { index: usize, span: Span },
}

impl PaginationValue {
    #[must_use]
    pub const fn span(&self) -> Span {
        match self {
            Self::Literal { span, .. } | Self::Parameter { span, .. } => *span,
        }
    }

    /// Resolved value; negative or non-integer parameters are rejected.
    pub fn resolve(&self, parameters: &[Value]) -> Result<u64, crate::core::ShardingError> {
        match self {
            Self::Literal { value, .. } => Ok(*value),
            Self::Parameter { index, .. } => parameters
                .get(*index)
                .ok_or(crate::core::ShardingError::ParameterOutOfRange { index: *index, count: parameters.len() })?
                .as_i64()
                .and_then(|v| u64::try_from(v).ok())
                .ok_or_else(|| crate::core::ShardingError::Route(format!("Invalid pagination parameter at index {index}"))),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PaginationSegment {
    pub offset: Option<PaginationValue>,
    pub row_count: Option<PaginationValue>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SelectSegment {
    pub projections: ProjectionsSegment,
    pub group_by: Vec<OrderByItem>,
    pub order_by: Vec<OrderByItem>,
    pub pagination: Option<PaginationSegment>,
    /// Position where derived ORDER BY / GROUP BY columns may be appended.
    pub projections_end: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct InsertValuesSegment {
    pub values: Vec<ExpressionSegment>,
    /// Includes the parentheses.
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct InsertSegment {
    pub columns: Vec<ColumnSegment>,
    /// Includes the parentheses; `None` when the column list is omitted.
    pub columns_span: Option<Span>,
    pub values: Vec<InsertValuesSegment>,
    /// From the first row's `(` to the last row's `)`.
    pub values_span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AssignmentSegment {
    pub column: ColumnSegment,
    pub value: ExpressionSegment,
    pub span: Span,
}
