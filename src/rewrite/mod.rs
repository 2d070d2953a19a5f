// SQL rewrite: route units -> one physical statement per unit
mod generator;
mod token;

pub use generator::SqlTokenGenerator;
pub use token::{Piece, SqlToken, TokenKind};

use crate::core::{ShardingError, Value};
use crate::metadata::SchemaMetadata;
use crate::parser::parameter_markers;
use crate::route::{RouteContext, RouteUnit};
use crate::rule::{EncryptColumn, RuleSet};
use crate::statement::{ColumnSegment, ExpressionSegment, Span, StatementContext};

/// Physical SQL and parameters for one route unit.
#[derive(Debug, Clone, PartialEq)]
pub struct RewriteUnit {
    /// Position of the route unit this was rendered for.
    pub index: usize,
    pub data_source: String,
    pub sql: String,
    pub parameters: Vec<Value>,
}

impl std::fmt::Display for RewriteUnit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ::: {}", self.data_source, self.sql)?;
        if !self.parameters.is_empty() {
            let parameters: Vec<String> = self.parameters.iter().map(ToString::to_string).collect();
            write!(f, " ::: [{}]", parameters.join(", "))?;
        }
        Ok(())
    }
}

/// Everything a token generator may look at.
pub struct RewriteContext<'a> {
    pub sql: &'a str,
    pub statement: &'a StatementContext,
    pub parameters: &'a [Value],
    pub route: &'a RouteContext,
    pub rules: &'a RuleSet,
    pub metadata: &'a SchemaMetadata,
    /// Spans of shadow marker predicates dropped from WHERE.
    shadow_removals: Vec<Span>,
}

impl<'a> RewriteContext<'a> {
    #[must_use]
    pub fn new(
        sql: &'a str,
        statement: &'a StatementContext,
        parameters: &'a [Value],
        route: &'a RouteContext,
        rules: &'a RuleSet,
        metadata: &'a SchemaMetadata,
    ) -> Self {
        let shadow_removals = rules
            .shadow
            .as_ref()
            .map(|shadow| generator::shadow_removals(statement, shadow))
            .unwrap_or_default();
        Self { sql, statement, parameters, route, rules, metadata, shadow_removals }
    }

    #[must_use]
    pub fn shadow_removals(&self) -> &[Span] {
        &self.shadow_removals
    }

    /// Whether `span` lies inside text the shadow generator removes.
    #[must_use]
    pub fn is_removed(&self, span: Span) -> bool {
        self.shadow_removals.iter().any(|r| r.start <= span.start && span.end <= r.end)
    }

    /// Logical table an owner names directly (not through an alias).
    #[must_use]
    pub fn owner_table(&self, owner: &str) -> Option<String> {
        let table = self.statement.table_by_owner(owner)?;
        match &table.alias {
            Some(alias) if alias.eq_ignore_ascii_case(owner) => None,
            _ => Some(table.logic_name()),
        }
    }

    /// `owner.` with a table-name owner left for per-unit substitution.
    #[must_use]
    pub fn owner_pieces(&self, owner: &str) -> Vec<Piece> {
        match self.owner_table(owner) {
            Some(table) => vec![Piece::Table(table), Piece::text(".")],
            None => vec![Piece::text(format!("{owner}."))],
        }
    }

    #[must_use]
    pub fn column_pieces(&self, column: &ColumnSegment) -> Vec<Piece> {
        let mut pieces = column.owner_name().map(|o| self.owner_pieces(o)).unwrap_or_default();
        pieces.push(Piece::text(column.name.clone()));
        pieces
    }

    pub fn parameter(&self, index: usize) -> Result<Value, ShardingError> {
        self.parameters
            .get(index)
            .cloned()
            .ok_or(ShardingError::ParameterOutOfRange { index, count: self.parameters.len() })
    }

    /// Expression carried over unchanged; a `?` keeps its bound value.
    pub fn expression_piece(&self, expr: &ExpressionSegment) -> Result<Piece, ShardingError> {
        match expr {
            ExpressionSegment::Parameter { index, .. } => Ok(Piece::Parameter(self.parameter(*index)?)),
            other => Ok(Piece::text(other.span().text(self.sql))),
        }
    }

    /// Value of a literal or parameter expression.
    pub fn value_of(&self, expr: &ExpressionSegment) -> Result<Value, ShardingError> {
        match expr {
            ExpressionSegment::Literal { value, .. } => Ok(value.clone()),
            ExpressionSegment::Parameter { index, .. } => self.parameter(*index),
            ExpressionSegment::Column(c) => {
                Err(ShardingError::Encrypt(format!("Expected a value, found column '{}'", c.name)))
            }
        }
    }

    /// `value` in the same form as `expr` was written: a parameter stays a parameter.
    #[must_use]
    pub fn replacement(expr: &ExpressionSegment, value: Value) -> Piece {
        match expr {
            ExpressionSegment::Parameter { .. } => Piece::Parameter(value),
            _ => Piece::Text(value.to_sql_literal()),
        }
    }

    /// Encryption layout of a column, if its table encrypts it.
    #[must_use]
    pub fn encrypt_column(&self, column: &ColumnSegment) -> Option<&'a EncryptColumn> {
        let encrypt = &self.rules.encrypt;
        match self.statement.table_of_column(column, self.metadata) {
            Ok(table) => encrypt.find_column(&table, &column.name),
            Err(_) if column.owner.is_none() => self
                .statement
                .logic_table_names()
                .iter()
                .find_map(|t| encrypt.find_column(t, &column.name)),
            Err(_) => None,
        }
    }
}

/// Produces physical SQL for every route unit from the logical statement.
pub struct RewriteEngine<'a> {
    rules: &'a RuleSet,
    metadata: &'a SchemaMetadata,
}

impl<'a> RewriteEngine<'a> {
    #[must_use]
    pub const fn new(rules: &'a RuleSet, metadata: &'a SchemaMetadata) -> Self {
        Self { rules, metadata }
    }

    /// Collects, orders and validates the tokens of every applicable generator.
    pub fn tokens(&self, context: &RewriteContext<'_>) -> Result<Vec<SqlToken>, ShardingError> {
        let mut tokens = Vec::new();
        for generator in generator::generators() {
            if generator.is_generate(context) {
                let generated = generator.generate(context)?;
                tracing::trace!(generator = generator.name(), tokens = generated.len(), "sql tokens");
                tokens.extend(generated);
            }
        }
        token::arrange(tokens, context.sql)
    }

    pub fn rewrite(
        &self,
        sql: &str,
        statement: &StatementContext,
        parameters: &[Value],
        route: &RouteContext,
    ) -> Result<Vec<RewriteUnit>, ShardingError> {
        let context = RewriteContext::new(sql, statement, parameters, route, self.rules, self.metadata);
        let tokens = self.tokens(&context)?;
        let markers = parameter_markers(sql);

        let mut units = Vec::with_capacity(route.units.len());
        for (index, unit) in route.units.iter().enumerate() {
            let data_source = unit.data_source.actual_name.clone();
            if route.is_single_routing() && tokens.iter().all(|t| is_identity(t, sql, unit)) {
                units.push(RewriteUnit { index, data_source, sql: sql.to_string(), parameters: parameters.to_vec() });
                continue;
            }
            let (sql, parameters) = render(&context, &tokens, &markers, index, unit)?;
            units.push(RewriteUnit { index, data_source, sql, parameters });
        }
        Ok(units)
    }
}

/// A table token whose actual table is written exactly as in the original.
fn is_identity(token: &SqlToken, sql: &str, unit: &RouteUnit) -> bool {
    match &token.kind {
        TokenKind::Replace(pieces) => match pieces.as_slice() {
            [Piece::Table(logic)] => unit.actual_table(logic) == Some(token.span().text(sql)),
            _ => false,
        },
        TokenKind::InsertValues(_) => false,
    }
}

/// Renders the statement for one unit: original text between tokens, token
/// output in their place, and parameters in marker order.
fn render(
    context: &RewriteContext<'_>,
    tokens: &[SqlToken],
    markers: &[usize],
    index: usize,
    unit: &RouteUnit,
) -> Result<(String, Vec<Value>), ShardingError> {
    let sql = context.sql;
    let mut out = String::with_capacity(sql.len() + 16);
    let mut parameters = Vec::with_capacity(context.parameters.len());

    let mut copy = |from: usize, to: usize, out: &mut String, parameters: &mut Vec<Value>| -> Result<(), ShardingError> {
        out.push_str(&sql[from..to]);
        for (ordinal, _) in markers.iter().enumerate().filter(|(_, m)| (from..to).contains(*m)) {
            parameters.push(context.parameter(ordinal)?);
        }
        Ok(())
    };

    let mut cursor = 0;
    for token in tokens {
        copy(cursor, token.start, &mut out, &mut parameters)?;
        match &token.kind {
            TokenKind::Replace(pieces) => push_pieces(pieces, unit, &mut out, &mut parameters),
            TokenKind::InsertValues(rows) => {
                let selected: Vec<usize> = if context.route.insert_row_units.is_empty() {
                    (0..rows.len()).collect()
                } else {
                    context.route.insert_rows_of(index)
                };
                for (n, row) in selected.iter().filter_map(|r| rows.get(*r)).enumerate() {
                    if n > 0 {
                        out.push_str(", ");
                    }
                    out.push('(');
                    push_pieces(row, unit, &mut out, &mut parameters);
                    out.push(')');
                }
            }
        }
        cursor = token.end;
    }
    copy(cursor, sql.len(), &mut out, &mut parameters)?;
    Ok((out, parameters))
}

fn push_pieces(pieces: &[Piece], unit: &RouteUnit, out: &mut String, parameters: &mut Vec<Value>) {
    for piece in pieces {
        match piece {
            Piece::Text(text) => out.push_str(text),
            Piece::Table(logic) => out.push_str(unit.actual_table(logic).unwrap_or(logic)),
            Piece::Parameter(value) => {
                out.push('?');
                parameters.push(value.clone());
            }
        }
    }
}
