use crate::core::{ShardingError, Value};
use crate::statement::Span;

/// Fragment of replacement text, resolved per route unit when rendered.
#[derive(Debug, Clone, PartialEq)]
pub enum Piece {
    Text(String),
    /// Logical table name, rendered as the unit's actual table.
    Table(String),
    /// Bound value, rendered as a `?` marker.
    Parameter(Value),
}

impl Piece {
    pub fn text(s: impl Into<String>) -> Self {
        Self::Text(s.into())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    Replace(Vec<Piece>),
    /// INSERT rows; each unit renders only the rows routed to it.
    InsertValues(Vec<Vec<Piece>>),
}

/// Replacement of the byte range `[start, end)` of the original SQL.
/// A zero-width token is an insertion.
#[derive(Debug, Clone, PartialEq)]
pub struct SqlToken {
    pub start: usize,
    pub end: usize,
    pub generator: &'static str,
    pub kind: TokenKind,
}

impl SqlToken {
    #[must_use]
    pub fn replace(generator: &'static str, span: Span, pieces: Vec<Piece>) -> Self {
        Self { start: span.start, end: span.end, generator, kind: TokenKind::Replace(pieces) }
    }

    #[must_use]
    pub fn remove(generator: &'static str, span: Span) -> Self {
        Self::replace(generator, span, Vec::new())
    }

    #[must_use]
    pub fn table(generator: &'static str, span: Span, logic_table: &str) -> Self {
        Self::replace(generator, span, vec![Piece::Table(logic_table.to_lowercase())])
    }

    #[must_use]
    pub const fn span(&self) -> Span {
        Span::new(self.start, self.end)
    }
}

/// Sorts tokens by position and rejects any that fall outside `sql` or
/// overlap one another.
pub fn arrange(mut tokens: Vec<SqlToken>, sql: &str) -> Result<Vec<SqlToken>, ShardingError> {
    for token in &tokens {
        let in_range = token.start <= token.end
            && token.end <= sql.len()
            && sql.is_char_boundary(token.start)
            && sql.is_char_boundary(token.end);
        if !in_range {
            return Err(ShardingError::TokenOutOfRange {
                sql: sql.to_string(),
                generator: token.generator,
                start: token.start,
                end: token.end,
                len: sql.len(),
            });
        }
    }
    tokens.sort_by_key(|t| (t.start, t.end));
    for pair in tokens.windows(2) {
        let (first, second) = (&pair[0], &pair[1]);
        if second.start < first.end {
            tracing::warn!(
                first = first.generator,
                second = second.generator,
                at = second.start,
                "overlapping rewrite tokens"
            );
            return Err(ShardingError::OverlappingTokens {
                sql: sql.to_string(),
                first: first.generator,
                first_start: first.start,
                first_end: first.end,
                second: second.generator,
                second_start: second.start,
                second_end: second.end,
            });
        }
    }
    Ok(tokens)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tokens_are_sorted() {
        let sql = "SELECT * FROM t_order";
        let tokens = arrange(
            vec![
                SqlToken::table("table", Span::new(14, 21), "t_order"),
                SqlToken::replace("projection", Span::at(8), vec![Piece::text(", x")]),
            ],
            sql,
        )
        .unwrap();
        assert_eq!(tokens[0].generator, "projection");
        assert_eq!(tokens[1].span(), Span::new(14, 21));
    }

    #[test]
    fn test_overlap_names_both_generators() {
        let sql = "SELECT a FROM t";
        let result = arrange(
            vec![SqlToken::remove("shadow", Span::new(0, 8)), SqlToken::remove("encrypt", Span::new(7, 8))],
            sql,
        );
        match result {
            Err(ShardingError::OverlappingTokens { first, second, .. }) => {
                assert_eq!((first, second), ("shadow", "encrypt"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_adjacent_and_insertion_tokens_do_not_overlap() {
        let sql = "SELECT a FROM t";
        let tokens = vec![
            SqlToken::remove("a", Span::new(7, 8)),
            SqlToken::replace("b", Span::at(8), vec![Piece::text(", b")]),
            SqlToken::table("c", Span::new(14, 15), "t"),
        ];
        assert_eq!(arrange(tokens, sql).unwrap().len(), 3);
    }

    #[test]
    fn test_out_of_range_token() {
        let result = arrange(vec![SqlToken::remove("pagination", Span::new(3, 40))], "SELECT 1");
        assert!(matches!(result, Err(ShardingError::TokenOutOfRange { end: 40, len: 8, .. })));
    }
}
