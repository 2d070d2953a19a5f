use super::common::{column, keyword, symbol, Ctx};
use super::expression::{expression, expression_list, table_reference};
use super::queries::where_clause;
use crate::statement::{
    AssignmentSegment, InsertSegment, InsertValuesSegment, Span, StatementContext, StatementKind,
};
use nom::{
    character::complete::multispace0,
    IResult,
};

fn column_list<'a>(ctx: &Ctx<'a>, input: &'a str) -> IResult<&'a str, (Vec<crate::statement::ColumnSegment>, Span)> {
    let (input, _) = multispace0(input)?;
    let start = input;
    let (mut rest, _) = symbol("(")(input)?;
    let mut columns = Vec::new();
    loop {
        let (after, c) = column(ctx, rest)?;
        columns.push(c);
        if let Ok((after, _)) = symbol(",")(after) {
            rest = after;
            continue;
        }
        let (after, _) = symbol(")")(after)?;
        return Ok((after, (columns, ctx.span(start, after))));
    }
}

fn values_row<'a>(ctx: &Ctx<'a>, input: &'a str) -> IResult<&'a str, InsertValuesSegment> {
    let (input, _) = multispace0(input)?;
    let (rest, values) = expression_list(ctx, input)?;
    Ok((rest, InsertValuesSegment { values, span: ctx.span(input, rest) }))
}

pub fn insert<'a>(ctx: &Ctx<'a>, input: &'a str) -> IResult<&'a str, StatementContext> {
    let (input, _) = keyword("INSERT")(input)?;
    let (input, _) = keyword("INTO")(input)?;
    let (input, table) = table_reference(ctx, input)?;
    let (input, columns) = match column_list(ctx, input) {
        Ok((rest, parsed)) => (rest, Some(parsed)),
        Err(_) => (input, None),
    };
    let (input, _) = keyword("VALUES")(input)?;
    let (mut rest, first) = values_row(ctx, input)?;
    let mut rows = vec![first];
    while let Ok((after, _)) = symbol(",")(rest) {
        let (after, row) = values_row(ctx, after)?;
        rows.push(row);
        rest = after;
    }

    let values_span = Span::new(rows[0].span.start, rows[rows.len() - 1].span.end);
    let (columns, columns_span) = match columns {
        Some((columns, span)) => (columns, Some(span)),
        None => (Vec::new(), None),
    };
    let mut statement = StatementContext::new(StatementKind::Insert);
    statement.tables = vec![table];
    statement.insert = Some(InsertSegment { columns, columns_span, values: rows, values_span });
    Ok((rest, statement))
}

fn assignment<'a>(ctx: &Ctx<'a>, input: &'a str) -> IResult<&'a str, AssignmentSegment> {
    let (input, _) = multispace0(input)?;
    let start = input;
    let (rest, c) = column(ctx, input)?;
    let (rest, _) = symbol("=")(rest)?;
    let (rest, value) = expression(ctx, rest)?;
    Ok((rest, AssignmentSegment { column: c, value, span: ctx.span(start, rest) }))
}

pub fn update<'a>(ctx: &Ctx<'a>, input: &'a str) -> IResult<&'a str, StatementContext> {
    let (input, _) = keyword("UPDATE")(input)?;
    let (input, table) = table_reference(ctx, input)?;
    let (input, _) = keyword("SET")(input)?;
    let (mut rest, first) = assignment(ctx, input)?;
    let mut assignments = vec![first];
    while let Ok((after, _)) = symbol(",")(rest) {
        let (after, item) = assignment(ctx, after)?;
        assignments.push(item);
        rest = after;
    }
    let (rest, where_segment) = where_clause(ctx, rest)?;

    let mut statement = StatementContext::new(StatementKind::Update);
    statement.tables = vec![table];
    statement.assignments = assignments;
    statement.where_segment = where_segment;
    Ok((rest, statement))
}

pub fn delete<'a>(ctx: &Ctx<'a>, input: &'a str) -> IResult<&'a str, StatementContext> {
    let (input, _) = keyword("DELETE")(input)?;
    let (input, _) = keyword("FROM")(input)?;
    let (input, table) = table_reference(ctx, input)?;
    let (rest, where_segment) = where_clause(ctx, input)?;

    let mut statement = StatementContext::new(StatementKind::Delete);
    statement.tables = vec![table];
    statement.where_segment = where_segment;
    Ok((rest, statement))
}
