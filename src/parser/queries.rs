use super::common::{alias, column, identifier, keyword, symbol, value, Ctx};
use super::expression::{condition, table_reference};
use crate::statement::{
    AggregationKind, ConditionExpr, OrderByItem, OrderByTarget, OrderDirection, PaginationSegment,
    PaginationValue, ProjectionKind, ProjectionSegment, ProjectionsSegment, SelectSegment, Span,
    StatementContext, StatementKind, TableSegment, WhereSegment,
};
use nom::{
    branch::alt,
    character::complete::{char, digit1, multispace0},
    combinator::{map, map_res, opt},
    sequence::tuple,
    IResult,
};

fn aggregation_kind(input: &str) -> IResult<&str, AggregationKind> {
    alt((
        map(keyword("COUNT"), |_| AggregationKind::Count),
        map(keyword("SUM"), |_| AggregationKind::Sum),
        map(keyword("MAX"), |_| AggregationKind::Max),
        map(keyword("MIN"), |_| AggregationKind::Min),
        map(keyword("AVG"), |_| AggregationKind::Avg),
    ))(input)
}

fn aggregation<'a>(ctx: &Ctx<'a>, input: &'a str) -> IResult<&'a str, ProjectionKind> {
    let (input, kind) = aggregation_kind(input)?;
    let (input, _) = symbol("(")(input)?;
    let (input, distinct) = opt(keyword("DISTINCT"))(input)?;
    let (input, argument) = if let Ok((rest, _)) = symbol("*")(input) {
        (rest, None)
    } else {
        let (rest, c) = column(ctx, input)?;
        (rest, Some(c))
    };
    let (input, _) = symbol(")")(input)?;
    Ok((input, ProjectionKind::Aggregation { kind, distinct: distinct.is_some(), argument }))
}

fn projection<'a>(ctx: &Ctx<'a>, input: &'a str) -> IResult<&'a str, ProjectionSegment> {
    let (input, _) = multispace0(input)?;
    let start = input;
    if let Ok((rest, _)) = char::<&str, nom::error::Error<&str>>('*')(input) {
        return Ok((rest, ProjectionSegment {
            kind: ProjectionKind::Shorthand { owner: None },
            alias: None,
            span: ctx.span(start, rest),
        }));
    }
    if let Ok((rest, (owner, _, _))) = tuple((identifier, char('.'), char('*')))(input) {
        return Ok((rest, ProjectionSegment {
            kind: ProjectionKind::Shorthand { owner: Some(owner) },
            alias: None,
            span: ctx.span(start, rest),
        }));
    }
    let (rest, kind) = if let Ok(parsed) = aggregation(ctx, input) {
        parsed
    } else if let Ok((rest, v)) = value(input) {
        (rest, ProjectionKind::Literal(v))
    } else {
        let (rest, c) = column(ctx, input)?;
        (rest, ProjectionKind::Column(c))
    };
    let end = rest;
    let (rest, alias) = alias(rest)?;
    // The span covers the expression and its alias.
    let span = if alias.is_some() { ctx.span(start, rest) } else { ctx.span(start, end) };
    Ok((rest, ProjectionSegment { kind, alias, span }))
}

fn projections<'a>(ctx: &Ctx<'a>, input: &'a str) -> IResult<&'a str, ProjectionsSegment> {
    let (input, distinct) = opt(keyword("DISTINCT"))(input)?;
    let (mut rest, first) = projection(ctx, input)?;
    let mut items = vec![first];
    while let Ok((after, _)) = symbol(",")(rest) {
        let (after, item) = projection(ctx, after)?;
        items.push(item);
        rest = after;
    }
    let span = Span::new(items[0].span.start, items[items.len() - 1].span.end);
    Ok((rest, ProjectionsSegment { distinct: distinct.is_some(), items, span }))
}

/// FROM list with optional joins; returns tables and join conditions.
fn from_clause<'a>(ctx: &Ctx<'a>, input: &'a str) -> IResult<&'a str, (Vec<TableSegment>, Vec<ConditionExpr>)> {
    let (input, _) = keyword("FROM")(input)?;
    let (mut rest, first) = table_reference(ctx, input)?;
    let mut tables = vec![first];
    let mut joins = Vec::new();
    loop {
        if let Ok((after, _)) = symbol(",")(rest) {
            let (after, table) = table_reference(ctx, after)?;
            tables.push(table);
            rest = after;
            continue;
        }
        let join: IResult<&str, _> = tuple((
            opt(alt((
                keyword("INNER"),
                map(tuple((keyword("LEFT"), opt(keyword("OUTER")))), |(k, _)| k),
                map(tuple((keyword("RIGHT"), opt(keyword("OUTER")))), |(k, _)| k),
                keyword("CROSS"),
            ))),
            keyword("JOIN"),
        ))(rest);
        let Ok((after, _)) = join else {
            break;
        };
        let (after, table) = table_reference(ctx, after)?;
        tables.push(table);
        rest = after;
        if let Ok((after, _)) = keyword("ON")(rest) {
            let (after, on) = condition(ctx, after)?;
            joins.push(on);
            rest = after;
        }
    }
    Ok((rest, (tables, joins)))
}

pub fn where_clause<'a>(ctx: &Ctx<'a>, input: &'a str) -> IResult<&'a str, Option<WhereSegment>> {
    let (input, _) = multispace0(input)?;
    let Ok((rest, _)) = keyword("WHERE")(input) else {
        return Ok((input, None));
    };
    let (rest, expr) = condition(ctx, rest)?;
    Ok((rest, Some(WhereSegment { span: ctx.span(input, rest), expr })))
}

fn order_item<'a>(ctx: &Ctx<'a>, input: &'a str) -> IResult<&'a str, OrderByItem> {
    let (input, _) = multispace0(input)?;
    let start = input;
    let index: IResult<&str, usize> = map_res(digit1, |s: &str| s.parse::<usize>())(input);
    let (rest, target) = if let Ok((rest, idx)) = index {
        (rest, OrderByTarget::Index(idx))
    } else {
        let (rest, c) = column(ctx, input)?;
        (rest, OrderByTarget::Column(c))
    };
    let (rest, direction) = opt(alt((
        map(keyword("ASC"), |_| OrderDirection::Asc),
        map(keyword("DESC"), |_| OrderDirection::Desc),
    )))(rest)?;
    Ok((rest, OrderByItem {
        target,
        direction: direction.unwrap_or(OrderDirection::Asc),
        span: ctx.span(start, rest),
    }))
}

fn order_items<'a>(ctx: &Ctx<'a>, input: &'a str, first_keyword: &'static str) -> IResult<&'a str, Vec<OrderByItem>> {
    let Ok((rest, _)) = tuple((keyword(first_keyword), keyword("BY")))(input) else {
        return Ok((input, Vec::new()));
    };
    let (mut rest, first) = order_item(ctx, rest)?;
    let mut items = vec![first];
    while let Ok((after, _)) = symbol(",")(rest) {
        let (after, item) = order_item(ctx, after)?;
        items.push(item);
        rest = after;
    }
    Ok((rest, items))
}

fn pagination_value<'a>(ctx: &Ctx<'a>, input: &'a str) -> IResult<&'a str, PaginationValue> {
    let (input, _) = multispace0(input)?;
    if let Ok((rest, _)) = char::<&str, nom::error::Error<&str>>('?')(input) {
        let span = ctx.span(input, rest);
        return Ok((rest, PaginationValue::Parameter { index: ctx.parameter_index(span.start), span }));
    }
    let (rest, value) = map_res(digit1, |s: &str| s.parse::<u64>())(input)?;
    Ok((rest, PaginationValue::Literal { value, span: ctx.span(input, rest) }))
}

/// `LIMIT n`, `LIMIT offset, n`, `LIMIT n OFFSET offset`.
pub fn pagination<'a>(ctx: &Ctx<'a>, input: &'a str) -> IResult<&'a str, Option<PaginationSegment>> {
    let (input, _) = multispace0(input)?;
    let Ok((rest, _)) = keyword("LIMIT")(input) else {
        return Ok((input, None));
    };
    let (rest, first) = pagination_value(ctx, rest)?;
    if let Ok((after, _)) = symbol(",")(rest) {
        let (after, count) = pagination_value(ctx, after)?;
        return Ok((after, Some(PaginationSegment {
            offset: Some(first),
            row_count: Some(count),
            span: ctx.span(input, after),
        })));
    }
    if let Ok((after, _)) = keyword("OFFSET")(rest) {
        let (after, offset) = pagination_value(ctx, after)?;
        return Ok((after, Some(PaginationSegment {
            offset: Some(offset),
            row_count: Some(first),
            span: ctx.span(input, after),
        })));
    }
    Ok((rest, Some(PaginationSegment { offset: None, row_count: Some(first), span: ctx.span(input, rest) })))
}

pub fn select<'a>(ctx: &Ctx<'a>, input: &'a str) -> IResult<&'a str, StatementContext> {
    let (input, _) = keyword("SELECT")(input)?;
    let (input, projections) = projections(ctx, input)?;
    let projections_end = projections.span.end;
    let (input, (tables, joins)) = from_clause(ctx, input)?;
    let (input, where_segment) = where_clause(ctx, input)?;
    let (input, group_by) = order_items(ctx, input, "GROUP")?;
    let (input, order_by) = order_items(ctx, input, "ORDER")?;
    let (input, pagination) = pagination(ctx, input)?;

    let mut statement = StatementContext::new(StatementKind::Select);
    statement.tables = tables;
    statement.join_conditions = joins;
    statement.where_segment = where_segment;
    statement.select = Some(SelectSegment { projections, group_by, order_by, pagination, projections_end });
    Ok((input, statement))
}
