use nom::{
    branch::alt,
    character::complete::{char, multispace0},
    combinator::{map, opt},
    IResult,
};

use super::common::{alias, column, identifier, keyword, symbol, value, Ctx};
use crate::statement::{
    CompareOperator, ConditionExpr, ExpressionSegment, PredicateRight, PredicateSegment, Span, TableSegment,
};

/// `?`, a literal, or a column reference.
pub fn expression<'a>(ctx: &Ctx<'a>, input: &'a str) -> IResult<&'a str, ExpressionSegment> {
    let (input, _) = multispace0(input)?;
    if let Ok((rest, _)) = char::<&str, nom::error::Error<&str>>('?')(input) {
        let start = ctx.offset(input);
        return Ok((
            rest,
            ExpressionSegment::Parameter { index: ctx.parameter_index(start), span: ctx.span(input, rest) },
        ));
    }
    if let Ok((rest, v)) = value(input) {
        return Ok((rest, ExpressionSegment::Literal { value: v, span: ctx.span(input, rest) }));
    }
    map(|i| column(ctx, i), ExpressionSegment::Column)(input)
}

/// Comma separated expressions inside parentheses.
pub fn expression_list<'a>(ctx: &Ctx<'a>, input: &'a str) -> IResult<&'a str, Vec<ExpressionSegment>> {
    let (mut input, _) = symbol("(")(input)?;
    let mut items = Vec::new();
    loop {
        let (rest, item) = expression(ctx, input)?;
        items.push(item);
        if let Ok((rest, _)) = symbol(",")(rest) {
            input = rest;
            continue;
        }
        let (rest, _) = symbol(")")(rest)?;
        return Ok((rest, items));
    }
}

fn compare_operator(input: &str) -> IResult<&str, CompareOperator> {
    let (input, _) = multispace0(input)?;
    alt((
        map(nom::bytes::complete::tag("<="), |_| CompareOperator::LtEq),
        map(nom::bytes::complete::tag(">="), |_| CompareOperator::GtEq),
        map(nom::bytes::complete::tag("<>"), |_| CompareOperator::NotEq),
        map(nom::bytes::complete::tag("!="), |_| CompareOperator::NotEq),
        map(nom::bytes::complete::tag("="), |_| CompareOperator::Eq),
        map(nom::bytes::complete::tag("<"), |_| CompareOperator::Lt),
        map(nom::bytes::complete::tag(">"), |_| CompareOperator::Gt),
    ))(input)
}

/// `column <op> expr`, `[NOT] IN (...)`, `[NOT] BETWEEN a AND b`, `IS [NOT] NULL`, `[NOT] LIKE expr`.
pub fn predicate<'a>(ctx: &Ctx<'a>, input: &'a str) -> IResult<&'a str, PredicateSegment> {
    let (input, _) = multispace0(input)?;
    let start = input;
    let (input, col) = column(ctx, input)?;

    if let Ok((rest, op)) = compare_operator(input) {
        let (rest, right) = expression(ctx, rest)?;
        return Ok((rest, PredicateSegment {
            column: col,
            right: PredicateRight::Compare(op, right),
            negated: false,
            span: ctx.span(start, rest),
        }));
    }
    if let Ok((rest, _)) = keyword("IS")(input) {
        let (rest, not) = opt(keyword("NOT"))(rest)?;
        let (rest, _) = keyword("NULL")(rest)?;
        return Ok((rest, PredicateSegment {
            column: col,
            right: PredicateRight::IsNull,
            negated: not.is_some(),
            span: ctx.span(start, rest),
        }));
    }

    let (input, not) = opt(keyword("NOT"))(input)?;
    let negated = not.is_some();
    if let Ok((rest, _)) = keyword("IN")(input) {
        let (rest, items) = expression_list(ctx, rest)?;
        return Ok((rest, PredicateSegment {
            column: col,
            right: PredicateRight::In(items),
            negated,
            span: ctx.span(start, rest),
        }));
    }
    if let Ok((rest, _)) = keyword("BETWEEN")(input) {
        let (rest, low) = expression(ctx, rest)?;
        let (rest, _) = keyword("AND")(rest)?;
        let (rest, high) = expression(ctx, rest)?;
        return Ok((rest, PredicateSegment {
            column: col,
            right: PredicateRight::Between(low, high),
            negated,
            span: ctx.span(start, rest),
        }));
    }
    let (rest, _) = keyword("LIKE")(input)?;
    let (rest, pattern) = expression(ctx, rest)?;
    Ok((rest, PredicateSegment {
        column: col,
        right: PredicateRight::Like(pattern),
        negated,
        span: ctx.span(start, rest),
    }))
}

fn primary<'a>(ctx: &Ctx<'a>, input: &'a str) -> IResult<&'a str, ConditionExpr> {
    let (input, _) = multispace0(input)?;
    if let Ok((rest, _)) = char::<&str, nom::error::Error<&str>>('(')(input) {
        let (rest, inner) = condition(ctx, rest)?;
        let (rest, _) = symbol(")")(rest)?;
        return Ok((rest, ConditionExpr::Group { inner: Box::new(inner), span: ctx.span(input, rest) }));
    }
    map(|i| predicate(ctx, i), ConditionExpr::Predicate)(input)
}

fn conjunction<'a>(ctx: &Ctx<'a>, input: &'a str) -> IResult<&'a str, ConditionExpr> {
    let (mut rest, first) = primary(ctx, input)?;
    let mut items = vec![first];
    while let Ok((after, _)) = keyword("AND")(rest) {
        let (after, item) = primary(ctx, after)?;
        items.push(item);
        rest = after;
    }
    Ok((rest, fold(items, |items, span| ConditionExpr::And { items, span })))
}

/// Full boolean condition with AND binding tighter than OR.
pub fn condition<'a>(ctx: &Ctx<'a>, input: &'a str) -> IResult<&'a str, ConditionExpr> {
    let (mut rest, first) = conjunction(ctx, input)?;
    let mut items = vec![first];
    while let Ok((after, _)) = keyword("OR")(rest) {
        let (after, item) = conjunction(ctx, after)?;
        items.push(item);
        rest = after;
    }
    Ok((rest, fold(items, |items, span| ConditionExpr::Or { items, span })))
}

fn fold(mut items: Vec<ConditionExpr>, build: impl FnOnce(Vec<ConditionExpr>, Span) -> ConditionExpr) -> ConditionExpr {
    if items.len() == 1 {
        return items.remove(0);
    }
    let start = items.first().map_or(0, |i| i.span().start);
    let end = items.last().map_or(0, |i| i.span().end);
    build(items, Span::new(start, end))
}

/// `table [[AS] alias]`
pub fn table_reference<'a>(ctx: &Ctx<'a>, input: &'a str) -> IResult<&'a str, TableSegment> {
    let (input, _) = multispace0(input)?;
    let start = input;
    let (rest, name) = identifier(input)?;
    let span = ctx.span(start, rest);
    let (rest, alias) = alias(rest)?;
    Ok((rest, TableSegment { name, alias, span }))
}
