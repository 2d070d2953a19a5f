use crate::core::{DataType, Value};
use crate::statement::{ColumnSegment, OwnerSegment, Span};
use chrono::{NaiveDate, NaiveDateTime};
use rust_decimal::Decimal;
use std::str::FromStr;
use nom::{
    branch::alt,
    bytes::complete::{tag, tag_no_case, take_while},
    character::complete::{alpha1, char, digit1, multispace0, satisfy},
    combinator::{map, map_res, not, opt, peek, recognize, verify},
    multi::many0,
    sequence::{delimited, pair, terminated, tuple},
    IResult,
};

/// Byte offsets of the `?` markers outside quoted strings and backquoted identifiers.
#[must_use]
pub fn parameter_markers(sql: &str) -> Vec<usize> {
    let mut markers = Vec::new();
    // Open quote character, if inside a string literal or backquoted identifier.
    let mut quote: Option<char> = None;
    for (i, c) in sql.char_indices() {
        match (quote, c) {
            (Some(open), c) if c == open => quote = None,
            (Some(_), _) => {}
            (None, '\'' | '`') => quote = Some(c),
            (None, '?') => markers.push(i),
            _ => {}
        }
    }
    markers
}

/// Parse state shared by every statement parser: the original text (for span
/// offsets) and the byte offsets of its `?` markers.
pub struct Ctx<'a> {
    base: &'a str,
    parameters: Vec<usize>,
}

impl<'a> Ctx<'a> {
    #[must_use]
    pub fn new(base: &'a str) -> Self {
        Self { base, parameters: parameter_markers(base) }
    }

    /// Byte offset of `rest` inside the original text.
    #[must_use]
    pub fn offset(&self, rest: &str) -> usize {
        self.base.len() - rest.len()
    }

    #[must_use]
    pub fn span(&self, from: &str, rest: &str) -> Span {
        Span::new(self.offset(from), self.offset(rest))
    }

    /// Zero-based index of the `?` marker starting at `offset`.
    #[must_use]
    pub fn parameter_index(&self, offset: usize) -> usize {
        self.parameters.binary_search(&offset).unwrap_or_else(|i| i)
    }

    #[must_use]
    pub fn parameter_count(&self) -> usize {
        self.parameters.len()
    }
}

pub fn ws<'a, F, O>(inner: F) -> impl FnMut(&'a str) -> IResult<&'a str, O>
where
    F: FnMut(&'a str) -> IResult<&'a str, O>,
{
    delimited(multispace0, inner, multispace0)
}

/// Case-insensitive keyword that must not run into an identifier character.
pub fn keyword<'a>(kw: &'static str) -> impl FnMut(&'a str) -> IResult<&'a str, &'a str> {
    move |input: &'a str| {
        let (input, _) = multispace0(input)?;
        terminated(
            tag_no_case(kw),
            not(peek(satisfy(|c: char| c.is_alphanumeric() || c == '_'))),
        )(input)
    }
}

/// Punctuation with leading whitespace skipped.
pub fn symbol<'a>(s: &'static str) -> impl FnMut(&'a str) -> IResult<&'a str, &'a str> {
    move |input: &'a str| {
        let (input, _) = multispace0(input)?;
        tag(s)(input)
    }
}

pub fn identifier(input: &str) -> IResult<&str, String> {
    alt((
        map(
            recognize(pair(
                alt((alpha1, tag("_"))),
                take_while(|c: char| c.is_alphanumeric() || c == '_'),
            )),
            |s: &str| s.to_string(),
        ),
        // Backquoted MySQL identifiers
        map(delimited(char('`'), take_while(|c: char| c != '`'), char('`')), |s: &str| s.to_string()),
    ))(input)
}

const RESERVED: &[&str] = &[
    "SELECT", "FROM", "WHERE", "AND", "OR", "NOT", "IN", "IS", "NULL", "LIKE", "BETWEEN", "ORDER",
    "GROUP", "BY", "LIMIT", "OFFSET", "JOIN", "INNER", "LEFT", "RIGHT", "CROSS", "OUTER", "ON", "AS",
    "SET", "VALUES", "INTO", "ASC", "DESC", "HAVING", "UNION", "DISTINCT",
];

// Identifier that is not a reserved keyword, so aliases stop at FROM/WHERE/...
pub fn non_keyword_identifier(input: &str) -> IResult<&str, String> {
    verify(identifier, |s: &String| {
        let upper = s.to_uppercase();
        !RESERVED.contains(&upper.as_str())
    })(input)
}

/// `[owner.]name` with spans for both parts.
pub fn column<'a>(ctx: &Ctx<'a>, input: &'a str) -> IResult<&'a str, ColumnSegment> {
    let (input, _) = multispace0(input)?;
    let start = input;
    let (rest, first) = non_keyword_identifier(input)?;
    let first_end = rest;
    if let Ok((rest, second)) = pair(char::<&str, nom::error::Error<&str>>('.'), identifier)(rest) {
        let (_, name) = second;
        let owner_span = ctx.span(start, first_end);
        let name_span = Span::new(owner_span.end + 1, ctx.offset(rest));
        return Ok((
            rest,
            ColumnSegment {
                name,
                owner: Some(OwnerSegment { name: first, span: owner_span }),
                span: ctx.span(start, rest),
                name_span,
            },
        ));
    }
    let span = ctx.span(start, rest);
    Ok((rest, ColumnSegment { name: first, owner: None, span, name_span: span }))
}

/// Optional `[AS] alias`.
pub fn alias(input: &str) -> IResult<&str, Option<String>> {
    opt(alias_name)(input)
}

fn alias_name(input: &str) -> IResult<&str, String> {
    let (input, _) = opt(keyword("AS"))(input)?;
    let (input, _) = multispace0(input)?;
    non_keyword_identifier(input)
}

/// Quoted string with `''` escapes; may be empty.
pub fn string_literal(input: &str) -> IResult<&str, String> {
    map(
        delimited(
            char('\''),
            many0(alt((
                map(tag("''"), |_| '\''),
                satisfy(|c| c != '\''),
            ))),
            char('\''),
        ),
        |chars: Vec<char>| chars.into_iter().collect(),
    )(input)
}

pub fn value(input: &str) -> IResult<&str, Value> {
    alt((
        // NULL
        map(keyword("NULL"), |_| Value::Null),

        // Boolean
        map(keyword("TRUE"), |_| Value::Boolean(true)),
        map(keyword("FALSE"), |_| Value::Boolean(false)),

        // Date/Timestamp/Text in quotes
        map(string_literal, |s: String| {
            if let Ok(d) = NaiveDate::parse_from_str(&s, "%Y-%m-%d") {
                return Value::Date(d);
            }
            if let Ok(t) = NaiveDateTime::parse_from_str(&s, "%Y-%m-%d %H:%M:%S") {
                return Value::Timestamp(t);
            }
            Value::Text(s)
        }),

        // Numeric with decimal point - try Decimal first, then Real
        map_res(
            recognize(tuple((
                opt(char('-')),
                digit1,
                char('.'),
                digit1,
            ))),
            |s: &str| -> Result<Value, String> {
                if let Ok(d) = Decimal::from_str(s) {
                    Ok(Value::Numeric(d))
                } else {
                    Ok(Value::Real(s.parse().map_err(|e| format!("{e:?}"))?))
                }
            }
        ),

        // Integer
        map_res(
            recognize(pair(opt(char('-')), digit1)),
            |s: &str| s.parse::<i64>().map(Value::Integer),
        ),
    ))(input)
}

pub fn data_type(input: &str) -> IResult<&str, DataType> {
    alt((
        // Auto-increment types
        map(tag_no_case("BIGSERIAL"), |_| DataType::BigSerial),
        map(tag_no_case("SERIAL"), |_| DataType::Serial),
        // Numeric types with precision/scale
        map(
            tuple((
                alt((tag_no_case("NUMERIC"), tag_no_case("DECIMAL"))),
                opt(delimited(
                    ws(char('(')),
                    tuple((
                        ws(map_res(digit1, |s: &str| s.parse::<u8>())),
                        opt(nom::sequence::preceded(
                            ws(char(',')),
                            ws(map_res(digit1, |s: &str| s.parse::<u8>())),
                        )),
                    )),
                    ws(char(')')),
                )),
            )),
            |(_, params)| match params {
                Some((p, Some(s))) => DataType::Numeric { precision: p, scale: s },
                Some((p, None)) => DataType::Numeric { precision: p, scale: 0 },
                None => DataType::Numeric { precision: 10, scale: 0 },
            }
        ),
        // Integer types
        map(tag_no_case("SMALLINT"), |_| DataType::SmallInt),
        map(tag_no_case("BIGINT"), |_| DataType::Integer),
        map(tag_no_case("INTEGER"), |_| DataType::Integer),
        map(tag_no_case("INT"), |_| DataType::Integer),
        // Floating point
        map(tag_no_case("DOUBLE PRECISION"), |_| DataType::Real),
        map(alt((tag_no_case("REAL"), tag_no_case("FLOAT"))), |_| DataType::Real),
        // String types with length
        map(
            tuple((
                tag_no_case("VARCHAR"),
                opt(delimited(
                    ws(char('(')),
                    ws(map_res(digit1, |s: &str| s.parse::<usize>())),
                    ws(char(')')),
                )),
            )),
            |(_, len)| DataType::Varchar { max_length: len.unwrap_or(255) }
        ),
        map(
            tuple((
                tag_no_case("CHAR"),
                opt(delimited(
                    ws(char('(')),
                    ws(map_res(digit1, |s: &str| s.parse::<usize>())),
                    ws(char(')')),
                )),
            )),
            |(_, len)| DataType::Char { length: len.unwrap_or(1) }
        ),
        map(tag_no_case("TEXT"), |_| DataType::Text),
        // Boolean
        map(alt((tag_no_case("BOOLEAN"), tag_no_case("BOOL"))), |_| DataType::Boolean),
        // Date/Time types
        map(tag_no_case("TIMESTAMP"), |_| DataType::Timestamp),
        map(tag_no_case("DATE"), |_| DataType::Date),
        // Special types
        map(tag_no_case("UUID"), |_| DataType::Uuid),
    ))(input)
}

/// Parses a configured column type such as `VARCHAR(32)`.
pub fn parse_data_type(text: &str) -> Result<DataType, String> {
    match nom::combinator::all_consuming(ws(data_type))(text) {
        Ok((_, data_type)) => Ok(data_type),
        Err(e) => Err(format!("Unknown data type '{text}': {e:?}")),
    }
}
