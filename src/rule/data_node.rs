use nom::{
    branch::alt,
    bytes::complete::{is_not, tag, take_while1},
    character::complete::{char, digit1, multispace0},
    combinator::{all_consuming, map, map_res, opt},
    multi::{many1, separated_list1},
    sequence::{delimited, preceded, separated_pair},
    IResult,
};

use crate::core::ShardingError;

/// One physical table inside one data source.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DataNode {
    pub data_source: String,
    pub table: String,
}

impl DataNode {
    #[must_use]
    pub fn new(data_source: &str, table: &str) -> Self {
        Self {
            data_source: data_source.to_string(),
            table: table.to_string(),
        }
    }

    /// Parses `ds_0.t_order_0`.
    pub fn parse(text: &str) -> Result<Self, ShardingError> {
        match text.trim().split_once('.') {
            Some((ds, table)) if !ds.is_empty() && !table.is_empty() && !table.contains('.') => {
                Ok(Self::new(ds, table))
            }
            _ => Err(ShardingError::Config(format!("Invalid data node '{text}', expected <data_source>.<table>"))),
        }
    }
}

impl std::fmt::Display for DataNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.data_source, self.table)
    }
}

#[derive(Debug, Clone)]
enum Segment {
    Literal(String),
    Choices(Vec<String>),
}

fn range_choices(input: &str) -> IResult<&str, Vec<String>> {
    map_res(
        separated_pair(
            delimited(multispace0, digit1, multispace0),
            tag(".."),
            delimited(multispace0, digit1, multispace0),
        ),
        |(lo, hi): (&str, &str)| -> Result<Vec<String>, std::num::ParseIntError> {
            let (lo, hi) = (lo.parse::<u64>()?, hi.parse::<u64>()?);
            Ok((lo..=hi).map(|i| i.to_string()).collect())
        },
    )(input)
}

fn list_item(input: &str) -> IResult<&str, String> {
    delimited(
        multispace0,
        alt((
            map(delimited(char('\''), opt(is_not("'")), char('\'')), |s: Option<&str>| {
                s.unwrap_or_default().to_string()
            }),
            map(take_while1(|c: char| c.is_alphanumeric() || c == '_'), |s: &str| s.to_string()),
        )),
        multispace0,
    )(input)
}

fn list_choices(input: &str) -> IResult<&str, Vec<String>> {
    delimited(char('['), separated_list1(char(','), list_item), char(']'))(input)
}

fn placeholder(input: &str) -> IResult<&str, Segment> {
    map(
        delimited(
            tag("${"),
            delimited(multispace0, alt((range_choices, list_choices)), multispace0),
            char('}'),
        ),
        Segment::Choices,
    )(input)
}

fn literal(input: &str) -> IResult<&str, Segment> {
    map(is_not("$"), |s: &str| Segment::Literal(s.to_string()))(input)
}

fn expression(input: &str) -> IResult<&str, Vec<Segment>> {
    all_consuming(preceded(multispace0, many1(alt((placeholder, literal)))))(input)
}

/// Splits on commas that are not inside `${...}`.
fn split_top_level(expr: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;
    for (i, c) in expr.char_indices() {
        match c {
            '{' => depth += 1,
            '}' => depth = depth.saturating_sub(1),
            ',' if depth == 0 => {
                parts.push(&expr[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    parts.push(&expr[start..]);
    parts
}

/// Expands an inline expression such as `ds_${0..1}.t_order_${0..1}` into the
/// cartesian product of its placeholders, left to right.
pub fn expand_inline(expr: &str) -> Result<Vec<String>, ShardingError> {
    let mut result = Vec::new();
    for part in split_top_level(expr) {
        let part = part.trim();
        if part.is_empty() {
            continue;
        }
        let (_, segments) = expression(part)
            .map_err(|e| ShardingError::Config(format!("Invalid inline expression '{part}': {e:?}")))?;
        let mut expanded = vec![String::new()];
        for segment in segments {
            expanded = match segment {
                Segment::Literal(text) => expanded.into_iter().map(|s| s + &text).collect(),
                Segment::Choices(choices) => expanded
                    .iter()
                    .flat_map(|prefix| choices.iter().map(move |c| format!("{prefix}{c}")))
                    .collect(),
            };
        }
        result.extend(expanded.into_iter().map(|s| s.trim().to_string()));
    }
    Ok(result)
}

/// Expands and parses the actual data nodes of a table rule.
pub fn parse_data_nodes(expr: &str) -> Result<Vec<DataNode>, ShardingError> {
    let nodes = expand_inline(expr)?
        .iter()
        .map(|s| DataNode::parse(s))
        .collect::<Result<Vec<_>, _>>()?;
    if nodes.is_empty() {
        return Err(ShardingError::Config(format!("No data nodes in '{expr}'")));
    }
    Ok(nodes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expand_range_cartesian() {
        let nodes = parse_data_nodes("ds_${0..1}.t_order_${0..1}").unwrap();
        let names: Vec<String> = nodes.iter().map(ToString::to_string).collect();
        assert_eq!(names, vec!["ds_0.t_order_0", "ds_0.t_order_1", "ds_1.t_order_0", "ds_1.t_order_1"]);
    }

    #[test]
    fn test_expand_list_and_commas() {
        let names = expand_inline("ds_${['a','b']}.t_x, ds_c.t_x").unwrap();
        assert_eq!(names, vec!["ds_a.t_x", "ds_b.t_x", "ds_c.t_x"]);
    }

    #[test]
    fn test_plain_node() {
        assert_eq!(DataNode::parse("ds.t_config").unwrap(), DataNode::new("ds", "t_config"));
        assert!(DataNode::parse("no_dot").is_err());
        assert!(parse_data_nodes("ds_${0..").is_err());
    }
}
