// Sharding condition extraction from bound statements
mod extractor;
mod generated_key;

pub use extractor::ConditionExtractor;
pub use generated_key::GeneratedKey;

use std::cmp::Ordering;

use crate::core::Value;
use crate::rule::{Bound, ShardingRange};

/// Value(s) a sharding column is constrained to.
#[derive(Debug, Clone, PartialEq)]
pub enum ConditionValue {
    Precise(Value),
    ListOf(Vec<Value>),
    Range(ShardingRange),
}

fn tighter_lower(a: Option<Bound>, b: Option<Bound>) -> Option<Bound> {
    match (a, b) {
        (None, x) | (x, None) => x,
        (Some(a), Some(b)) => Some(match a.value.compare(&b.value) {
            Ordering::Greater => a,
            Ordering::Less => b,
            Ordering::Equal => Bound { value: a.value, inclusive: a.inclusive && b.inclusive },
        }),
    }
}

fn tighter_upper(a: Option<Bound>, b: Option<Bound>) -> Option<Bound> {
    match (a, b) {
        (None, x) | (x, None) => x,
        (Some(a), Some(b)) => Some(match a.value.compare(&b.value) {
            Ordering::Less => a,
            Ordering::Greater => b,
            Ordering::Equal => Bound { value: a.value, inclusive: a.inclusive && b.inclusive },
        }),
    }
}

fn range_is_empty(range: &ShardingRange) -> bool {
    match (&range.lower, &range.upper) {
        (Some(lower), Some(upper)) => match lower.value.compare(&upper.value) {
            Ordering::Greater => true,
            Ordering::Equal => !(lower.inclusive && upper.inclusive),
            Ordering::Less => false,
        },
        _ => false,
    }
}

fn from_list(mut values: Vec<Value>) -> Option<ConditionValue> {
    match values.len() {
        0 => None,
        1 => values.pop().map(ConditionValue::Precise),
        _ => Some(ConditionValue::ListOf(values)),
    }
}

impl ConditionValue {
    /// Both constraints at once; `None` when no value can satisfy them.
    #[must_use]
    pub fn intersect(self, other: Self) -> Option<Self> {
        use ConditionValue::{ListOf, Precise, Range};
        match (self, other) {
            (Precise(a), Precise(b)) => (a.compare(&b) == Ordering::Equal).then_some(Precise(a)),
            (Precise(a), ListOf(list)) | (ListOf(list), Precise(a)) => {
                list.iter().any(|v| v.compare(&a) == Ordering::Equal).then_some(Precise(a))
            }
            (Precise(a), Range(r)) | (Range(r), Precise(a)) => r.contains(&a).then_some(Precise(a)),
            (ListOf(a), ListOf(b)) => {
                from_list(a.into_iter().filter(|v| b.iter().any(|w| w.compare(v) == Ordering::Equal)).collect())
            }
            (ListOf(list), Range(r)) | (Range(r), ListOf(list)) => {
                from_list(list.into_iter().filter(|v| r.contains(v)).collect())
            }
            (Range(a), Range(b)) => {
                let range = ShardingRange {
                    lower: tighter_lower(a.lower, b.lower),
                    upper: tighter_upper(a.upper, b.upper),
                };
                (!range_is_empty(&range)).then_some(Range(range))
            }
        }
    }
}

/// One (table, column) constraint used for shard placement.
#[derive(Debug, Clone, PartialEq)]
pub struct ShardingCondition {
    pub table: String,
    pub column: String,
    pub value: ConditionValue,
}

/// Extraction result for one statement.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ShardingConditions {
    /// WHERE constraints, one per (table, column).
    pub conditions: Vec<ShardingCondition>,
    /// The AND chain can never hold; route to a single node.
    pub always_false: bool,
    /// INSERT constraints per values row.
    pub insert_rows: Vec<Vec<ShardingCondition>>,
}

impl ShardingConditions {
    #[must_use]
    pub fn is_insert(&self) -> bool {
        !self.insert_rows.is_empty()
    }

    /// Constraint on `table.column` within `conditions`.
    #[must_use]
    pub fn find<'a>(conditions: &'a [ShardingCondition], table: &str, column: &str) -> Option<&'a ConditionValue> {
        conditions
            .iter()
            .find(|c| c.table.eq_ignore_ascii_case(table) && c.column.eq_ignore_ascii_case(column))
            .map(|c| &c.value)
    }

    /// Adds a constraint, intersecting with any existing one on the same column.
    pub fn add(&mut self, condition: ShardingCondition) {
        let existing = self
            .conditions
            .iter()
            .position(|c| c.table == condition.table && c.column.eq_ignore_ascii_case(&condition.column));
        match existing {
            None => self.conditions.push(condition),
            Some(i) => {
                let previous = self.conditions.remove(i);
                match previous.value.intersect(condition.value) {
                    Some(value) => self.conditions.insert(i, ShardingCondition { value, ..previous }),
                    None => self.always_false = true,
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bound(v: i64, inclusive: bool) -> Option<Bound> {
        Some(Bound { value: Value::Integer(v), inclusive })
    }

    fn list(values: &[i64]) -> ConditionValue {
        ConditionValue::ListOf(values.iter().map(|v| Value::Integer(*v)).collect())
    }

    #[test]
    fn test_precise_and_list() {
        let precise = ConditionValue::Precise(Value::Integer(3));
        assert_eq!(precise.clone().intersect(list(&[1, 3])), Some(precise.clone()));
        assert_eq!(precise.intersect(list(&[1, 2])), None);
        assert_eq!(list(&[1, 2, 3]).intersect(list(&[3, 4])), Some(ConditionValue::Precise(Value::Integer(3))));
    }

    #[test]
    fn test_ranges_narrow() {
        let a = ConditionValue::Range(ShardingRange { lower: bound(1, true), upper: None });
        let b = ConditionValue::Range(ShardingRange { lower: bound(5, false), upper: bound(10, true) });
        assert_eq!(
            a.intersect(b),
            Some(ConditionValue::Range(ShardingRange { lower: bound(5, false), upper: bound(10, true) }))
        );
        let c = ConditionValue::Range(ShardingRange { lower: bound(5, true), upper: None });
        let d = ConditionValue::Range(ShardingRange { lower: None, upper: bound(5, false) });
        assert_eq!(c.intersect(d), None);
    }

    #[test]
    fn test_conflicting_conditions_mark_always_false() {
        let mut conditions = ShardingConditions::default();
        for v in [1, 2] {
            conditions.add(ShardingCondition {
                table: "t_order".to_string(),
                column: "user_id".to_string(),
                value: ConditionValue::Precise(Value::Integer(v)),
            });
        }
        assert!(conditions.always_false);
    }
}
