mod common;

use common::{ints, shard};
use proptest::prelude::*;
use rust_decimal::Decimal;
use shardrustql::{parse_statement, CancellationToken, MergeEngine, QueryResult, RuleSet, SchemaMetadata, Value};

fn merge(sql: &str, results: Vec<Box<dyn QueryResult>>) -> Vec<Vec<Value>> {
    let rules = RuleSet::default();
    let metadata = SchemaMetadata::new();
    let statement = parse_statement(sql).unwrap();
    MergeEngine::new(&rules, &metadata)
        .merge_query(&statement, &[], results, &CancellationToken::new())
        .unwrap()
        .collect_rows()
        .unwrap()
        .into_iter()
        .map(|r| r.values)
        .collect()
}

/// Deals `1..=count` round-robin over `shards` sorted cursors.
fn dealt(count: i64, shards: usize) -> Vec<Box<dyn QueryResult>> {
    (0..shards)
        .map(|s| {
            let values: Vec<i64> = (1..=count).filter(|v| (*v as usize) % shards == s).collect();
            shard(&["id"], ints(&values))
        })
        .collect()
}

proptest! {
    #[test]
    fn prop_order_by_merge_is_globally_sorted(mut shards in prop::collection::vec(prop::collection::vec(-1000i64..1000, 0..20), 1..=8)) {
        for rows in &mut shards {
            rows.sort_unstable();
        }
        let mut expected: Vec<i64> = shards.iter().flatten().copied().collect();
        expected.sort_unstable();
        let results = shards.iter().map(|rows| shard(&["id"], ints(rows))).collect();
        let merged = merge("SELECT id FROM t_order ORDER BY id", results);
        prop_assert_eq!(merged, ints(&expected));
    }

    #[test]
    fn prop_descending_merge(mut shards in prop::collection::vec(prop::collection::vec(0i64..50, 0..10), 2..=8)) {
        for rows in &mut shards {
            rows.sort_unstable_by(|a, b| b.cmp(a));
        }
        let mut expected: Vec<i64> = shards.iter().flatten().copied().collect();
        expected.sort_unstable_by(|a, b| b.cmp(a));
        let results = shards.iter().map(|rows| shard(&["id"], ints(rows))).collect();
        prop_assert_eq!(merge("SELECT id FROM t_order ORDER BY id DESC", results), ints(&expected));
    }
}

#[test]
fn test_avg_is_recomputed_from_sum_and_count() {
    let columns = ["AVG(price)", "AVG_DERIVED_COUNT_0", "AVG_DERIVED_SUM_0"];
    let rows = merge(
        "SELECT AVG(price) FROM t_order",
        vec![
            shard(&columns, vec![[5, 2, 10].map(Value::Integer).to_vec()]),
            shard(&columns, vec![[100, 1, 100].map(Value::Integer).to_vec()]),
        ],
    );
    assert_eq!(rows, vec![vec![Value::Numeric(Decimal::from(110) / Decimal::from(3))]]);
}

#[test]
fn test_group_by_without_order_keeps_first_seen_groups() {
    let columns = ["status", "COUNT(*)"];
    let row = |s: &str, c: i64| vec![Value::from(s), Value::Integer(c)];
    let rows = merge(
        "SELECT status, COUNT(*) FROM t_order GROUP BY status",
        vec![shard(&columns, vec![row("a", 2), row("b", 1)]), shard(&columns, vec![row("b", 3), row("c", 1)])],
    );
    assert_eq!(rows, vec![row("a", 2), row("b", 4), row("c", 1)]);
}

#[test]
fn test_pagination_applies_logical_offset_once() {
    let rows = merge("SELECT id FROM t_order ORDER BY id LIMIT 5, 3", dealt(20, 3));
    assert_eq!(rows, ints(&[6, 7, 8]));
}

#[test]
fn test_offset_past_the_end_is_empty() {
    let rows = merge("SELECT id FROM t_order ORDER BY id LIMIT 3 OFFSET 5", dealt(4, 2));
    assert!(rows.is_empty());
}
