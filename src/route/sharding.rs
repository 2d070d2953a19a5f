use std::collections::HashSet;

use super::{RouteMapper, RouteUnit};
use crate::condition::{ConditionValue, ShardingCondition, ShardingConditions};
use crate::core::{ShardingError, Value};
use crate::rule::algorithm::{PreciseShardingValue, RangeShardingValue, ShardingAlgorithm};
use crate::rule::{DataNode, ShardingRule, ShardingStrategy, TableRule};

/// Tables routed together: the first is the primary, the rest are bound to it.
pub(super) type Cluster = Vec<String>;

/// Data source plus table mappers produced for one cluster.
type Placement = (String, Vec<RouteMapper>);

pub(super) struct ShardingRouter<'a> {
    rule: &'a ShardingRule,
    max_route_units: usize,
}

/// Constraint for `column` on the primary table, else on a bound table.
fn find_condition<'c>(conditions: &'c [ShardingCondition], cluster: &[String], column: &str) -> Option<&'c ConditionValue> {
    cluster
        .iter()
        .find_map(|table| ShardingConditions::find(conditions, table, column))
}

/// Targets of one dimension, plus the list values (by position) that did or
/// did not find a target in it.
#[derive(Default)]
struct DimensionRoute {
    targets: Vec<String>,
    landed: Vec<usize>,
    misses: Vec<(usize, ShardingError)>,
}

impl DimensionRoute {
    fn all(targets: Vec<String>) -> Self {
        Self { targets, ..Self::default() }
    }
}

fn keep_available(available: &[String], targets: &[String]) -> Vec<String> {
    available.iter().filter(|t| targets.contains(t)).cloned().collect()
}

impl<'a> ShardingRouter<'a> {
    pub fn new(rule: &'a ShardingRule, max_route_units: usize) -> Self {
        Self { rule, max_route_units }
    }

    /// Targets of one sharding dimension (data sources or tables).
    fn route_dimension(
        strategy: Option<&ShardingStrategy>,
        logic_table: &str,
        available: Vec<String>,
        value: Option<&ConditionValue>,
    ) -> Result<DimensionRoute, ShardingError> {
        let (Some(strategy), Some(value)) = (strategy, value) else {
            return Ok(DimensionRoute::all(available));
        };
        let algorithm = strategy.algorithm.as_ref();
        let mut route = match value {
            ConditionValue::Precise(v) => {
                let precise = PreciseShardingValue { logic_table, column: &strategy.column, value: v };
                DimensionRoute::all(vec![algorithm.do_sharding(&available, &precise)?])
            }
            ConditionValue::ListOf(values) => match algorithm.as_list() {
                Some(list) => DimensionRoute::all(list.do_list_sharding(&available, &strategy.column, values)?),
                None => Self::route_list(algorithm, logic_table, &strategy.column, &available, values)?,
            },
            ConditionValue::Range(range) => match algorithm.as_range() {
                Some(ranged) => DimensionRoute::all(ranged.do_range_sharding(&available, &RangeShardingValue {
                    logic_table,
                    column: &strategy.column,
                    range,
                })?),
                None => return Ok(DimensionRoute::all(available)),
            },
        };
        if let Some(unknown) = route.targets.iter().find(|t| !available.contains(t)) {
            return Err(ShardingError::Route(format!(
                "Algorithm '{}' returned unknown target '{unknown}' for '{logic_table}'",
                strategy.algorithm_name
            )));
        }
        route.targets = keep_available(&available, &route.targets);
        Ok(route)
    }

    /// Precise sharding per list value. Values without a target among
    /// `available` are reported as misses instead of failing the list.
    fn route_list(
        algorithm: &dyn ShardingAlgorithm,
        logic_table: &str,
        column: &str,
        available: &[String],
        values: &[Value],
    ) -> Result<DimensionRoute, ShardingError> {
        let mut route = DimensionRoute::default();
        for (position, value) in values.iter().enumerate() {
            match algorithm.do_sharding(available, &PreciseShardingValue { logic_table, column, value }) {
                Ok(target) => {
                    route.landed.push(position);
                    if !route.targets.contains(&target) {
                        route.targets.push(target);
                    }
                }
                Err(err @ ShardingError::NoRouteTarget { .. }) => route.misses.push((position, err)),
                Err(err) => return Err(err),
            }
        }
        Ok(route)
    }

    /// Data nodes of the cluster's primary table that satisfy the conditions.
    ///
    /// A list value may miss the tables of one data source as long as it lands
    /// in another one; a value that lands nowhere is a routing error.
    fn route_nodes(
        &self,
        table_rule: &TableRule,
        cluster: &[String],
        conditions: &[ShardingCondition],
    ) -> Result<Vec<DataNode>, ShardingError> {
        let logic_table = table_rule.logic_table.as_str();
        let database_strategy = self.rule.database_strategy(table_rule);
        let table_strategy = self.rule.table_strategy(table_rule);

        let data_sources = Self::route_dimension(
            database_strategy,
            logic_table,
            table_rule.actual_data_sources(),
            database_strategy.and_then(|s| find_condition(conditions, cluster, &s.column)),
        )?;
        if let Some((_, err)) = data_sources.misses.into_iter().next() {
            return Err(err);
        }
        let mut nodes = Vec::new();
        let mut landed: HashSet<usize> = HashSet::new();
        let mut misses: Vec<(usize, ShardingError)> = Vec::new();
        for data_source in data_sources.targets {
            let tables = Self::route_dimension(
                table_strategy,
                logic_table,
                table_rule.actual_tables_in(&data_source),
                table_strategy.and_then(|s| find_condition(conditions, cluster, &s.column)),
            )?;
            landed.extend(tables.landed);
            misses.extend(tables.misses);
            nodes.extend(
                tables
                    .targets
                    .into_iter()
                    .filter(|t| table_rule.contains_node(&data_source, t))
                    .map(|t| DataNode::new(&data_source, &t)),
            );
        }
        if let Some((_, err)) = misses.into_iter().find(|(position, _)| !landed.contains(position)) {
            return Err(err);
        }
        Ok(nodes)
    }

    fn place_cluster(
        &self,
        cluster: &[String],
        conditions: &[ShardingCondition],
        always_false: bool,
    ) -> Result<Vec<Placement>, ShardingError> {
        let primary = cluster
            .first()
            .ok_or_else(|| ShardingError::Route("empty table cluster".to_string()))?;
        let table_rule = self.rule.require_table_rule(primary)?;
        let nodes = if always_false {
            table_rule.actual_data_nodes.iter().take(1).cloned().collect()
        } else {
            self.route_nodes(table_rule, cluster, conditions)?
        };
        nodes
            .into_iter()
            .map(|node| {
                let mut mappers = vec![RouteMapper::new(primary, &node.table)];
                for bound in &cluster[1..] {
                    let actual = self.rule.binding_actual_table(&node.data_source, primary, &node.table, bound)?;
                    mappers.push(RouteMapper::new(bound, &actual));
                }
                Ok((node.data_source, mappers))
            })
            .collect()
    }

    /// Standard or binding routing for one cluster, complex (cartesian)
    /// routing across several.
    pub fn route_clusters(&self, clusters: &[Cluster], conditions: &ShardingConditions) -> Result<Vec<RouteUnit>, ShardingError> {
        let placements = clusters
            .iter()
            .map(|c| self.place_cluster(c, &conditions.conditions, conditions.always_false))
            .collect::<Result<Vec<_>, _>>()?;
        if let [single] = placements.as_slice() {
            return Ok(single.iter().map(|(ds, mappers)| RouteUnit::new(ds, mappers.clone())).collect());
        }
        self.cartesian(&placements)
    }

    fn cartesian(&self, placements: &[Vec<Placement>]) -> Result<Vec<RouteUnit>, ShardingError> {
        let mut data_sources: Vec<&str> = Vec::new();
        for (ds, _) in placements.iter().flatten() {
            if !data_sources.contains(&ds.as_str()) {
                data_sources.push(ds);
            }
        }

        let mut per_source = Vec::new();
        let mut total = 0usize;
        for ds in data_sources {
            let lists: Vec<Vec<&Vec<RouteMapper>>> = placements
                .iter()
                .map(|p| p.iter().filter(|(d, _)| d == ds).map(|(_, m)| m).collect())
                .collect();
            if lists.iter().any(Vec::is_empty) {
                continue;
            }
            let count = lists.iter().map(Vec::len).fold(1usize, usize::saturating_mul);
            total = total.saturating_add(count);
            if total > self.max_route_units {
                return Err(ShardingError::RouteUnitLimitExceeded { units: total, limit: self.max_route_units });
            }
            per_source.push((ds, lists));
        }

        let mut units = Vec::with_capacity(total);
        for (ds, lists) in per_source {
            let mut combos: Vec<Vec<RouteMapper>> = vec![Vec::new()];
            for list in lists {
                combos = combos
                    .iter()
                    .flat_map(|prefix| {
                        list.iter().map(move |mappers| {
                            let mut combo = prefix.clone();
                            combo.extend(mappers.iter().cloned());
                            combo
                        })
                    })
                    .collect();
            }
            units.extend(combos.into_iter().map(|mappers| RouteUnit::new(ds, mappers)));
        }
        if units.is_empty() {
            return Err(ShardingError::Route("Joined sharding tables share no data source".to_string()));
        }
        Ok(units)
    }

    /// Routes every INSERT row to exactly one data node; returns the units and
    /// the unit index of each row.
    pub fn route_insert(
        &self,
        logic_table: &str,
        rows: &[Vec<ShardingCondition>],
    ) -> Result<(Vec<RouteUnit>, Vec<usize>), ShardingError> {
        let table_rule = self.rule.require_table_rule(logic_table)?;
        let cluster = vec![table_rule.logic_table.clone()];
        let mut units: Vec<RouteUnit> = Vec::new();
        let mut row_units = Vec::with_capacity(rows.len());
        for (row, conditions) in rows.iter().enumerate() {
            let nodes = self.route_nodes(table_rule, &cluster, conditions)?;
            let [node] = nodes.as_slice() else {
                return Err(ShardingError::Route(format!(
                    "INSERT row {} of '{logic_table}' routes to {} data nodes, expected exactly one",
                    row + 1,
                    nodes.len()
                )));
            };
            let position = units.iter().position(|u| {
                u.data_source.logic_name == node.data_source && u.actual_table(logic_table) == Some(node.table.as_str())
            });
            let index = match position {
                Some(index) => index,
                None => {
                    units.push(RouteUnit::new(&node.data_source, vec![RouteMapper::new(logic_table, &node.table)]));
                    units.len() - 1
                }
            };
            row_units.push(index);
        }
        Ok((units, row_units))
    }
}
