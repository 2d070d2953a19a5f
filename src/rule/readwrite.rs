use std::collections::HashMap;
use std::fmt::Debug;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::core::ShardingError;
use super::algorithm::Props;

/// Picks one replica for a read.
pub trait LoadBalancer: Send + Sync + Debug {
    fn select_replica<'a>(&self, group: &str, replicas: &'a [String]) -> Option<&'a String>;

    fn type_name(&self) -> &'static str;
}

/// Rotates through replicas per group using an atomic counter.
#[derive(Debug, Default)]
pub struct RoundRobinLoadBalancer {
    counters: Mutex<HashMap<String, Arc<AtomicUsize>>>,
}

impl RoundRobinLoadBalancer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl LoadBalancer for RoundRobinLoadBalancer {
    fn select_replica<'a>(&self, group: &str, replicas: &'a [String]) -> Option<&'a String> {
        if replicas.len() <= 1 {
            return replicas.first();
        }
        let counter = Arc::clone(self.counters.lock().entry(group.to_string()).or_default());
        let idx = counter.fetch_add(1, Ordering::Relaxed) % replicas.len();
        replicas.get(idx)
    }

    fn type_name(&self) -> &'static str {
        "ROUND_ROBIN"
    }
}

/// Smooth weighted round-robin: every pick adds each replica's weight to its
/// current score, takes the highest and subtracts the total from it.
#[derive(Debug)]
pub struct WeightLoadBalancer {
    weights: HashMap<String, i64>,
    current: Mutex<HashMap<String, HashMap<String, i64>>>,
}

impl WeightLoadBalancer {
    pub fn from_props(props: &Props) -> Result<Self, ShardingError> {
        let mut weights = HashMap::new();
        for (replica, weight) in props {
            let weight: i64 = weight
                .trim()
                .parse()
                .map_err(|_| ShardingError::Config(format!("Weight of replica '{replica}' must be an integer")))?;
            if weight < 0 {
                return Err(ShardingError::Config(format!("Weight of replica '{replica}' must not be negative")));
            }
            weights.insert(replica.clone(), weight);
        }
        Ok(Self { weights, current: Mutex::new(HashMap::new()) })
    }

    fn weight_of(&self, replica: &str) -> i64 {
        self.weights.get(replica).copied().unwrap_or(1)
    }
}

impl LoadBalancer for WeightLoadBalancer {
    fn select_replica<'a>(&self, group: &str, replicas: &'a [String]) -> Option<&'a String> {
        let total: i64 = replicas.iter().map(|r| self.weight_of(r)).sum();
        if total <= 0 {
            return replicas.first();
        }
        let mut current = self.current.lock();
        let scores = current.entry(group.to_string()).or_default();
        let mut best: Option<(&'a String, i64)> = None;
        for replica in replicas {
            let score = scores.entry(replica.clone()).or_insert(0);
            *score += self.weight_of(replica);
            if best.is_none_or(|(_, s)| *score > s) {
                best = Some((replica, *score));
            }
        }
        let (chosen, _) = best?;
        if let Some(score) = scores.get_mut(chosen) {
            *score -= total;
        }
        Some(chosen)
    }

    fn type_name(&self) -> &'static str {
        "WEIGHT"
    }
}

/// A logical data source backed by one primary and its replicas.
#[derive(Debug, Clone)]
pub struct ReadwriteSplittingGroup {
    pub name: String,
    pub primary: String,
    pub replicas: Vec<String>,
    pub load_balancer: Arc<dyn LoadBalancer>,
}

impl ReadwriteSplittingGroup {
    /// Writes go to the primary, reads to a balanced replica (primary if none).
    #[must_use]
    pub fn route(&self, is_write: bool) -> &str {
        if is_write {
            return &self.primary;
        }
        self.load_balancer
            .select_replica(&self.name, &self.replicas)
            .map_or(self.primary.as_str(), String::as_str)
    }
}

#[derive(Debug, Clone, Default)]
pub struct ReadwriteSplittingRule {
    groups: HashMap<String, ReadwriteSplittingGroup>,
}

impl ReadwriteSplittingRule {
    pub fn add_group(&mut self, group: ReadwriteSplittingGroup) {
        self.groups.insert(group.name.clone(), group);
    }

    #[must_use]
    pub fn group(&self, name: &str) -> Option<&ReadwriteSplittingGroup> {
        self.groups.get(name)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    pub fn groups(&self) -> impl Iterator<Item = &ReadwriteSplittingGroup> {
        self.groups.values()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn replicas() -> Vec<String> {
        vec!["read_0".to_string(), "read_1".to_string()]
    }

    #[test]
    fn test_round_robin_rotates() {
        let balancer = RoundRobinLoadBalancer::new();
        let replicas = replicas();
        let picks: Vec<&String> = (0..4).filter_map(|_| balancer.select_replica("ds", &replicas)).collect();
        assert_eq!(picks, vec!["read_0", "read_1", "read_0", "read_1"]);
    }

    #[test]
    fn test_weight_is_smooth() {
        let props: Props = [("read_0".to_string(), "2".to_string()), ("read_1".to_string(), "1".to_string())]
            .into_iter()
            .collect();
        let balancer = WeightLoadBalancer::from_props(&props).unwrap();
        let replicas = replicas();
        let picks: Vec<&String> = (0..3).filter_map(|_| balancer.select_replica("ds", &replicas)).collect();
        assert_eq!(picks, vec!["read_0", "read_1", "read_0"]);
    }

    #[test]
    fn test_group_routes_writes_to_primary() {
        let group = ReadwriteSplittingGroup {
            name: "ds".to_string(),
            primary: "write_ds".to_string(),
            replicas: Vec::new(),
            load_balancer: Arc::new(RoundRobinLoadBalancer::new()),
        };
        assert_eq!(group.route(true), "write_ds");
        assert_eq!(group.route(false), "write_ds");
    }
}
