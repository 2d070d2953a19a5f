use crate::core::ShardingError;
use super::{
    no_target, required_i64, target_with_suffix, PreciseShardingValue, Props, RangeShardingValue, ShardByPrecise,
    ShardByRange, ShardingAlgorithm,
};

/// Half-open partition `[lower, upper)`; `None` is unbounded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Partition {
    lower: Option<i64>,
    upper: Option<i64>,
}

impl Partition {
    fn contains(&self, key: i64) -> bool {
        self.lower.is_none_or(|l| key >= l) && self.upper.is_none_or(|u| key < u)
    }
}

/// Ordered partition map shared by the range algorithms. Partition `i` lives on the
/// target whose numeric suffix is `i`.
#[derive(Debug)]
struct PartitionMap {
    partitions: Vec<Partition>,
}

impl PartitionMap {
    /// Builds `(-inf, b0), [b0, b1), ..., [bn, +inf)` from strictly ascending boundaries.
    fn from_boundaries(boundaries: &[i64]) -> Result<Self, ShardingError> {
        if boundaries.is_empty() {
            return Err(ShardingError::Config("Range sharding needs at least one boundary".to_string()));
        }
        if boundaries.windows(2).any(|w| w[0] >= w[1]) {
            return Err(ShardingError::Config("Range boundaries must be strictly ascending".to_string()));
        }
        let mut partitions = Vec::with_capacity(boundaries.len() + 1);
        partitions.push(Partition { lower: None, upper: Some(boundaries[0]) });
        for pair in boundaries.windows(2) {
            partitions.push(Partition { lower: Some(pair[0]), upper: Some(pair[1]) });
        }
        partitions.push(Partition { lower: boundaries.last().copied(), upper: None });
        Ok(Self { partitions })
    }

    fn find(&self, key: i64) -> Option<usize> {
        self.partitions.iter().position(|p| p.contains(key))
    }

    fn last_index(&self) -> usize {
        self.partitions.len() - 1
    }

    fn precise(&self, available: &[String], value: &PreciseShardingValue<'_>) -> Result<String, ShardingError> {
        let partition = value
            .value
            .as_i64()
            .and_then(|key| self.find(key))
            .ok_or_else(|| no_target(value.column, value.value, available))?;
        target_with_suffix(available, partition as i64)
            .cloned()
            .ok_or_else(|| no_target(value.column, value.value, available))
    }

    fn range(&self, available: &[String], value: &RangeShardingValue<'_>) -> Result<Vec<String>, ShardingError> {
        let first = match &value.range.lower {
            None => 0,
            Some(bound) => bound
                .value
                .as_i64()
                .and_then(|key| self.find(key))
                .ok_or_else(|| no_target(value.column, &bound.value, available))?,
        };
        let last = match &value.range.upper {
            None => self.last_index(),
            Some(bound) => {
                let key = bound
                    .value
                    .as_i64()
                    .ok_or_else(|| no_target(value.column, &bound.value, available))?;
                let index = self
                    .find(key)
                    .ok_or_else(|| no_target(value.column, &bound.value, available))?;
                // An exclusive upper bound sitting exactly on a partition start excludes that partition.
                if !bound.inclusive && index > first && self.partitions[index].lower == Some(key) {
                    index - 1
                } else {
                    index
                }
            }
        };
        if last < first {
            return Ok(Vec::new());
        }
        Ok((first..=last)
            .filter_map(|i| target_with_suffix(available, i as i64).cloned())
            .collect())
    }
}

fn parse_list(props: &Props, key: &str) -> Result<Vec<i64>, ShardingError> {
    let raw = props
        .get(key)
        .ok_or_else(|| ShardingError::Config(format!("Missing algorithm property '{key}'")))?;
    raw.split(',')
        .map(|s| {
            s.trim()
                .parse::<i64>()
                .map_err(|_| ShardingError::Config(format!("Property '{key}' must be a list of integers")))
        })
        .collect()
}

/// Partitions split at explicit boundaries (`sharding-ranges = "1,5,10"`).
#[derive(Debug)]
pub struct BoundaryRangeShardingAlgorithm {
    map: PartitionMap,
}

impl BoundaryRangeShardingAlgorithm {
    pub fn new(boundaries: &[i64]) -> Result<Self, ShardingError> {
        Ok(Self { map: PartitionMap::from_boundaries(boundaries)? })
    }

    pub fn from_props(props: &Props) -> Result<Self, ShardingError> {
        Self::new(&parse_list(props, "sharding-ranges")?)
    }
}

impl ShardByPrecise for BoundaryRangeShardingAlgorithm {
    fn do_sharding(&self, available: &[String], value: &PreciseShardingValue<'_>) -> Result<String, ShardingError> {
        self.map.precise(available, value)
    }
}

impl ShardByRange for BoundaryRangeShardingAlgorithm {
    fn do_range_sharding(&self, available: &[String], value: &RangeShardingValue<'_>) -> Result<Vec<String>, ShardingError> {
        self.map.range(available, value)
    }
}

impl ShardingAlgorithm for BoundaryRangeShardingAlgorithm {
    fn type_name(&self) -> &'static str {
        "BOUNDARY_RANGE"
    }

    fn as_range(&self) -> Option<&dyn ShardByRange> {
        Some(self)
    }
}

/// Equal-width partitions between `range-lower` and `range-upper`.
#[derive(Debug)]
pub struct VolumeRangeShardingAlgorithm {
    map: PartitionMap,
}

impl VolumeRangeShardingAlgorithm {
    pub fn new(lower: i64, upper: i64, volume: i64) -> Result<Self, ShardingError> {
        if volume <= 0 || upper <= lower {
            return Err(ShardingError::Config(
                "VOLUME_RANGE needs range-lower < range-upper and a positive sharding-volume".to_string(),
            ));
        }
        let mut boundaries = Vec::new();
        let mut current = lower;
        while current < upper {
            boundaries.push(current);
            current = current.saturating_add(volume);
        }
        boundaries.push(upper);
        Ok(Self { map: PartitionMap::from_boundaries(&boundaries)? })
    }

    pub fn from_props(props: &Props) -> Result<Self, ShardingError> {
        Self::new(
            required_i64(props, "range-lower")?,
            required_i64(props, "range-upper")?,
            required_i64(props, "sharding-volume")?,
        )
    }
}

impl ShardByPrecise for VolumeRangeShardingAlgorithm {
    fn do_sharding(&self, available: &[String], value: &PreciseShardingValue<'_>) -> Result<String, ShardingError> {
        self.map.precise(available, value)
    }
}

impl ShardByRange for VolumeRangeShardingAlgorithm {
    fn do_range_sharding(&self, available: &[String], value: &RangeShardingValue<'_>) -> Result<Vec<String>, ShardingError> {
        self.map.range(available, value)
    }
}

impl ShardingAlgorithm for VolumeRangeShardingAlgorithm {
    fn type_name(&self) -> &'static str {
        "VOLUME_RANGE"
    }

    fn as_range(&self) -> Option<&dyn ShardByRange> {
        Some(self)
    }
}
