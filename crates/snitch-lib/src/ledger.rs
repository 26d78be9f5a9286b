//! Per-cluster resource ledger
//!
//! Maps each metric category to a count per EC2 instance type. A ledger is
//! built by one cluster's measurement task, turned into metric points once,
//! and dropped.

use crate::models::{dimensions, Dimension, Footprint, MetricName, MetricPoint, MetricUnit};
use chrono::Utc;
use std::collections::BTreeMap;

/// Counts keyed by instance type
pub type InstanceCounts = BTreeMap<String, u64>;

#[derive(Debug, Clone)]
pub struct ClusterResources {
    cluster: String,
    footprint_cpu: InstanceCounts,
    footprint_memory: InstanceCounts,
    registered: InstanceCounts,
    remaining: InstanceCounts,
}

impl ClusterResources {
    pub fn new(cluster: impl Into<String>) -> Self {
        Self {
            cluster: cluster.into(),
            footprint_cpu: InstanceCounts::new(),
            footprint_memory: InstanceCounts::new(),
            registered: InstanceCounts::new(),
            remaining: InstanceCounts::new(),
        }
    }

    pub fn cluster(&self) -> &str {
        &self.cluster
    }

    /// Record one container instance's contribution
    ///
    /// The footprint is the same for every instance of a cluster, so it
    /// overwrites. Registered and remaining counts add up across instances
    /// of the same type.
    pub fn record(
        &mut self,
        instance_type: &str,
        footprint: Footprint,
        registered_count: u64,
        remaining_count: u64,
    ) {
        self.footprint_cpu
            .insert(instance_type.to_string(), footprint.cpu);
        self.footprint_memory
            .insert(instance_type.to_string(), footprint.memory);
        *self
            .registered
            .entry(instance_type.to_string())
            .or_default() += registered_count;
        *self
            .remaining
            .entry(instance_type.to_string())
            .or_default() += remaining_count;
    }

    /// Counts for one metric category
    pub fn counts(&self, metric: MetricName) -> &InstanceCounts {
        match metric {
            MetricName::FootprintCpu => &self.footprint_cpu,
            MetricName::FootprintMemory => &self.footprint_memory,
            MetricName::RegisteredCapacity => &self.registered,
            MetricName::RemainingCapacity => &self.remaining,
        }
    }

    pub fn get(&self, metric: MetricName, instance_type: &str) -> Option<u64> {
        self.counts(metric).get(instance_type).copied()
    }

    /// Instance types seen so far
    pub fn instance_types(&self) -> impl Iterator<Item = &str> {
        self.registered.keys().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.registered.is_empty()
    }

    /// One point per category and instance type, all stamped with the call time
    pub fn to_metric_points(&self) -> Vec<MetricPoint> {
        let timestamp = Utc::now();
        let mut points = Vec::with_capacity(MetricName::ALL.len() * self.registered.len());

        for metric in MetricName::ALL {
            for (instance_type, value) in self.counts(metric) {
                points.push(MetricPoint {
                    name: metric,
                    dimensions: vec![
                        Dimension::new(dimensions::CLUSTER_NAME, &self.cluster),
                        Dimension::new(dimensions::INSTANCE_TYPE, instance_type),
                    ],
                    value: *value,
                    unit: MetricUnit::Count,
                    timestamp,
                });
            }
        }

        points
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_to_metric_points_single_type() {
        let before = Utc::now();
        let mut ledger = ClusterResources::new("my-shiny-cluster");
        ledger.record("m5.large", Footprint::new(1024, 2048), 13, 3);

        let points = ledger.to_metric_points();
        assert_eq!(points.len(), 4);

        for point in &points {
            assert_eq!(point.dimensions.len(), 2);
            assert_eq!(point.cluster(), Some("my-shiny-cluster"));
            assert_eq!(point.instance_type(), Some("m5.large"));
            assert_eq!(point.unit, MetricUnit::Count);
            assert!(point.timestamp >= before);

            let expected = match point.name {
                MetricName::FootprintCpu => 1024,
                MetricName::FootprintMemory => 2048,
                MetricName::RegisteredCapacity => 13,
                MetricName::RemainingCapacity => 3,
            };
            assert_eq!(point.value, expected, "unexpected value for {}", point.name);
        }
    }

    #[test]
    fn test_instance_types_accumulate_independently() {
        let mut ledger = ClusterResources::new("ecs-self-publishing-cluster");
        ledger.record("fake.instanceType", Footprint::new(512, 1024), 5, 1);
        ledger.record("another.fakeInstanceType", Footprint::new(512, 1024), 10, 2);

        let points = ledger.to_metric_points();
        assert_eq!(points.len(), 8);

        let registered: Vec<_> = points
            .iter()
            .filter(|p| p.name == MetricName::RegisteredCapacity)
            .map(|p| (p.instance_type().unwrap().to_string(), p.value))
            .collect();
        assert_eq!(registered.len(), 2);
        assert!(registered.contains(&("fake.instanceType".to_string(), 5)));
        assert!(registered.contains(&("another.fakeInstanceType".to_string(), 10)));
    }

    #[test]
    fn test_record_overwrites_footprint_and_adds_counts() {
        let mut ledger = ClusterResources::new("c");
        ledger.record("c5.xlarge", Footprint::new(1024, 2048), 3, 2);
        ledger.record("c5.xlarge", Footprint::new(2048, 4096), 4, 0);

        assert_eq!(ledger.get(MetricName::FootprintCpu, "c5.xlarge"), Some(2048));
        assert_eq!(ledger.get(MetricName::FootprintMemory, "c5.xlarge"), Some(4096));
        assert_eq!(ledger.get(MetricName::RegisteredCapacity, "c5.xlarge"), Some(7));
        assert_eq!(ledger.get(MetricName::RemainingCapacity, "c5.xlarge"), Some(2));
        assert_eq!(ledger.instance_types().collect::<Vec<_>>(), vec!["c5.xlarge"]);
    }

    #[test]
    fn test_every_type_present_in_all_categories() {
        let mut ledger = ClusterResources::new("c");
        ledger.record("t3.micro", Footprint::new(256, 512), 0, 0);

        for metric in MetricName::ALL {
            assert_eq!(ledger.counts(metric).len(), 1, "{metric} missing t3.micro");
        }
    }

    #[test]
    fn test_empty_ledger_has_no_points() {
        let ledger = ClusterResources::new("empty");
        assert!(ledger.is_empty());
        assert!(ledger.to_metric_points().is_empty());
    }
}
