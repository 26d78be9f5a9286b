//! Core data models for ECS capacity reporting

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// ECS attribute carrying the EC2 instance type of a container instance
pub const INSTANCE_TYPE_ATTRIBUTE: &str = "ecs.instance-type";

/// Resource names ECS reports for container instances
pub mod resources {
    pub const CPU: &str = "CPU";
    pub const MEMORY: &str = "MEMORY";
}

/// Dimension names attached to every metric point
pub mod dimensions {
    pub const CLUSTER_NAME: &str = "ClusterName";
    pub const INSTANCE_TYPE: &str = "InstanceType";
}

/// CPU and memory reservation of one task, as ECS reports them
///
/// ECS hands both values back as decimal strings; they are parsed during
/// measurement, not here.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskSize {
    pub task_arn: Option<String>,
    pub cpu: Option<String>,
    pub memory: Option<String>,
}

impl TaskSize {
    pub fn new(cpu: impl Into<String>, memory: impl Into<String>) -> Self {
        Self {
            task_arn: None,
            cpu: Some(cpu.into()),
            memory: Some(memory.into()),
        }
    }
}

/// Key/value attribute of a container instance
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceAttribute {
    pub name: String,
    pub value: Option<String>,
}

/// One named entry of a container instance's resource vector
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceValue {
    pub name: String,
    pub integer_value: i64,
}

impl ResourceValue {
    pub fn new(name: impl Into<String>, integer_value: i64) -> Self {
        Self {
            name: name.into(),
            integer_value,
        }
    }
}

/// Container instance description
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerInstance {
    pub arn: Option<String>,
    pub attributes: Vec<InstanceAttribute>,
    /// Total capacity registered with the cluster
    pub registered_resources: Vec<ResourceValue>,
    /// Capacity not yet reserved by running tasks
    pub remaining_resources: Vec<ResourceValue>,
}

impl ContainerInstance {
    /// EC2 instance type from the `ecs.instance-type` attribute, or "" when absent
    pub fn instance_type(&self) -> &str {
        self.attributes
            .iter()
            .find(|attr| attr.name == INSTANCE_TYPE_ATTRIBUTE)
            .and_then(|attr| attr.value.as_deref())
            .unwrap_or("")
    }
}

/// Largest CPU units and memory (MiB) observed among a cluster's tasks
///
/// The two maxima are tracked independently, so the footprint may be larger
/// than any single task.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Footprint {
    pub cpu: u64,
    pub memory: u64,
}

impl Footprint {
    pub fn new(cpu: u64, memory: u64) -> Self {
        Self { cpu, memory }
    }

    /// Fold another observation into the running per-field maxima
    pub fn observe(&mut self, cpu: u64, memory: u64) {
        self.cpu = self.cpu.max(cpu);
        self.memory = self.memory.max(memory);
    }

    pub fn merge(&mut self, other: Footprint) {
        self.observe(other.cpu, other.memory);
    }

    /// A footprint with either side at zero can't be used for capacity math
    pub fn is_usable(&self) -> bool {
        self.cpu > 0 && self.memory > 0
    }
}

impl fmt::Display for Footprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} CPU units, {} MiB", self.cpu, self.memory)
    }
}

/// The four metric categories reported per cluster and instance type
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum MetricName {
    #[serde(rename = "LowestCommonMultipleCPU")]
    FootprintCpu,
    #[serde(rename = "LowestCommonMultipleMemory")]
    FootprintMemory,
    #[serde(rename = "RegisteredSchedulable")]
    RegisteredCapacity,
    #[serde(rename = "RemainingSchedulable")]
    RemainingCapacity,
}

impl MetricName {
    pub const ALL: [MetricName; 4] = [
        MetricName::FootprintCpu,
        MetricName::FootprintMemory,
        MetricName::RegisteredCapacity,
        MetricName::RemainingCapacity,
    ];

    /// Name used on the wire
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricName::FootprintCpu => "LowestCommonMultipleCPU",
            MetricName::FootprintMemory => "LowestCommonMultipleMemory",
            MetricName::RegisteredCapacity => "RegisteredSchedulable",
            MetricName::RemainingCapacity => "RemainingSchedulable",
        }
    }
}

impl fmt::Display for MetricName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Unit attached to metric points
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum MetricUnit {
    #[default]
    Count,
}

impl MetricUnit {
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricUnit::Count => "Count",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dimension {
    pub name: String,
    pub value: String,
}

impl Dimension {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// One timestamped, dimensioned observation for the metrics backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricPoint {
    pub name: MetricName,
    pub dimensions: Vec<Dimension>,
    pub value: u64,
    pub unit: MetricUnit,
    pub timestamp: DateTime<Utc>,
}

impl MetricPoint {
    /// Value of the named dimension, if present
    pub fn dimension(&self, name: &str) -> Option<&str> {
        self.dimensions
            .iter()
            .find(|d| d.name == name)
            .map(|d| d.value.as_str())
    }

    pub fn cluster(&self) -> Option<&str> {
        self.dimension(dimensions::CLUSTER_NAME)
    }

    pub fn instance_type(&self) -> Option<&str> {
        self.dimension(dimensions::INSTANCE_TYPE)
    }
}
