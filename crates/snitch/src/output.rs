//! Output formatting for run reports

use chrono::{DateTime, Utc};
use clap::ValueEnum;
use colored::Colorize;
use serde::Serialize;
use snitch_lib::{BatchStatus, ClusterStatus, MetricPoint, RunReport};
use tabled::{settings::Style, Table, Tabled};

/// Output format for the run report
#[derive(Debug, Clone, Copy, Default, ValueEnum)]
pub enum OutputFormat {
    /// Table format (default)
    #[default]
    Table,
    /// JSON format
    Json,
}

#[derive(Tabled, Serialize)]
struct PointRow {
    #[tabled(rename = "Cluster")]
    cluster: String,
    #[tabled(rename = "Instance Type")]
    instance_type: String,
    #[tabled(rename = "Metric")]
    metric: String,
    #[tabled(rename = "Value")]
    value: u64,
}

impl From<&MetricPoint> for PointRow {
    fn from(point: &MetricPoint) -> Self {
        Self {
            cluster: point.cluster().unwrap_or_default().to_string(),
            instance_type: point.instance_type().unwrap_or_default().to_string(),
            metric: point.name.to_string(),
            value: point.value,
        }
    }
}

#[derive(Tabled, Serialize)]
struct ClusterRow {
    #[tabled(rename = "Cluster")]
    cluster: String,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "CPU")]
    cpu: u64,
    #[tabled(rename = "Memory (MiB)")]
    memory: u64,
    #[tabled(rename = "Points")]
    points: usize,
    #[tabled(rename = "Errors")]
    errors: usize,
}

#[derive(Serialize)]
struct BatchRow {
    index: usize,
    size: usize,
    status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    reason: Option<String>,
}

#[derive(Serialize)]
struct JsonReport {
    generated_at: DateTime<Utc>,
    discovery_complete: bool,
    clusters: Vec<ClusterRow>,
    metric_points: Vec<MetricPoint>,
    #[serde(skip_serializing_if = "Option::is_none")]
    batches: Option<Vec<BatchRow>>,
    errors: Vec<String>,
}

fn cluster_status(status: ClusterStatus) -> &'static str {
    match status {
        ClusterStatus::Measured => "measured",
        ClusterStatus::Skipped => "skipped",
        ClusterStatus::Cancelled => "cancelled",
    }
}

fn cluster_rows(report: &RunReport) -> Vec<ClusterRow> {
    let mut rows: Vec<ClusterRow> = report
        .measure
        .clusters
        .iter()
        .map(|c| ClusterRow {
            cluster: c.cluster.clone(),
            status: cluster_status(c.status).to_string(),
            cpu: c.footprint.cpu,
            memory: c.footprint.memory,
            points: c.points.len(),
            errors: c.errors.len(),
        })
        .collect();
    rows.sort_by(|a, b| a.cluster.cmp(&b.cluster));
    rows
}

fn batch_rows(report: &RunReport) -> Option<Vec<BatchRow>> {
    report.publish.as_ref().map(|publish| {
        publish
            .batches
            .iter()
            .map(|b| BatchRow {
                index: b.index,
                size: b.size,
                status: b.status.label(),
                reason: match &b.status {
                    BatchStatus::Rejected(reason) | BatchStatus::Failed(reason) => {
                        Some(reason.clone())
                    }
                    BatchStatus::Published | BatchStatus::Cancelled => None,
                },
            })
            .collect()
    })
}

fn error_messages(report: &RunReport) -> Vec<String> {
    let mut errors: Vec<String> = report
        .measure
        .discovery
        .error
        .iter()
        .map(|e| format!("cluster discovery: {e}"))
        .collect();
    for cluster in &report.measure.clusters {
        errors.extend(cluster.errors.iter().map(|e| format!("{}: {e}", cluster.cluster)));
    }
    if report.measure.lost_tasks > 0 {
        errors.push(format!(
            "{} cluster measurement(s) ended without a result",
            report.measure.lost_tasks
        ));
    }
    errors
}

/// Print the run report to stdout
pub fn print_report(report: &RunReport, format: OutputFormat) {
    match format {
        OutputFormat::Table => print_table(report),
        OutputFormat::Json => {
            let json = JsonReport {
                generated_at: Utc::now(),
                discovery_complete: report.measure.discovery.is_complete(),
                clusters: cluster_rows(report),
                metric_points: report.metric_points(),
                batches: batch_rows(report),
                errors: error_messages(report),
            };
            match serde_json::to_string_pretty(&json) {
                Ok(json) => println!("{}", json),
                Err(e) => print_error(&format!("Failed to render report: {e}")),
            }
        }
    }
}

fn print_table(report: &RunReport) {
    let clusters = cluster_rows(report);
    if clusters.is_empty() {
        print_warning("No clusters measured");
    } else {
        println!("{}", Table::new(&clusters).with(Style::rounded()).to_string());
    }

    let mut points: Vec<PointRow> = report.metric_points().iter().map(PointRow::from).collect();
    points.sort_by(|a, b| {
        (&a.cluster, &a.instance_type, &a.metric).cmp(&(&b.cluster, &b.instance_type, &b.metric))
    });
    if !points.is_empty() {
        println!("{}", Table::new(&points).with(Style::rounded()).to_string());
    }

    for error in error_messages(report) {
        print_error(&error);
    }

    match &report.publish {
        None => print_info(&format!(
            "Dry run: {} metric points measured, nothing published",
            points.len()
        )),
        Some(publish) if publish.is_success() => print_success(&format!(
            "Published {} metric points in {} batches",
            publish.published_points(),
            publish.batches.len()
        )),
        Some(publish) => {
            for batch in batch_rows(report).unwrap_or_default() {
                if batch.status != "published" {
                    print_warning(&format!(
                        "Batch {} ({} points) {}: {}",
                        batch.index,
                        batch.size,
                        color_status(batch.status),
                        batch.reason.unwrap_or_default()
                    ));
                }
            }
            print_warning(&format!(
                "Published {} of {} batches",
                publish.published_batches(),
                publish.batches.len()
            ));
        }
    }
}

/// Print a success message
pub fn print_success(message: &str) {
    println!("{} {}", "✓".green().bold(), message);
}

/// Print an error message
pub fn print_error(message: &str) {
    eprintln!("{} {}", "✗".red().bold(), message);
}

/// Print a warning message
pub fn print_warning(message: &str) {
    println!("{} {}", "⚠".yellow().bold(), message);
}

/// Print an info message
pub fn print_info(message: &str) {
    println!("{} {}", "ℹ".blue().bold(), message);
}

/// Color status based on value
pub fn color_status(status: &str) -> String {
    match status {
        "published" | "measured" => status.green().to_string(),
        "skipped" | "cancelled" => status.yellow().to_string(),
        "rejected" | "failed" => status.red().to_string(),
        _ => status.to_string(),
    }
}
