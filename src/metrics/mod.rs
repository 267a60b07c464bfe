/*!
 * # Metrics Module
 *
 * In-process counters, gauges and histograms for the fulfillment workflow.
 *
 * Metrics are exposed in the following formats:
 * - Prometheus text format at `/metrics`
 * - JSON format at `/metrics/json`
 */

use dashmap::DashMap;
use serde_json::json;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MetricsError {
    #[error("Failed to export metrics: {0}")]
    ExportError(String),
}

#[derive(Debug, Clone, Default)]
pub struct Counter {
    value: Arc<AtomicU64>,
}

impl Counter {
    pub fn inc(&self) {
        self.value.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_by(&self, value: u64) {
        self.value.fetch_add(value, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.value.load(Ordering::Relaxed)
    }
}

/// Gauge storing an f64 as raw bits
#[derive(Debug, Clone, Default)]
pub struct Gauge {
    bits: Arc<AtomicU64>,
}

impl Gauge {
    pub fn set(&self, value: f64) {
        self.bits.store(value.to_bits(), Ordering::Relaxed);
    }

    pub fn get(&self) -> f64 {
        f64::from_bits(self.bits.load(Ordering::Relaxed))
    }
}

#[derive(Debug, Clone, Default)]
pub struct Histogram {
    sum_bits: Arc<AtomicU64>,
    count: Arc<AtomicU64>,
}

impl Histogram {
    pub fn observe(&self, value: f64) {
        let _ = self
            .sum_bits
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |bits| {
                Some((f64::from_bits(bits) + value).to_bits())
            });
        self.count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn get_count(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }

    pub fn get_sum(&self) -> f64 {
        f64::from_bits(self.sum_bits.load(Ordering::Relaxed))
    }
}

#[derive(Debug, Default)]
pub struct MetricsRegistry {
    counters: DashMap<String, Counter>,
    gauges: DashMap<String, Gauge>,
    histograms: DashMap<String, Histogram>,
}

fn prometheus_name(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect()
}

impl MetricsRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_or_create_counter(&self, name: &str) -> Counter {
        self.counters
            .entry(name.to_string())
            .or_default()
            .clone()
    }

    pub fn get_or_create_gauge(&self, name: &str) -> Gauge {
        self.gauges.entry(name.to_string()).or_default().clone()
    }

    pub fn get_or_create_histogram(&self, name: &str) -> Histogram {
        self.histograms
            .entry(name.to_string())
            .or_default()
            .clone()
    }

    pub fn counter_value(&self, name: &str) -> u64 {
        self.counters.get(name).map(|c| c.get()).unwrap_or(0)
    }

    pub fn export_metrics(&self) -> Result<String, MetricsError> {
        let mut output = String::new();

        for entry in self.counters.iter() {
            let (name, counter) = entry.pair();
            let name = prometheus_name(name);
            output.push_str(&format!("# TYPE {} counter\n", name));
            output.push_str(&format!("{} {}\n", name, counter.get()));
        }

        for entry in self.gauges.iter() {
            let (name, gauge) = entry.pair();
            let name = prometheus_name(name);
            output.push_str(&format!("# TYPE {} gauge\n", name));
            output.push_str(&format!("{} {}\n", name, gauge.get()));
        }

        for entry in self.histograms.iter() {
            let (name, histogram) = entry.pair();
            let name = prometheus_name(name);
            output.push_str(&format!("# TYPE {} summary\n", name));
            output.push_str(&format!("{}_count {}\n", name, histogram.get_count()));
            output.push_str(&format!("{}_sum {}\n", name, histogram.get_sum()));
        }

        Ok(output)
    }

    pub fn export_metrics_json(&self) -> Result<serde_json::Value, MetricsError> {
        let mut counters = serde_json::Map::new();
        for entry in self.counters.iter() {
            counters.insert(entry.key().clone(), json!(entry.value().get()));
        }

        let mut gauges = serde_json::Map::new();
        for entry in self.gauges.iter() {
            gauges.insert(entry.key().clone(), json!(entry.value().get()));
        }

        let mut histograms = serde_json::Map::new();
        for entry in self.histograms.iter() {
            histograms.insert(
                entry.key().clone(),
                json!({
                    "count": entry.value().get_count(),
                    "sum": entry.value().get_sum(),
                }),
            );
        }

        Ok(json!({
            "counters": counters,
            "gauges": gauges,
            "histograms": histograms,
        }))
    }
}

// Global metrics registry
lazy_static::lazy_static! {
    pub static ref METRICS: MetricsRegistry = MetricsRegistry::new();
}

pub fn increment_counter(name: &str) {
    METRICS.get_or_create_counter(name).inc();
}

pub fn increment_counter_by(name: &str, value: u64) {
    METRICS.get_or_create_counter(name).inc_by(value);
}

pub fn set_gauge(name: &str, value: f64) {
    METRICS.get_or_create_gauge(name).set(value);
}

pub fn observe_histogram(name: &str, value: f64) {
    METRICS.get_or_create_histogram(name).observe(value);
}

pub async fn metrics_handler() -> Result<String, MetricsError> {
    METRICS.export_metrics()
}

pub async fn metrics_json_handler() -> Result<serde_json::Value, MetricsError> {
    METRICS.export_metrics_json()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_and_histograms_export_as_prometheus_text() {
        let registry = MetricsRegistry::new();
        registry.get_or_create_counter("sales.orders.created").inc_by(3);
        registry.get_or_create_histogram("db.ping_ms").observe(1.5);
        registry.get_or_create_histogram("db.ping_ms").observe(2.5);
        registry.get_or_create_gauge("db.max_connections").set(16.0);

        let text = registry.export_metrics().unwrap();
        assert!(text.contains("sales_orders_created 3"));
        assert!(text.contains("db_ping_ms_count 2"));
        assert!(text.contains("db_ping_ms_sum 4"));
        assert!(text.contains("db_max_connections 16"));
    }

    #[test]
    fn json_export_keeps_original_names() {
        let registry = MetricsRegistry::new();
        registry.get_or_create_counter("gate.identity_mismatch").inc();
        let json = registry.export_metrics_json().unwrap();
        assert_eq!(json["counters"]["gate.identity_mismatch"], 1);
        assert_eq!(registry.counter_value("missing"), 0);
    }
}
