//! Metric definitions shared by the service crates.
//!
//! Each crate declares its metrics as `MetricDef` constants and lists them in an
//! `ALL_METRICS` slice so they can be described to the recorder at start-up.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricType {
    Counter,
    Histogram,
}

impl MetricType {
    pub const fn as_str(&self) -> &'static str {
        match self {
            MetricType::Counter => "Counter",
            MetricType::Histogram => "Histogram",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MetricDef {
    pub name: &'static str,
    pub metric_type: MetricType,
    pub description: &'static str,
}

/// Registers the description of every metric with the installed recorder.
/// Without a recorder this is a no-op.
pub fn describe_all(defs: &[MetricDef]) {
    for def in defs {
        match def.metric_type {
            MetricType::Counter => metrics::describe_counter!(def.name, def.description),
            MetricType::Histogram => metrics::describe_histogram!(def.name, def.description),
        }
    }
}

#[macro_export]
macro_rules! counter {
    ($def:expr) => {
        metrics::counter!($def.name)
    };
}

#[macro_export]
macro_rules! histogram {
    ($def:expr) => {
        metrics::histogram!($def.name)
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    const REQUESTS: MetricDef = MetricDef {
        name: "requests",
        metric_type: MetricType::Counter,
        description: "Number of requests",
    };

    const LATENCY: MetricDef = MetricDef {
        name: "latency",
        metric_type: MetricType::Histogram,
        description: "Request latency in seconds",
    };

    #[test]
    fn test_metric_type_names() {
        assert_eq!(REQUESTS.metric_type.as_str(), "Counter");
        assert_eq!(LATENCY.metric_type.as_str(), "Histogram");
    }

    #[test]
    fn test_macros_without_recorder() {
        // No global recorder is installed in tests, so these must not panic.
        describe_all(&[REQUESTS, LATENCY]);
        counter!(REQUESTS).increment(1);
        histogram!(LATENCY).record(0.25);
    }
}
