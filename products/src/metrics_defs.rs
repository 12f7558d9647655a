//! Metrics definitions for the products service.

use shared::metrics_defs::{MetricDef, MetricType};

pub const LOOKUP_FOUND: MetricDef = MetricDef {
    name: "lookup.found",
    metric_type: MetricType::Counter,
    description: "Number of lookups that returned a product's matches",
};

pub const LOOKUP_NOT_FOUND: MetricDef = MetricDef {
    name: "lookup.not_found",
    metric_type: MetricType::Counter,
    description: "Number of lookups for which the store had no product",
};

pub const LOOKUP_FAILED: MetricDef = MetricDef {
    name: "lookup.failed",
    metric_type: MetricType::Counter,
    description: "Number of lookups that failed for any other reason",
};

pub const STORE_LOOKUP_DURATION: MetricDef = MetricDef {
    name: "store.lookup.duration",
    metric_type: MetricType::Histogram,
    description: "Time spent waiting on the store for a single lookup in seconds",
};

pub const ALL_METRICS: &[MetricDef] = &[
    LOOKUP_FOUND,
    LOOKUP_NOT_FOUND,
    LOOKUP_FAILED,
    STORE_LOOKUP_DURATION,
];
