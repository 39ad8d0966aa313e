//! Metrics definitions for the analysis handler.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricType {
    Counter,
    Histogram,
}

#[derive(Debug, Clone, Copy)]
pub struct MetricDef {
    pub name: &'static str,
    pub metric_type: MetricType,
    pub description: &'static str,
}

#[macro_export]
macro_rules! counter {
    ($def:expr $(, $key:expr => $value:expr)* $(,)?) => {
        metrics::counter!($def.name $(, $key => $value)*)
    };
}

#[macro_export]
macro_rules! histogram {
    ($def:expr $(, $key:expr => $value:expr)* $(,)?) => {
        metrics::histogram!($def.name $(, $key => $value)*)
    };
}

pub const ANALYSIS_ACCEPTED: MetricDef = MetricDef {
    name: "analysis.accepted",
    metric_type: MetricType::Counter,
    description: "Number of analysis requests acknowledged",
};

pub const ANALYSIS_REJECTED: MetricDef = MetricDef {
    name: "analysis.rejected",
    metric_type: MetricType::Counter,
    description: "Number of analysis requests that failed validation",
};

pub const ANALYSIS_OUTCOME: MetricDef = MetricDef {
    name: "analysis.outcome",
    metric_type: MetricType::Counter,
    description: "Outcome messages built. Tagged with outcome.",
};

pub const UPSTREAM_DURATION: MetricDef = MetricDef {
    name: "analysis.upstream.duration",
    metric_type: MetricType::Histogram,
    description: "Time spent waiting on Log Detective in seconds",
};

pub const PUBLISH_FAILED: MetricDef = MetricDef {
    name: "outcome.publish.failed",
    metric_type: MetricType::Counter,
    description: "Outcome messages the bus did not accept. Tagged with reason.",
};

pub const DISPATCH_FAILED: MetricDef = MetricDef {
    name: "dispatch.failed",
    metric_type: MetricType::Counter,
    description: "Background dispatch tasks that finished with an error",
};

pub const ALL_METRICS: &[MetricDef] = &[
    ANALYSIS_ACCEPTED,
    ANALYSIS_REJECTED,
    ANALYSIS_OUTCOME,
    UPSTREAM_DURATION,
    PUBLISH_FAILED,
    DISPATCH_FAILED,
];

/// Registers the descriptions with the installed recorder.
pub fn describe_all() {
    for def in ALL_METRICS {
        match def.metric_type {
            MetricType::Counter => metrics::describe_counter!(def.name, def.description),
            MetricType::Histogram => metrics::describe_histogram!(def.name, def.description),
        }
    }
}
