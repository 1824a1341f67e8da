use crate::ErrorKind;
use prometheus_client::{
    encoding::EncodeLabelSet,
    metrics::{counter::Counter, family::Family, histogram::Histogram},
    registry::{Registry, Unit},
};
use tokio::time;

#[derive(Clone, Debug)]
pub struct PipelineMetrics {
    operations: Family<ResultLabels, Counter>,
    duration: Family<OperationLabels, Histogram>,
    mutations: Family<MutationLabels, Counter>,
}

/// Times a single pipeline operation and records its outcome when ended.
pub(crate) struct OperationObserver {
    start: time::Instant,
    operation: &'static str,
    metrics: PipelineMetrics,
}

#[derive(Clone, Hash, PartialEq, Eq, EncodeLabelSet, Debug)]
struct OperationLabels {
    operation: &'static str,
}

#[derive(Clone, Hash, PartialEq, Eq, EncodeLabelSet, Debug)]
struct ResultLabels {
    operation: &'static str,
    result: &'static str,
}

#[derive(Clone, Hash, PartialEq, Eq, EncodeLabelSet, Debug)]
struct MutationLabels {
    mutation: &'static str,
}

// === PipelineMetrics ===

impl PipelineMetrics {
    pub fn register(reg: &mut Registry) -> Self {
        let operations = Family::<ResultLabels, Counter>::default();
        reg.register(
            "pipeline_operations",
            "Total number of pipeline reconcile and delete operations by result",
            operations.clone(),
        );

        let duration = Family::<OperationLabels, Histogram>::new_with_constructor(|| {
            // Each operation is a handful of sequential API calls.
            Histogram::new([0.05, 0.1, 0.5, 1.0, 5.0, 30.0])
        });
        reg.register_with_unit(
            "pipeline_duration",
            "Histogram of pipeline operation latency (seconds)",
            Unit::Seconds,
            duration.clone(),
        );

        let mutations = Family::<MutationLabels, Counter>::default();
        reg.register(
            "pipeline_mutations",
            "Total number of mutating API calls issued against remote resources",
            mutations.clone(),
        );

        Self {
            operations,
            duration,
            mutations,
        }
    }

    pub(crate) fn start(&self, operation: &'static str) -> OperationObserver {
        OperationObserver {
            start: time::Instant::now(),
            operation,
            metrics: self.clone(),
        }
    }

    pub(crate) fn record_mutation(&self, mutation: &'static str) {
        self.mutations.get_or_create(&MutationLabels { mutation }).inc();
    }

    /// The number of mutating calls recorded with this label.
    #[cfg(test)]
    pub(crate) fn mutations(&self, mutation: &'static str) -> u64 {
        self.mutations.get_or_create(&MutationLabels { mutation }).get()
    }

    /// The number of operations recorded with this result.
    #[cfg(test)]
    pub(crate) fn operations(&self, operation: &'static str, result: &'static str) -> u64 {
        self.operations
            .get_or_create(&ResultLabels { operation, result })
            .get()
    }
}

// === OperationObserver ===

impl OperationObserver {
    pub(crate) fn end(self, error: Option<ErrorKind>) {
        let Self {
            start,
            operation,
            metrics,
        } = self;
        metrics
            .duration
            .get_or_create(&OperationLabels { operation })
            .observe(start.elapsed().as_secs_f64());
        metrics
            .operations
            .get_or_create(&ResultLabels {
                operation,
                result: result_str(error),
            })
            .inc();
    }
}

fn result_str(error: Option<ErrorKind>) -> &'static str {
    match error {
        None => "success",
        Some(ErrorKind::NotFound) => "not_found",
        Some(ErrorKind::Transient) => "transient",
        Some(ErrorKind::Other) => "error",
    }
}
