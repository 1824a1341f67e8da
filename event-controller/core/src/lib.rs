#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

//! Reconciles the EventBridge rule, SQS queue and queue access policy that
//! deliver Auto Scaling Group lifecycle events for a single cluster.
//!
//! This crate holds the reconciliation logic only. The remote services are
//! reached through the [`EventRules`], [`Queues`] and [`QueueProvisioner`]
//! traits so that the logic can run against real AWS clients or test fakes.

pub mod client;
mod error;
pub mod metrics;
pub mod names;
pub mod pipeline;
pub mod policy;
pub mod rule;

#[cfg(test)]
mod tests;

pub use self::{
    client::{
        EventPattern, EventRules, QueueAttributes, QueueProvisioner, Queues, Rule, RuleSpec,
        RuleState, Target,
    },
    error::{ApiError, Error, ErrorKind, Stage},
    metrics::PipelineMetrics,
    names::ResourceNames,
    pipeline::EventPipeline,
    rule::{QueueRef, RuleReconciler},
};

/// The event source emitted by Auto Scaling for lifecycle actions.
pub const ASG_EVENT_SOURCE: &str = "aws.autoscaling";
