//! Typed gateways to the remote event-rule and queue services.

use crate::{ApiError, ASG_EVENT_SOURCE};
use serde::{Deserialize, Serialize};

pub type Result<T, E = ApiError> = std::result::Result<T, E>;

/// Models the event-rule service (EventBridge).
#[async_trait::async_trait]
pub trait EventRules: Send + Sync {
    /// Fails with a `NotFound` error when the rule does not exist.
    async fn describe_rule(&self, name: &str) -> Result<Rule>;

    /// Creates the rule, or updates it in place if it already exists.
    async fn put_rule(&self, rule: &RuleSpec) -> Result<()>;

    /// Returns every target of the rule.
    async fn list_targets(&self, rule: &str) -> Result<Vec<Target>>;

    /// Adds or replaces the given targets, leaving all others untouched.
    async fn put_targets(&self, rule: &str, targets: &[Target]) -> Result<()>;

    async fn remove_targets(&self, rule: &str, ids: &[String]) -> Result<()>;

    async fn delete_rule(&self, name: &str) -> Result<()>;
}

/// Models the queue service (SQS).
#[async_trait::async_trait]
pub trait Queues: Send + Sync {
    /// Fails with a `NotFound` error when no queue has this name.
    async fn get_queue_url(&self, name: &str) -> Result<String>;

    /// Reads the queue's ARN and access policy.
    async fn get_queue_attributes(&self, url: &str) -> Result<QueueAttributes>;

    async fn set_queue_policy(&self, url: &str, policy: &str) -> Result<()>;
}

/// Ensures a cluster's queue exists before its rule is wired to it, and
/// removes it on teardown.
#[async_trait::async_trait]
pub trait QueueProvisioner: Send + Sync {
    /// Succeeds if the queue already exists.
    async fn ensure_queue(&self, name: &str) -> Result<()>;

    /// Succeeds if the queue is already gone.
    async fn delete_queue(&self, name: &str) -> Result<()>;
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Rule {
    pub name: String,
    pub arn: Option<String>,
    pub event_pattern: Option<String>,
    pub state: RuleState,
}

/// The desired configuration of a rule.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RuleSpec {
    pub name: String,
    pub event_pattern: String,
    pub state: RuleState,
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum RuleState {
    #[default]
    Enabled,
    Disabled,
}

/// An event filter, serialized in the EventBridge pattern syntax.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventPattern {
    pub source: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Target {
    pub id: String,
    pub arn: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct QueueAttributes {
    pub arn: Option<String>,
    pub policy: Option<String>,
}

// === impl EventPattern ===

impl EventPattern {
    /// Matches every event emitted by Auto Scaling.
    pub fn asg_lifecycle() -> Self {
        Self {
            source: vec![ASG_EVENT_SOURCE.to_string()],
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

// === impl RuleState ===

impl RuleState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Enabled => "ENABLED",
            Self::Disabled => "DISABLED",
        }
    }
}

// === impl QueueAttributes ===

impl QueueAttributes {
    /// Returns the access policy unless it is absent or empty.
    pub fn policy(&self) -> Option<&str> {
        self.policy.as_deref().filter(|p| !p.trim().is_empty())
    }
}
