use std::fmt;

pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// How a failed remote call should be treated.
///
/// Only `NotFound` changes control flow: it means the resource is absent,
/// which is expected during creation and deletion.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    NotFound,
    Transient,
    Other,
}

/// An error returned by a remote service call.
#[derive(Debug, thiserror::Error)]
#[error("{operation} failed{}", DisplayCode(.code.as_deref()))]
pub struct ApiError {
    kind: ErrorKind,
    operation: &'static str,
    code: Option<String>,
    #[source]
    source: Option<BoxError>,
}

/// A step of reconciling or deleting a cluster's pipeline.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Stage {
    EnsureQueue,
    EnsureRule,
    ResolveQueue,
    EnsureTarget,
    EnsureQueuePolicy,
    RemoveTarget,
    DeleteRule,
    DeleteQueue,
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("failed to {stage} for cluster {cluster}")]
    Api {
        cluster: String,
        stage: Stage,
        #[source]
        source: ApiError,
    },

    #[error("event rule {rule} has no ARN")]
    MissingRuleArn { rule: String },

    #[error("queue {queue} has no ARN attribute")]
    MissingQueueArn { queue: String },

    #[error("failed to encode document for {resource}")]
    Encode {
        resource: String,
        #[source]
        source: serde_json::Error,
    },
}

struct DisplayCode<'a>(Option<&'a str>);

// === impl ApiError ===

impl ApiError {
    pub fn new(kind: ErrorKind, operation: &'static str) -> Self {
        Self {
            kind,
            operation,
            code: None,
            source: None,
        }
    }

    pub fn not_found(operation: &'static str) -> Self {
        Self::new(ErrorKind::NotFound, operation)
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    pub fn with_source(mut self, source: impl Into<BoxError>) -> Self {
        self.source = Some(source.into());
        self
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn operation(&self) -> &'static str {
        self.operation
    }

    pub fn code(&self) -> Option<&str> {
        self.code.as_deref()
    }

    pub fn is_not_found(&self) -> bool {
        self.kind == ErrorKind::NotFound
    }
}

impl fmt::Display for DisplayCode<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Some(code) => write!(f, " ({code})"),
            None => Ok(()),
        }
    }
}

// === impl Stage ===

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::EnsureQueue => "ensure_queue",
            Self::EnsureRule => "ensure_rule",
            Self::ResolveQueue => "resolve_queue",
            Self::EnsureTarget => "ensure_target",
            Self::EnsureQueuePolicy => "ensure_queue_policy",
            Self::RemoveTarget => "remove_target",
            Self::DeleteRule => "delete_rule",
            Self::DeleteQueue => "delete_queue",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let action = match self {
            Self::EnsureQueue => "ensure queue exists",
            Self::EnsureRule => "ensure event rule exists",
            Self::ResolveQueue => "resolve queue",
            Self::EnsureTarget => "attach queue target",
            Self::EnsureQueuePolicy => "set queue access policy",
            Self::RemoveTarget => "remove queue target",
            Self::DeleteRule => "delete event rule",
            Self::DeleteQueue => "delete queue",
        };
        f.write_str(action)
    }
}

// === impl Error ===

impl Error {
    pub(crate) fn api(cluster: &str, stage: Stage) -> impl FnOnce(ApiError) -> Self + '_ {
        move |source| Self::Api {
            cluster: cluster.to_string(),
            stage,
            source,
        }
    }

    /// The classification of the underlying remote failure.
    ///
    /// Errors that did not come from a remote call are reported as `Other`.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Api { source, .. } => source.kind(),
            _ => ErrorKind::Other,
        }
    }

    /// The stage that failed, if the failure came from a remote call.
    pub fn stage(&self) -> Option<Stage> {
        match self {
            Self::Api { stage, .. } => Some(*stage),
            _ => None,
        }
    }
}
