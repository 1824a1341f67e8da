use asg_event_controller_core::{ApiError, ErrorKind};
use aws_sdk_sqs::error::ProvideErrorMetadata;
use aws_smithy_runtime_api::client::result::{CreateUnhandledError, SdkError};
use std::fmt;

/// Error codes that mean the addressed resource does not exist.
const NOT_FOUND_CODES: &[&str] = &[
    // EventBridge
    "ResourceNotFoundException",
    // SQS, query and JSON protocols
    "AWS.SimpleQueueService.NonExistentQueue",
    "QueueDoesNotExist",
];

/// Error codes for failures that may succeed if the call is made again later.
const TRANSIENT_CODES: &[&str] = &[
    "ThrottlingException",
    "Throttling",
    "TooManyRequestsException",
    "RequestThrottled",
    "LimitExceededException",
    "ConcurrentModificationException",
    "InternalException",
    "InternalError",
    "InternalFailure",
    "ServiceUnavailable",
    "RequestTimeout",
];

/// Classifies a service error code. Unknown and missing codes are `Other`.
pub fn classify_code(code: Option<&str>) -> ErrorKind {
    match code {
        Some(code) if NOT_FOUND_CODES.contains(&code) => ErrorKind::NotFound,
        Some(code) if TRANSIENT_CODES.contains(&code) => ErrorKind::Transient,
        _ => ErrorKind::Other,
    }
}

/// Converts an SDK error into an [`ApiError`], classifying it by its service
/// error code. Failures to reach the service at all are `Transient`.
pub fn from_sdk<E, R>(operation: &'static str, error: SdkError<E, R>) -> ApiError
where
    E: ProvideErrorMetadata + CreateUnhandledError + std::error::Error + Send + Sync + 'static,
    R: fmt::Debug + Send + Sync + 'static,
{
    let code = error.code().map(str::to_string);
    let kind = match &error {
        SdkError::TimeoutError(_) | SdkError::DispatchFailure(_) | SdkError::ResponseError(_) => {
            ErrorKind::Transient
        }
        _ => classify_code(code.as_deref()),
    };

    let error = ApiError::new(kind, operation).with_source(error.into_service_error());
    match code {
        Some(code) => error.with_code(code),
        None => error,
    }
}
