#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

//! AWS implementations of the event pipeline's service clients.

mod error;
mod eventbridge;
mod sqs;

pub use self::{
    error::{classify_code, from_sdk},
    eventbridge::EventBridgeRules,
    sqs::SqsQueues,
};
