#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

pub use asg_event_controller_aws as aws;
pub use asg_event_controller_core as core;

mod admin;
mod args;
mod log;
mod sdk;

pub use self::{args::Args, log::LogFormat};
