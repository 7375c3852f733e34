//! Remote control plane for the Halldyll function deployment system.
//!
//! This module provides:
//! - The control plane contract and its HTTP client
//! - Wire types for stacks, invocations and logs
//! - Poll-based waiting for stack operations
//! - Log retrieval

mod api;
mod client;
#[cfg(test)]
pub(crate) mod fake;
mod logs;
mod types;
mod waiter;

#[cfg(test)]
pub(crate) use api::MockControlPlane;
pub use api::{CANNOT_CANCEL_SIGNATURE, ControlPlane, NO_CHANGES_SIGNATURE};
pub use client::HttpControlPlane;
pub use logs::{LogCursor, LogReader};
pub use types::{
    FunctionSummary, InvokeResult, LogEvent, LogPage, LogQuery, LogStream, StackDescription,
    StackOperation, StackStatus,
};
#[cfg(test)]
pub(crate) use waiter::testing::ManualClock;
pub use waiter::{Clock, PollPolicy, StackWaiter, TokioClock};
