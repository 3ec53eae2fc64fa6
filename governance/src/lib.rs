//! Runtime governance for a real-time assistant session.
//!
//! # Architecture
//!
//! The crate keeps an interactive, latency-sensitive session stable under
//! load through four collaborators:
//!
//! - [`FailureModeHandler`] - routes every detected failure through the
//!   closed failure-mode → degradation-action matrix, exactly one action
//!   per dispatch, never an error back to the caller
//! - [`TimeoutGate`] - bounds any boundary-crossing async call with a
//!   deadline and a caller-supplied fallback, instrumenting every call
//!   through the performance monitor
//! - [`RateLimiter`] - sliding-window admission with exponential backoff
//!   for outbound provider requests
//! - [`Governance`] - the composition root that wires configuration,
//!   monitor, handler, gate, and per-channel limiters together
//!
//! # Control flow
//!
//! A caller crossing a slow or unreliable boundary goes through
//! [`TimeoutGate::run`], which records timing on the shared
//! [`ballast_monitor::PerformanceMonitor`]. A breached deadline or budget
//! escalates to the [`FailureModeHandler`], which performs one bounded,
//! local remediation through the [`DegradationHooks`] seam. Outbound
//! provider requests are additionally screened by a [`RateLimiter`]
//! before dispatch, independent of that chain.
//!
//! # Error handling
//!
//! The layer's own entry points (`acquire`, `run`, `handle`) always
//! resolve, even when the underlying condition is a failure. Only a
//! wrapped operation's own rejection propagates, verbatim.

mod failure;
mod gate;
mod provider;
mod rate;
mod runtime;

pub use failure::{
    DegradationHooks, FailureModeHandler, SessionControls, UserNotice, UserNoticeQueue,
};
pub use gate::{TimeoutGate, TimeoutPolicy};
pub use provider::{GatedProvider, ProviderClient, ProviderPolicies};
pub use rate::RateLimiter;
pub use runtime::Governance;

pub use ballast_types;
