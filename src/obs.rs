//! Optional observability helpers for session flows.
//!
//! # Feature Flags
//!
//! - Enable `tracing` to emit spans named `session_guard.flow` with the `flow` and `stage`
//!   fields, plus warn-level events for failures the session swallows on purpose (storage
//!   errors, refresh failures, best-effort logout).
//! - Enable `metrics` to increment the `session_guard_flow_total` counter for every
//!   attempt/success/failure, labeled by `flow` + `outcome`, and the
//!   `session_guard_rate_limited_total` counter labeled by `operation`.

mod metrics;
mod tracing;

pub use metrics::*;
pub use tracing::*;

// self
use crate::_prelude::*;

/// Session flows observed by the crate.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FlowKind {
	/// Token refresh through the coordinator.
	Refresh,
	/// Sign-in.
	Login,
	/// Sign-out.
	Logout,
	/// Authorized API call.
	Request,
	/// Background refresh scheduler.
	Scheduler,
	/// Credential persistence.
	Storage,
}
impl FlowKind {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			FlowKind::Refresh => "refresh",
			FlowKind::Login => "login",
			FlowKind::Logout => "logout",
			FlowKind::Request => "request",
			FlowKind::Scheduler => "scheduler",
			FlowKind::Storage => "storage",
		}
	}
}
impl Display for FlowKind {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Outcome labels recorded for each attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FlowOutcome {
	/// Entry to a session helper.
	Attempt,
	/// Successful completion.
	Success,
	/// Failure returned or swallowed.
	Failure,
}
impl FlowOutcome {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			FlowOutcome::Attempt => "attempt",
			FlowOutcome::Success => "success",
			FlowOutcome::Failure => "failure",
		}
	}
}
impl Display for FlowOutcome {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}
