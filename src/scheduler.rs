//! Background refresh scheduler.
//!
//! One recurring Tokio task checks the stored session every `check_interval` (the first
//! check runs immediately) and asks the [`RefreshCoordinator`] for a refresh once the
//! access token enters the refresh buffer. The task is owned through a cancellable handle:
//! starting twice keeps the running task, stopping cancels and aborts it.
//!
//! Other contexts sharing the same storage medium announce sign-in and sign-out through
//! [`CredentialChange`] notifications; [`RefreshScheduler::listen`] follows them so every
//! context runs a scheduler exactly while it holds an access token.

// crates.io
use tokio::{
	sync::broadcast::{self, error::RecvError},
	task::JoinHandle,
	time::MissedTickBehavior,
};
use tokio_util::sync::CancellationToken;
// self
use crate::{
	_prelude::*,
	http::HttpTransport,
	obs::{self, FlowKind, FlowOutcome, FlowSpan},
	refresh::RefreshCoordinator,
};

const KIND: FlowKind = FlowKind::Scheduler;

/// Notification that a stored credential changed outside this context.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CredentialChange {
	/// Storage key that changed.
	pub key: String,
	/// New value; `None` when the key was removed.
	pub new_value: Option<String>,
}
impl CredentialChange {
	/// Builds a notification for a key that now holds `value`.
	pub fn set(key: impl Into<String>, value: impl Into<String>) -> Self {
		Self { key: key.into(), new_value: Some(value.into()) }
	}

	/// Builds a notification for a removed key.
	pub fn removed(key: impl Into<String>) -> Self {
		Self { key: key.into(), new_value: None }
	}
}

/// Periodic refresh driver. Clones control the same task.
pub struct RefreshScheduler<T>
where
	T: HttpTransport,
{
	coordinator: RefreshCoordinator<T>,
	interval: Duration,
	task: Arc<Mutex<Option<ScheduledTask>>>,
}
impl<T> RefreshScheduler<T>
where
	T: HttpTransport,
{
	/// Creates a stopped scheduler checking every `interval`.
	pub fn new(coordinator: RefreshCoordinator<T>, interval: Duration) -> Self {
		Self { coordinator, interval, task: Arc::new(Mutex::new(None)) }
	}

	/// Starts the periodic check; returns `false` when a task is already running.
	///
	/// Must be called from within a Tokio runtime.
	pub fn start(&self) -> bool {
		let mut slot = self.task.lock();

		if slot.as_ref().is_some_and(ScheduledTask::is_active) {
			return false;
		}

		let cancel = CancellationToken::new();
		let handle =
			tokio::spawn(run_checks(self.coordinator.clone(), self.interval, cancel.clone()));

		*slot = Some(ScheduledTask { cancel, handle });

		obs::record_transition(KIND, "start", "refresh scheduler started");

		true
	}

	/// Cancels the periodic check; returns `false` when nothing was scheduled.
	pub fn stop(&self) -> bool {
		let Some(task) = self.task.lock().take() else { return false };

		drop(task);
		obs::record_transition(KIND, "stop", "refresh scheduler stopped");

		true
	}

	/// Returns `true` while the periodic task is alive.
	pub fn is_running(&self) -> bool {
		self.task.lock().as_ref().is_some_and(ScheduledTask::is_active)
	}

	/// Period between checks.
	pub fn interval(&self) -> Duration {
		self.interval
	}

	/// Reacts to a credential change made by another context.
	///
	/// The access-token key gaining a value starts the scheduler, losing it stops the
	/// scheduler; every other key is ignored.
	pub fn handle_change(&self, change: &CredentialChange) {
		if change.key != self.coordinator.store().keys().access_token {
			return;
		}

		if change.new_value.is_some() {
			self.start();
		} else {
			self.stop();
		}
	}

	/// Follows credential-change notifications until the sender side closes.
	///
	/// A lagging receiver re-derives the running state from the credential store.
	pub fn listen(&self, mut receiver: broadcast::Receiver<CredentialChange>) -> JoinHandle<()> {
		let scheduler = self.clone();

		tokio::spawn(async move {
			loop {
				match receiver.recv().await {
					Ok(change) => scheduler.handle_change(&change),
					Err(RecvError::Lagged(skipped)) => {
						obs::record_suppressed_error(
							KIND,
							"listen",
							&format_args!("missed {skipped} credential changes"),
						);

						if scheduler.coordinator.store().is_authenticated() {
							scheduler.start();
						} else {
							scheduler.stop();
						}
					},
					Err(RecvError::Closed) => break,
				}
			}
		})
	}

	/// Host teardown hook; stops the scheduler.
	pub fn on_unload(&self) {
		self.stop();
	}
}
impl<T> Clone for RefreshScheduler<T>
where
	T: HttpTransport,
{
	fn clone(&self) -> Self {
		Self {
			coordinator: self.coordinator.clone(),
			interval: self.interval,
			task: Arc::clone(&self.task),
		}
	}
}
impl<T> Debug for RefreshScheduler<T>
where
	T: HttpTransport,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("RefreshScheduler")
			.field("interval", &self.interval)
			.field("running", &self.is_running())
			.finish()
	}
}

struct ScheduledTask {
	cancel: CancellationToken,
	handle: JoinHandle<()>,
}
impl ScheduledTask {
	fn is_active(&self) -> bool {
		!self.cancel.is_cancelled() && !self.handle.is_finished()
	}
}
impl Drop for ScheduledTask {
	fn drop(&mut self) {
		self.cancel.cancel();
		self.handle.abort();
	}
}

async fn run_checks<T>(coordinator: RefreshCoordinator<T>, period: Duration, cancel: CancellationToken)
where
	T: HttpTransport,
{
	let mut ticker = tokio::time::interval(period.unsigned_abs());

	ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

	loop {
		tokio::select! {
			_ = cancel.cancelled() => break,
			_ = ticker.tick() => {},
		}

		if !coordinator.store().is_authenticated() || !coordinator.should_refresh_token() {
			continue;
		}

		let span = FlowSpan::new(KIND, "tick");

		obs::record_flow_outcome(KIND, FlowOutcome::Attempt);

		let refreshed = span.instrument(coordinator.refresh_token()).await;

		obs::record_flow_outcome(
			KIND,
			if refreshed { FlowOutcome::Success } else { FlowOutcome::Failure },
		);
	}
}
