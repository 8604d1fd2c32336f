// std
use std::sync::atomic::{AtomicU64, Ordering};

/// Thread-safe counters for the refresh-and-replay machinery of one gateway.
#[derive(Debug, Default)]
pub struct RefreshMetrics {
	attempts: AtomicU64,
	success: AtomicU64,
	failure: AtomicU64,
	queued: AtomicU64,
	replayed: AtomicU64,
	abandoned: AtomicU64,
}
impl RefreshMetrics {
	/// Returns the number of refresh calls started.
	pub fn attempts(&self) -> u64 {
		self.attempts.load(Ordering::Relaxed)
	}

	/// Returns the number of refresh calls that installed a new session.
	pub fn successes(&self) -> u64 {
		self.success.load(Ordering::Relaxed)
	}

	/// Returns the number of refresh calls that failed or timed out.
	pub fn failures(&self) -> u64 {
		self.failure.load(Ordering::Relaxed)
	}

	/// Returns the number of requests parked behind a refresh (the originating one included).
	pub fn queued(&self) -> u64 {
		self.queued.load(Ordering::Relaxed)
	}

	/// Returns the number of requests re-sent with a newer token.
	pub fn replayed(&self) -> u64 {
		self.replayed.load(Ordering::Relaxed)
	}

	/// Returns the number of queued requests skipped because their caller went away.
	pub fn abandoned(&self) -> u64 {
		self.abandoned.load(Ordering::Relaxed)
	}

	pub(crate) fn record_attempt(&self) {
		self.attempts.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn record_success(&self) {
		self.success.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn record_failure(&self) {
		self.failure.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn record_queued(&self) {
		self.queued.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn record_replay(&self) {
		self.replayed.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn record_abandoned(&self) {
		self.abandoned.fetch_add(1, Ordering::Relaxed);
	}
}
