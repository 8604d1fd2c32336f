//! Process-wide "session ended" notifications.

// std
use std::sync::atomic::{AtomicU64, Ordering};
// crates.io
use tokio::sync::broadcast;
// self
use crate::_prelude::*;

/// Receiver handed out by [`Gateway::subscribe`](crate::gateway::Gateway::subscribe).
pub type SessionEvents = broadcast::Receiver<SessionEnded>;

/// Why a session ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SessionEndReason {
	/// A refresh was needed but the session held no refresh token.
	MissingRefreshToken,
	/// The Auth Service rejected the refresh token or the refresh call failed.
	RefreshRejected,
	/// The user signed out.
	SignedOut,
}
impl SessionEndReason {
	/// Returns a stable label suitable for log fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			SessionEndReason::MissingRefreshToken => "missing_refresh_token",
			SessionEndReason::RefreshRejected => "refresh_rejected",
			SessionEndReason::SignedOut => "signed_out",
		}
	}
}
impl Display for SessionEndReason {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Event broadcast once per ended session.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionEnded {
	/// Classification of the ending.
	pub reason: SessionEndReason,
	/// Human-readable detail (never contains token material).
	pub detail: String,
	/// When the session was cleared.
	pub at: OffsetDateTime,
}

/// Fire-and-forget broadcaster; emitting never waits on subscribers.
#[derive(Debug)]
pub struct SessionSignal {
	tx: broadcast::Sender<SessionEnded>,
	emitted: AtomicU64,
}
impl SessionSignal {
	/// Creates a signal buffering up to `capacity` events per lagging subscriber (at least one).
	pub fn new(capacity: usize) -> Self {
		let (tx, _) = broadcast::channel(capacity.max(1));

		Self { tx, emitted: AtomicU64::new(0) }
	}

	/// Registers a new subscriber; it only sees events emitted afterwards.
	pub fn subscribe(&self) -> SessionEvents {
		self.tx.subscribe()
	}

	/// Number of events emitted so far.
	pub fn emitted(&self) -> u64 {
		self.emitted.load(Ordering::Relaxed)
	}

	pub(crate) fn emit(&self, reason: SessionEndReason, detail: impl Into<String>) {
		let event = SessionEnded { reason, detail: detail.into(), at: OffsetDateTime::now_utc() };

		self.emitted.fetch_add(1, Ordering::Relaxed);

		#[cfg(feature = "tracing")]
		tracing::info!(reason = reason.as_str(), detail = %event.detail, "Session ended.");

		// No subscribers is fine.
		let _ = self.tx.send(event);
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn subscribers_receive_events_emitted_after_subscribing() {
		let signal = SessionSignal::new(4);

		signal.emit(SessionEndReason::SignedOut, "nobody listening");

		let mut events = signal.subscribe();

		signal.emit(SessionEndReason::RefreshRejected, "refresh token expired");

		let event = events.try_recv().expect("Subscriber should see the second event.");

		assert_eq!(event.reason, SessionEndReason::RefreshRejected);
		assert_eq!(event.detail, "refresh token expired");
		assert!(events.try_recv().is_err());
		assert_eq!(signal.emitted(), 2);
	}
}
