//! Single-flight refresh state: one flag and one FIFO queue, guarded by one mutex.
//!
//! Admission is a single critical section: the first authorization failure flips `refreshing`
//! and becomes the queue head; every failure observed while the flag is set is appended behind
//! it. The leader receives a `RefreshTicket`; finishing it drains the queue and clears the flag
//! together, so the queue is never non-empty while the coordinator is idle. A ticket dropped
//! before it finishes rejects every parked caller and returns the coordinator to idle.

// crates.io
use tokio::sync::oneshot;
// self
use crate::{
	_prelude::*,
	transport::{ApiRequest, ApiResponse},
};

/// Resolve/reject continuation of a parked request.
pub(crate) type Continuation = oneshot::Sender<Result<ApiResponse>>;

/// A request parked behind the in-flight refresh, with the channel its caller awaits.
pub struct PendingRequest {
	sequence: u64,
	request: ApiRequest,
	respond_to: Continuation,
}
impl PendingRequest {
	/// Order in which the authorization failure was observed (1-based, per coordinator).
	pub fn sequence(&self) -> u64 {
		self.sequence
	}

	/// The request that will be replayed.
	pub fn request(&self) -> &ApiRequest {
		&self.request
	}

	/// Returns `true` when the caller stopped waiting (its future was dropped).
	pub fn is_abandoned(&self) -> bool {
		self.respond_to.is_closed()
	}

	pub(crate) fn into_parts(self) -> (ApiRequest, Continuation) {
		(self.request, self.respond_to)
	}
}
impl Debug for PendingRequest {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("PendingRequest")
			.field("sequence", &self.sequence)
			.field("method", &self.request.method)
			.field("url", &self.request.url.as_str())
			.field("abandoned", &self.is_abandoned())
			.finish()
	}
}

/// Result of [`RefreshCoordinator::admit`].
pub(crate) enum Admission {
	/// The caller started the refresh and must run it; its request heads the queue.
	Lead(RefreshTicket),
	/// A refresh is already in flight; the request was queued behind it.
	Queued,
	/// The bypass predicate held while idle; nothing was queued.
	Bypass(PendingRequest),
}

#[derive(Debug, Default)]
struct RefreshState {
	refreshing: bool,
	observed: u64,
	queue: VecDeque<PendingRequest>,
}

/// Owned refresh state of one gateway.
#[derive(Debug, Default)]
pub struct RefreshCoordinator {
	state: Mutex<RefreshState>,
}
impl RefreshCoordinator {
	/// Creates an idle coordinator.
	pub fn new() -> Self {
		Self::default()
	}

	/// Returns `true` while a refresh is in flight.
	pub fn is_refreshing(&self) -> bool {
		self.state.lock().refreshing
	}

	/// Number of requests waiting on the in-flight refresh.
	pub fn queued(&self) -> usize {
		self.state.lock().queue.len()
	}

	/// Parks `request` behind the refresh, starting one if none is in flight.
	///
	/// `bypass` is evaluated under the lock, only when idle; returning `true` hands the request
	/// back instead of starting a refresh.
	pub(crate) fn admit(
		self: &Arc<Self>,
		request: ApiRequest,
		respond_to: Continuation,
		bypass: impl FnOnce() -> bool,
	) -> Admission {
		let mut state = self.state.lock();

		state.observed += 1;

		let pending = PendingRequest { sequence: state.observed, request, respond_to };

		if state.refreshing {
			state.queue.push_back(pending);

			return Admission::Queued;
		}
		if bypass() {
			return Admission::Bypass(pending);
		}

		state.refreshing = true;
		state.queue.push_back(pending);

		Admission::Lead(RefreshTicket { coordinator: self.clone(), finished: false })
	}

	fn drain(&self) -> Vec<PendingRequest> {
		let mut state = self.state.lock();

		state.refreshing = false;

		state.queue.drain(..).collect()
	}
}

/// Proof of leadership over one refresh.
pub(crate) struct RefreshTicket {
	coordinator: Arc<RefreshCoordinator>,
	finished: bool,
}
impl RefreshTicket {
	/// Ends the refresh: returns every parked request in arrival order and goes idle.
	pub(crate) fn finish(mut self) -> Vec<PendingRequest> {
		self.finished = true;

		self.coordinator.drain()
	}
}
impl Drop for RefreshTicket {
	fn drop(&mut self) {
		if self.finished {
			return;
		}

		let stranded = self.coordinator.drain();

		#[cfg(feature = "tracing")]
		tracing::warn!(
			parked = stranded.len(),
			"Token refresh ended without settling; rejecting parked requests."
		);

		for pending in stranded {
			let _ = pending.respond_to.send(Err(Error::SessionExpired {
				reason: "the token refresh was interrupted".into(),
			}));
		}
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	fn request(path: &str) -> ApiRequest {
		let base = Url::parse("https://api.example.com/").expect("Fixture URL should parse.");

		ApiRequest::get(base.join(path).expect("Fixture path should join."))
	}

	fn path_of(pending: &PendingRequest) -> &str {
		pending.request().url.path()
	}

	fn lead(admission: Admission) -> RefreshTicket {
		match admission {
			Admission::Lead(ticket) => ticket,
			_ => panic!("Expected the caller to lead the refresh."),
		}
	}

	#[test]
	fn first_failure_leads_and_later_ones_queue_in_order() {
		let coordinator = Arc::new(RefreshCoordinator::new());
		let mut receivers = Vec::new();
		let mut ticket = None;

		for (idx, path) in ["a", "b", "c"].into_iter().enumerate() {
			let (tx, rx) = oneshot::channel();
			let admission = coordinator.admit(request(path), tx, || false);

			receivers.push(rx);

			match (idx, admission) {
				(0, Admission::Lead(lead)) => ticket = Some(lead),
				(1.., Admission::Queued) => {},
				_ => panic!("Unexpected admission for request {path}."),
			}
		}

		assert!(coordinator.is_refreshing());
		assert_eq!(coordinator.queued(), 3);

		let drained = ticket.expect("First failure should lead.").finish();

		assert!(!coordinator.is_refreshing());
		assert_eq!(coordinator.queued(), 0);
		assert_eq!(drained.iter().map(path_of).collect::<Vec<_>>(), ["/a", "/b", "/c"]);
		assert_eq!(drained.iter().map(PendingRequest::sequence).collect::<Vec<_>>(), [1, 2, 3]);
	}

	#[test]
	fn bypass_only_applies_while_idle() {
		let coordinator = Arc::new(RefreshCoordinator::new());
		let (tx, _rx) = oneshot::channel();

		assert!(matches!(coordinator.admit(request("stale"), tx, || true), Admission::Bypass(_)));
		assert!(!coordinator.is_refreshing());

		let (tx, _lead) = oneshot::channel();
		let ticket = lead(coordinator.admit(request("lead"), tx, || false));
		let (tx, _queued) = oneshot::channel();

		assert!(matches!(coordinator.admit(request("late"), tx, || true), Admission::Queued));
		assert_eq!(ticket.finish().len(), 2);
	}

	#[test]
	fn dropped_callers_are_reported_as_abandoned() {
		let coordinator = Arc::new(RefreshCoordinator::new());
		let (tx, rx) = oneshot::channel();
		let ticket = lead(coordinator.admit(request("gone"), tx, || false));

		drop(rx);

		let drained = ticket.finish();

		assert!(drained[0].is_abandoned());
	}

	#[test]
	fn unfinished_ticket_rejects_parked_callers_and_goes_idle() {
		let coordinator = Arc::new(RefreshCoordinator::new());
		let (tx, mut head) = oneshot::channel();
		let ticket = lead(coordinator.admit(request("head"), tx, || false));
		let (tx, mut tail) = oneshot::channel();

		assert!(matches!(coordinator.admit(request("tail"), tx, || false), Admission::Queued));

		drop(ticket);

		assert!(!coordinator.is_refreshing());
		assert_eq!(coordinator.queued(), 0);

		for rx in [&mut head, &mut tail] {
			let settled = rx.try_recv().expect("Parked caller should be settled.");

			assert!(matches!(settled, Err(Error::SessionExpired { .. })));
		}

		let (tx, _rx) = oneshot::channel();

		assert!(matches!(coordinator.admit(request("next"), tx, || false), Admission::Lead(_)));
	}
}
