//! The authenticated request gateway.
//!
//! Every request goes out with the current access token. When one comes back 401, the gateway
//! parks it behind a single refresh call, rotates the session, and replays every parked request
//! in the order their failures were observed. If the refresh token is missing or rejected the
//! session is cleared from memory and storage, one [`SessionEnded`] event is broadcast, and every
//! parked caller receives [`Error::SessionExpired`].
//!
//! The refresh itself runs on a detached task when a Tokio runtime is available, so a caller
//! dropping its future never strands the requests queued behind it. Without a runtime the first
//! failing caller drives the refresh inline; if that caller is dropped, or the refresh unwinds,
//! every parked caller is rejected with [`Error::SessionExpired`] and the next 401 starts over.

mod cell;
mod metrics;

pub mod coordinator;
pub mod signal;

pub use coordinator::{PendingRequest, RefreshCoordinator};
pub use metrics::RefreshMetrics;
pub use signal::{SessionEndReason, SessionEnded, SessionEvents, SessionSignal};

// crates.io
use futures::future;
use http::{Method, header::AUTHORIZATION};
use serde::de::DeserializeOwned;
use tokio::{runtime::Handle, sync::oneshot};
// self
use crate::{
	_prelude::*,
	auth::AuthService,
	config::GatewayConfig,
	error::{ConfigError, TransportError},
	gateway::{
		cell::SessionCell,
		coordinator::{Admission, RefreshTicket},
	},
	obs::{self, OpKind, OpOutcome, OpSpan},
	session::{LoginCredentials, Session, TokenGrant, TokenSecret},
	store::{KeyValueStore, SessionStore},
	transport::{ApiRequest, ApiResponse, HttpTransport},
};
#[cfg(feature = "reqwest")]
use crate::{auth::ReqwestAuthService, transport::ReqwestTransport};

#[cfg(feature = "reqwest")]
/// Gateway specialized for the crate's default reqwest transport.
pub type ReqwestGateway = Gateway<ReqwestTransport>;

/// Sends API requests on behalf of the signed-in user.
///
/// Cloning is cheap; clones share the session, the refresh state, and the signal.
pub struct Gateway<C>
where
	C: ?Sized + HttpTransport,
{
	inner: Arc<Shared<C>>,
}
impl<C> Gateway<C>
where
	C: ?Sized + HttpTransport,
{
	/// Starts building a gateway from its collaborators.
	pub fn builder(
		config: GatewayConfig,
		transport: impl Into<Arc<C>>,
		auth: Arc<dyn AuthService>,
		store: Arc<dyn KeyValueStore>,
	) -> GatewayBuilder<C> {
		GatewayBuilder {
			config,
			transport: transport.into(),
			auth,
			store,
			coordinator: RefreshCoordinator::new(),
		}
	}

	/// Settings the gateway was built with.
	pub fn config(&self) -> &GatewayConfig {
		&self.inner.config
	}

	/// Current session, if any.
	pub fn session(&self) -> Option<Arc<Session>> {
		self.inner.session.session()
	}

	/// Returns `true` while a session is installed.
	pub fn is_authenticated(&self) -> bool {
		self.inner.session.generation().is_some()
	}

	/// Returns `true` while a token refresh is in flight.
	pub fn is_refreshing(&self) -> bool {
		self.inner.coordinator.is_refreshing()
	}

	/// Number of requests parked behind the in-flight refresh.
	pub fn queued_requests(&self) -> usize {
		self.inner.coordinator.queued()
	}

	/// Subscribes to session-ended events emitted from now on.
	pub fn subscribe(&self) -> SessionEvents {
		self.inner.signal.subscribe()
	}

	/// Number of session-ended events emitted by this gateway.
	pub fn sessions_ended(&self) -> u64 {
		self.inner.signal.emitted()
	}

	/// Refresh and replay counters.
	pub fn refresh_metrics(&self) -> &RefreshMetrics {
		&self.inner.metrics
	}

	/// Attaches the current bearer token to `request` without sending it.
	///
	/// Requests built while no session is installed are returned unchanged.
	pub fn authorize(&self, request: ApiRequest) -> ApiRequest {
		self.inner.authorize(request).0
	}

	/// Builds a body-less request for `path`, resolved against the base URL.
	pub fn request(&self, method: Method, path: &str) -> Result<ApiRequest> {
		Ok(ApiRequest::new(method, self.inner.config.endpoint(path)?))
	}

	/// Sends `GET path`.
	pub async fn get(&self, path: &str) -> Result<ApiResponse> {
		self.send(self.request(Method::GET, path)?).await
	}

	/// Sends `GET path` and decodes a 2xx JSON body.
	pub async fn get_json<T>(&self, path: &str) -> Result<T>
	where
		T: DeserializeOwned,
	{
		self.get(path).await?.error_for_status()?.json()
	}

	/// Sends `POST path` with a JSON body.
	pub async fn post_json<B>(&self, path: &str, body: &B) -> Result<ApiResponse>
	where
		B: ?Sized + Serialize,
	{
		let request = self.request(Method::POST, path)?.with_json(body)?;

		self.send(request).await
	}

	/// Sends `PUT path` with a JSON body.
	pub async fn put_json<B>(&self, path: &str, body: &B) -> Result<ApiResponse>
	where
		B: ?Sized + Serialize,
	{
		let request = self.request(Method::PUT, path)?.with_json(body)?;

		self.send(request).await
	}

	/// Sends `DELETE path`.
	pub async fn delete(&self, path: &str) -> Result<ApiResponse> {
		self.send(self.request(Method::DELETE, path)?).await
	}

	/// Sends `request` with the current bearer token.
	///
	/// Non-401 responses come back as `Ok` whatever their status. A 401 on an authenticated
	/// request is recovered through the coordinated refresh; the replayed request's response is
	/// returned instead. A request that is still rejected after its replay yields
	/// [`Error::Unauthorized`], and a 401 on a request sent without a session is returned as is.
	///
	/// Outside a Tokio runtime the first caller to observe the 401 runs the refresh on its own
	/// future. Dropping that future rejects every parked request with [`Error::SessionExpired`].
	pub async fn send(&self, request: ApiRequest) -> Result<ApiResponse> {
		let (response, sent_with) = self.dispatch(request.clone()).await?;

		if !response.is_unauthorized() {
			return Ok(response);
		}

		let Some(sent_with) = sent_with else {
			return Ok(response);
		};

		if request.is_retried() {
			return Err(Error::Unauthorized { status: response.status.as_u16() });
		}

		self.recover(request.into_retry(), sent_with).await
	}

	/// Exchanges credentials for a session, persists it, and installs it.
	pub async fn login(&self, credentials: &LoginCredentials) -> Result<Arc<Session>> {
		const KIND: OpKind = OpKind::Login;

		let shared = &self.inner;
		let span = OpSpan::new(KIND, "login");

		obs::record_op_outcome(KIND, OpOutcome::Attempt);

		let result = span
			.instrument(async {
				let grant = shared.auth.login(credentials).await?;
				let session = Session::from_grant(grant, OffsetDateTime::now_utc())
					.map_err(ConfigError::from)?;
				let _writes = shared.session.lock_writes().await;

				shared.store.save(&session).await?;

				let installed = shared.session.install(session);

				#[cfg(feature = "tracing")]
				tracing::info!(user = %installed.session.user.id, "Signed in.");

				Ok(installed.session)
			})
			.await;

		obs::record_op_outcome(KIND, outcome_of(&result));

		result
	}

	/// Clears the session from memory and storage.
	///
	/// Emits [`SessionEndReason::SignedOut`] when a session was installed. Requests already
	/// parked behind a refresh are resolved by that refresh.
	pub async fn logout(&self) -> Result<()> {
		const KIND: OpKind = OpKind::Logout;

		let shared = &self.inner;
		let span = OpSpan::new(KIND, "logout");

		obs::record_op_outcome(KIND, OpOutcome::Attempt);

		let result = span
			.instrument(async {
				let _writes = shared.session.lock_writes().await;
				let previous = shared.session.clear();
				let cleared = shared.store.clear().await;

				if previous.is_some() {
					shared.signal.emit(SessionEndReason::SignedOut, "user signed out");
				}

				Ok(cleared?)
			})
			.await;

		obs::record_op_outcome(KIND, outcome_of(&result));

		result
	}

	async fn dispatch(&self, request: ApiRequest) -> Result<(ApiResponse, Option<u64>)> {
		let (request, generation) = self.inner.authorize(request);
		let response =
			self.inner.transport.execute(request).await.map_err(TransportError::network)?;

		Ok((response, generation))
	}

	async fn recover(&self, request: ApiRequest, sent_with: u64) -> Result<ApiResponse> {
		let shared = &self.inner;
		let (tx, rx) = oneshot::channel();
		let admission =
			shared.coordinator.admit(request, tx, || shared.session.generation() != Some(sent_with));

		match admission {
			Admission::Lead(ticket) => {
				shared.metrics.record_queued();

				#[cfg(feature = "tracing")]
				tracing::debug!("Authorization failed; starting token refresh.");

				self.start_refresh(ticket, sent_with).await;
			},
			Admission::Queued => {
				shared.metrics.record_queued();

				#[cfg(feature = "tracing")]
				tracing::debug!(
					queued = shared.coordinator.queued(),
					"Authorization failed during refresh; request queued."
				);
			},
			// The session changed after this request went out; no refresh is needed.
			Admission::Bypass(pending) => {
				let (request, _) = pending.into_parts();

				return match shared.session.generation() {
					Some(_) => self.replay(request).await,
					None => Err(Error::SessionExpired {
						reason: "the session ended while the request was in flight".into(),
					}),
				};
			},
		}

		rx.await.unwrap_or_else(|_| {
			Err(Error::SessionExpired {
				reason: "the refresh ended without settling the request".into(),
			})
		})
	}

	async fn start_refresh(&self, ticket: RefreshTicket, sent_with: u64) {
		let gateway = self.clone();
		let task = async move { gateway.run_refresh(ticket, sent_with).await };

		match Handle::try_current() {
			Ok(handle) => {
				handle.spawn(task);
			},
			Err(_) => task.await,
		}
	}

	async fn run_refresh(&self, ticket: RefreshTicket, sent_with: u64) {
		let shared = &self.inner;
		let outcome = shared.refresh_session(sent_with).await;
		let pending = ticket.finish();

		match outcome {
			Ok(()) => {
				let replays = pending.into_iter().filter_map(|pending| {
					if pending.is_abandoned() {
						shared.metrics.record_abandoned();

						return None;
					}

					let (request, respond_to) = pending.into_parts();

					Some(async move {
						let _ = respond_to.send(self.replay(request).await);
					})
				});

				future::join_all(replays).await;
			},
			Err(failure) =>
				for pending in pending {
					let (_, respond_to) = pending.into_parts();
					let _ = respond_to.send(Err(failure.to_error()));
				},
		}
	}

	async fn replay(&self, request: ApiRequest) -> Result<ApiResponse> {
		const KIND: OpKind = OpKind::Replay;

		let span = OpSpan::new(KIND, "replay");

		self.inner.metrics.record_replay();
		obs::record_op_outcome(KIND, OpOutcome::Attempt);

		let result = span
			.instrument(async {
				let (response, sent_with) = self.dispatch(request).await?;

				if response.is_unauthorized() && sent_with.is_some() {
					return Err(Error::Unauthorized { status: response.status.as_u16() });
				}

				Ok(response)
			})
			.await;

		obs::record_op_outcome(KIND, outcome_of(&result));

		result
	}
}
#[cfg(feature = "reqwest")]
impl Gateway<ReqwestTransport> {
	/// Builds a gateway whose Auth Service shares the reqwest transport and talks to the
	/// configured login and refresh paths.
	pub async fn connect(
		config: GatewayConfig,
		transport: ReqwestTransport,
		store: Arc<dyn KeyValueStore>,
	) -> Result<Self> {
		let transport = Arc::new(transport);
		let auth = Arc::new(ReqwestAuthService::new(&config, transport.clone())?);

		Self::builder(config, transport, auth, store).build().await
	}
}
impl<C> Clone for Gateway<C>
where
	C: ?Sized + HttpTransport,
{
	fn clone(&self) -> Self {
		Self { inner: self.inner.clone() }
	}
}
impl<C> Debug for Gateway<C>
where
	C: ?Sized + HttpTransport,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("Gateway")
			.field("base_url", &self.inner.config.base_url.as_str())
			.field("authenticated", &self.is_authenticated())
			.field("refreshing", &self.is_refreshing())
			.field("store", &self.inner.store)
			.finish()
	}
}

/// Assembles a [`Gateway`], restoring any persisted session.
pub struct GatewayBuilder<C>
where
	C: ?Sized + HttpTransport,
{
	config: GatewayConfig,
	transport: Arc<C>,
	auth: Arc<dyn AuthService>,
	store: Arc<dyn KeyValueStore>,
	coordinator: RefreshCoordinator,
}
impl<C> GatewayBuilder<C>
where
	C: ?Sized + HttpTransport,
{
	/// Uses a caller-owned refresh coordinator instead of a fresh one.
	pub fn with_coordinator(mut self, coordinator: RefreshCoordinator) -> Self {
		self.coordinator = coordinator;

		self
	}

	/// Validates the config and loads the persisted session, if any.
	pub async fn build(self) -> Result<Gateway<C>> {
		let Self { config, transport, auth, store, coordinator } = self;

		config.validate()?;

		let store = SessionStore::new(store, &config.store_scope);
		let restored = store.load().await?;

		#[cfg(feature = "tracing")]
		tracing::debug!(
			base_url = %config.base_url,
			restored = restored.is_some(),
			"Gateway ready."
		);

		Ok(Gateway {
			inner: Arc::new(Shared {
				signal: SessionSignal::new(config.signal_capacity),
				session: SessionCell::new(restored),
				metrics: RefreshMetrics::default(),
				config,
				auth,
				store,
				coordinator: Arc::new(coordinator),
				transport,
			}),
		})
	}
}
impl<C> Debug for GatewayBuilder<C>
where
	C: ?Sized + HttpTransport,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("GatewayBuilder").field("config", &self.config).finish()
	}
}

struct Shared<C>
where
	C: ?Sized + HttpTransport,
{
	config: GatewayConfig,
	auth: Arc<dyn AuthService>,
	store: SessionStore,
	session: SessionCell,
	coordinator: Arc<RefreshCoordinator>,
	signal: SessionSignal,
	metrics: RefreshMetrics,
	transport: Arc<C>,
}
impl<C> Shared<C>
where
	C: ?Sized + HttpTransport,
{
	fn authorize(&self, mut request: ApiRequest) -> (ApiRequest, Option<u64>) {
		match self.session.snapshot() {
			Some(installed) => {
				request.headers.insert(AUTHORIZATION, installed.session.authorization().clone());

				(request, Some(installed.generation))
			},
			None => (request, None),
		}
	}

	/// Rotates the session the leader's request was rejected under.
	///
	/// The writer lock may be taken after a login, logout, or refresh that already settled the
	/// question: a newer session is replayed as is, and a cleared one rejects the queue without
	/// announcing a second ending.
	async fn refresh_session(&self, sent_with: u64) -> Result<(), RefreshFailure> {
		const KIND: OpKind = OpKind::Refresh;

		let span = OpSpan::new(KIND, "refresh_session");

		self.metrics.record_attempt();
		obs::record_op_outcome(KIND, OpOutcome::Attempt);

		let result = span
			.instrument(async {
				let _writes = self.session.lock_writes().await;
				let Some(installed) = self.session.snapshot() else {
					return Err(RefreshFailure::Expired {
						reason: "the session ended before the refresh ran".into(),
					});
				};

				if installed.generation != sent_with {
					#[cfg(feature = "tracing")]
					tracing::debug!("Session changed before the refresh ran; replaying as is.");

					return Ok(());
				}

				let current = installed.session;
				let Some(refresh_token) = current.refresh_token.clone() else {
					return Err(self
						.terminate(
							SessionEndReason::MissingRefreshToken,
							"the session has no refresh token",
						)
						.await);
				};
				let grant = match self.call_refresh(&refresh_token).await {
					Ok(grant) => grant,
					Err(RefreshCall::TimedOut(after)) => {
						#[cfg(feature = "tracing")]
						tracing::warn!(%after, "Token refresh timed out; keeping the session.");

						return Err(RefreshFailure::TimedOut { after });
					},
					Err(RefreshCall::Failed(err)) =>
						return Err(self
							.terminate(SessionEndReason::RefreshRejected, err.to_string())
							.await),
				};
				let next = match current.rotate(grant, OffsetDateTime::now_utc()) {
					Ok(next) => next,
					Err(err) =>
						return Err(self
							.terminate(SessionEndReason::RefreshRejected, err.to_string())
							.await),
				};
				let installed = self.session.install(next);

				if let Err(err) = self.store.save(&installed.session).await {
					#[cfg(feature = "tracing")]
					tracing::warn!(error = %err, "Failed to persist the refreshed session.");
					#[cfg(not(feature = "tracing"))]
					let _ = err;
				}

				Ok(())
			})
			.await;

		match &result {
			Ok(()) => self.metrics.record_success(),
			Err(_) => self.metrics.record_failure(),
		}

		obs::record_op_outcome(KIND, outcome_of(&result));

		result
	}

	async fn call_refresh(&self, refresh_token: &TokenSecret) -> Result<TokenGrant, RefreshCall> {
		let call = self.auth.refresh(refresh_token);
		let deadline = self
			.config
			.refresh_timeout
			.and_then(|after| std::time::Duration::try_from(after).ok().map(|limit| (after, limit)));

		match deadline {
			Some((after, limit)) if Handle::try_current().is_ok() =>
				match tokio::time::timeout(limit, call).await {
					Ok(result) => result.map_err(RefreshCall::Failed),
					Err(_) => Err(RefreshCall::TimedOut(after)),
				},
			_ => call.await.map_err(RefreshCall::Failed),
		}
	}

	/// Clears memory and storage, then announces the ending.
	async fn terminate(&self, reason: SessionEndReason, detail: impl Into<String>) -> RefreshFailure {
		let detail = detail.into();

		self.session.clear();

		if let Err(err) = self.store.clear().await {
			#[cfg(feature = "tracing")]
			tracing::warn!(error = %err, "Failed to clear the persisted session.");
			#[cfg(not(feature = "tracing"))]
			let _ = err;
		}

		self.signal.emit(reason, detail.clone());

		RefreshFailure::Expired { reason: detail }
	}
}

enum RefreshCall {
	TimedOut(Duration),
	Failed(Error),
}

/// How a refresh that did not install a new session is reported to each waiter.
enum RefreshFailure {
	Expired { reason: String },
	TimedOut { after: Duration },
}
impl RefreshFailure {
	fn to_error(&self) -> Error {
		match self {
			Self::Expired { reason } => Error::SessionExpired { reason: reason.clone() },
			Self::TimedOut { after } => Error::RefreshTimedOut { after: *after },
		}
	}
}

fn outcome_of<T, E>(result: &Result<T, E>) -> OpOutcome {
	if result.is_ok() { OpOutcome::Success } else { OpOutcome::Failure }
}
