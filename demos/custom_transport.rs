//! Demonstrates driving the gateway through a custom transport and Auth Service.
//!
//! 1. Implement [`HttpTransport`] for whatever HTTP stack the shell already owns. Here it is an
//!    in-process fake API that only accepts the newest access token.
//! 2. Implement [`AuthService`] for the login and refresh calls.
//! 3. Hand both to [`Gateway::builder`] together with a [`KeyValueStore`].
//! 4. Expire the token on the server side and fire several requests at once: they all recover
//!    through one refresh call and come back in the order they failed.

// std
use std::{
	convert::Infallible,
	sync::{
		Arc,
		atomic::{AtomicU32, Ordering},
	},
};
// crates.io
use color_eyre::Result;
use parking_lot::Mutex;
use serde::Deserialize;
use url::Url;
// self
use portfolio_gateway::{
	auth::{AuthFuture, AuthService},
	config::GatewayConfig,
	gateway::Gateway,
	http::{StatusCode, header::AUTHORIZATION},
	session::{LoginCredentials, TokenGrant, TokenSecret, UserIdentity},
	store::{KeyValueStore, MemoryStore},
	transport::{ApiRequest, ApiResponse, HttpTransport, TransportFuture},
};

#[derive(Debug, Deserialize)]
struct Investment {
	name: String,
	commitment: f64,
}

/// Fake API that accepts exactly one bearer token at a time.
#[derive(Debug, Default)]
struct FakeApi {
	accepted: Mutex<String>,
}
impl FakeApi {
	fn accept(&self, token: &str) {
		*self.accepted.lock() = format!("Bearer {token}");
	}
}
impl HttpTransport for FakeApi {
	type TransportError = Infallible;

	fn execute(&self, request: ApiRequest) -> TransportFuture<'_, Self::TransportError> {
		Box::pin(async move {
			let authorized = request
				.headers
				.get(AUTHORIZATION)
				.and_then(|value| value.to_str().ok())
				.is_some_and(|value| value == *self.accepted.lock());

			if !authorized {
				return Ok(ApiResponse::new(StatusCode::UNAUTHORIZED, Vec::new()));
			}

			let name = request.url.path().rsplit('/').next().unwrap_or_default().to_owned();
			let body = serde_json::json!({ "name": name, "commitment": 2_500_000.0 });

			Ok(ApiResponse::new(StatusCode::OK, body.to_string()))
		})
	}
}

/// Auth Service that mints numbered tokens and tells the fake API about them.
struct FakeAuth {
	api: Arc<FakeApi>,
	issued: AtomicU32,
}
impl FakeAuth {
	fn mint(&self, refresh_token: Option<&str>) -> TokenGrant {
		let n = self.issued.fetch_add(1, Ordering::SeqCst) + 1;
		let access = format!("access-{n}");

		self.api.accept(&access);

		TokenGrant {
			access_token: access.into(),
			refresh_token: refresh_token.map(Into::into),
			expires_in: 900,
			user: UserIdentity::new("user-1").with_name("Demo Analyst"),
		}
	}
}
impl AuthService for FakeAuth {
	fn login<'a>(&'a self, credentials: &'a LoginCredentials) -> AuthFuture<'a> {
		Box::pin(async move {
			println!("login as {}", credentials.email);

			Ok(self.mint(Some("refresh-1")))
		})
	}

	fn refresh<'a>(&'a self, refresh_token: &'a TokenSecret) -> AuthFuture<'a> {
		Box::pin(async move {
			println!("refresh with {refresh_token}");

			// No rotation: the gateway keeps the previous refresh token.
			Ok(self.mint(None))
		})
	}
}

#[tokio::main]
async fn main() -> Result<()> {
	color_eyre::install()?;

	let api = Arc::new(FakeApi::default());
	let auth = Arc::new(FakeAuth { api: api.clone(), issued: AtomicU32::new(0) });
	let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::default());
	let config = GatewayConfig::new(Url::parse("https://portfolio.example.com/api/")?);
	let gateway = Gateway::<FakeApi>::builder(config, api.clone(), auth, store).build().await?;

	gateway.login(&LoginCredentials::new("analyst@fund.example", "hunter2")).await?;

	// Server-side expiry: the current token stops working.
	api.accept("nobody-has-this");

	let (a, b, c) = futures::join!(
		gateway.get_json::<Investment>("investments/alpha"),
		gateway.get_json::<Investment>("investments/beta"),
		gateway.get_json::<Investment>("investments/gamma"),
	);

	for investment in [a?, b?, c?] {
		println!("{} committed {:.0}", investment.name, investment.commitment);
	}

	let metrics = gateway.refresh_metrics();

	println!(
		"refresh attempts={} queued={} replayed={}",
		metrics.attempts(),
		metrics.queued(),
		metrics.replayed()
	);

	Ok(())
}
