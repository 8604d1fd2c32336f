//! Authenticated request gateway for the portfolio dashboard API.
//!
//! Bearer tokens go out on every request. When they expire, one coordinated refresh runs and
//! everything that failed in the meantime is replayed in order; when the refresh token is gone,
//! subscribers hear that the session ended.

#![deny(clippy::all, missing_docs, unused_crate_dependencies)]

pub mod auth;
pub mod config;
pub mod error;
pub mod gateway;
pub mod obs;
pub mod session;
pub mod store;
pub mod transport;
#[cfg(all(any(test, feature = "test"), feature = "reqwest"))]
pub mod _preludet {
	//! Convenience re-exports and helpers for integration tests; enabled via `cfg(test)` or the
	//! `test` crate feature.

	pub use crate::_prelude::*;

	// self
	use crate::{
		config::GatewayConfig,
		gateway::{Gateway, ReqwestGateway},
		session::{Session, TokenGrant, UserIdentity},
		store::{KeyValueStore, MemoryStore, SessionStore},
		transport::ReqwestTransport,
	};

	/// Store scope used by the reqwest-backed integration tests.
	pub const TEST_STORE_SCOPE: &str = "portfolio-test";

	/// Builds a config pointing at `base_url` with the integration-test store scope.
	pub fn test_config(base_url: &str) -> GatewayConfig {
		let base_url = Url::parse(base_url).expect("Test base URL should parse.");

		GatewayConfig::new(base_url).with_store_scope(TEST_STORE_SCOPE)
	}

	/// Constructs a reqwest-backed [`Gateway`] over a fresh in-memory store.
	pub async fn build_reqwest_test_gateway(
		config: GatewayConfig,
		seed: Option<Session>,
	) -> (ReqwestGateway, Arc<MemoryStore>) {
		let backend = Arc::new(MemoryStore::default());

		if let Some(session) = seed {
			SessionStore::new(backend.clone(), &config.store_scope)
				.save(&session)
				.await
				.expect("Seeding the test session should succeed.");
		}

		let store: Arc<dyn KeyValueStore> = backend.clone();
		let gateway = Gateway::connect(config, ReqwestTransport::default(), store)
			.await
			.expect("Failed to build reqwest test gateway.");

		(gateway, backend)
	}

	/// Builds a session fixture that expires `expires_in` from now.
	pub fn test_session(access: &str, refresh: Option<&str>, expires_in: Duration) -> Session {
		let grant = TokenGrant {
			access_token: access.into(),
			refresh_token: refresh.map(Into::into),
			expires_in: expires_in.whole_seconds(),
			user: UserIdentity::new("user-1"),
		};

		Session::from_grant(grant, OffsetDateTime::now_utc())
			.expect("Session fixture should build successfully.")
	}
}

mod _prelude {
	pub use std::{
		collections::{HashMap, VecDeque},
		error::Error as StdError,
		fmt::{Debug, Display, Formatter, Result as FmtResult},
		future::Future,
		pin::Pin,
		sync::Arc,
	};

	pub use async_lock::Mutex as AsyncMutex;
	pub use parking_lot::{Mutex, RwLock};
	#[cfg(feature = "reqwest")]
	pub use reqwest::{Client as ReqwestClient, Error as ReqwestError};
	pub use serde::{Deserialize, Serialize};
	pub use thiserror::Error as ThisError;
	pub use time::{Duration, OffsetDateTime};
	pub use url::Url;

	pub use crate::error::{Error, Result};
}

pub use http;
#[cfg(feature = "reqwest")] pub use reqwest;
pub use url;
#[cfg(test)] use {color_eyre as _, httpmock as _};
