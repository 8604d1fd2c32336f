// crates.io
use httpmock::prelude::*;
use serde_json::{Value, json};
// self
use portfolio_gateway::{
	_preludet::*,
	gateway::SessionEndReason,
	session::{LoginCredentials, TokenSecret},
};

fn refresh_grant() -> Value {
	json!({
		"access_token": "new-token",
		"refresh_token": "refresh-2",
		"expires_in": 1800,
		"user": { "id": 42, "email": "analyst@fund.example" }
	})
}

#[tokio::test]
async fn expired_token_is_refreshed_and_request_replayed() {
	let server = MockServer::start_async().await;
	let seed = test_session("expired-token", Some("refresh-1"), Duration::minutes(5));
	let (gateway, store) =
		build_reqwest_test_gateway(test_config(&server.url("/api/")), Some(seed)).await;
	let rejected = server
		.mock_async(|when, then| {
			when.method(GET).path("/api/holdings").header("authorization", "Bearer expired-token");
			then.status(401).json_body(json!({ "detail": "Token expired" }));
		})
		.await;
	let refresh = server
		.mock_async(|when, then| {
			when.method(POST)
				.path("/api/auth/refresh")
				.json_body(json!({ "refresh_token": "refresh-1" }));
			then.status(200).json_body(refresh_grant());
		})
		.await;
	let accepted = server
		.mock_async(|when, then| {
			when.method(GET).path("/api/holdings").header("authorization", "Bearer new-token");
			then.status(200).json_body(json!([{ "fund": "Fund IV", "nav": 1250000.0 }]));
		})
		.await;
	let holdings = gateway
		.get_json::<Value>("holdings")
		.await
		.expect("Request should succeed after the refresh.");

	rejected.assert_async().await;
	refresh.assert_async().await;
	accepted.assert_async().await;

	assert_eq!(holdings[0]["fund"], "Fund IV");

	let session = gateway.session().expect("Refreshed session should be installed.");

	assert_eq!(session.access_token.expose(), "new-token");
	assert_eq!(session.refresh_token.as_ref().map(TokenSecret::expose), Some("refresh-2"));
	assert_eq!(session.user.id, "42");
	assert_eq!(
		store.get(&format!("{TEST_STORE_SCOPE}.access_token")).as_deref(),
		Some("new-token"),
	);
}

#[tokio::test]
async fn rejected_refresh_ends_session() {
	let server = MockServer::start_async().await;
	let seed = test_session("expired-token", Some("refresh-revoked"), Duration::minutes(5));
	let (gateway, store) =
		build_reqwest_test_gateway(test_config(&server.url("/api/")), Some(seed)).await;
	let mut events = gateway.subscribe();
	let rejected = server
		.mock_async(|when, then| {
			when.method(GET).path("/api/investments");
			then.status(401);
		})
		.await;
	let refresh = server
		.mock_async(|when, then| {
			when.method(POST).path("/api/auth/refresh");
			then.status(401).json_body(json!({ "detail": "Refresh token expired" }));
		})
		.await;
	let err = gateway.get("investments").await.expect_err("The session should end.");

	rejected.assert_calls_async(1).await;
	refresh.assert_calls_async(1).await;

	assert!(matches!(
		err,
		Error::SessionExpired { ref reason } if reason.contains("Refresh token expired")
	));
	assert!(store.is_empty());
	assert!(gateway.session().is_none());

	let event = events.try_recv().expect("Session-ended event should be emitted.");

	assert_eq!(event.reason, SessionEndReason::RefreshRejected);
	assert_eq!(gateway.sessions_ended(), 1);
}

#[tokio::test]
async fn login_posts_credentials_and_persists_session() {
	let server = MockServer::start_async().await;
	let (gateway, store) = build_reqwest_test_gateway(test_config(&server.url("/api")), None).await;
	let login = server
		.mock_async(|when, then| {
			when.method(POST)
				.path("/api/auth/login")
				.header("content-type", "application/json")
				.json_body(json!({ "email": "analyst@fund.example", "password": "hunter2" }));
			then.status(200).json_body(json!({
				"access_token": "login-token",
				"refresh_token": "login-refresh",
				"expires_in": 900,
				"user": { "id": "user-7", "name": "Analyst" }
			}));
		})
		.await;
	let session = gateway
		.login(&LoginCredentials::new("analyst@fund.example", "hunter2"))
		.await
		.expect("Login should succeed.");

	login.assert_async().await;

	assert_eq!(session.access_token.expose(), "login-token");
	assert_eq!(session.user.name.as_deref(), Some("Analyst"));
	assert!(session.expires_at > OffsetDateTime::now_utc() + Duration::minutes(14));
	assert_eq!(store.len(), 4);
	assert_eq!(
		store.get(&format!("{TEST_STORE_SCOPE}.refresh_token")).as_deref(),
		Some("login-refresh"),
	);
}

#[tokio::test]
async fn rejected_login_reports_invalid_grant() {
	let server = MockServer::start_async().await;
	let (gateway, store) =
		build_reqwest_test_gateway(test_config(&server.url("/api/")), None).await;
	let login = server
		.mock_async(|when, then| {
			when.method(POST).path("/api/auth/login");
			then.status(401).json_body(json!({ "detail": "Invalid credentials" }));
		})
		.await;
	let err = gateway
		.login(&LoginCredentials::new("analyst@fund.example", "wrong"))
		.await
		.expect_err("Login should be rejected.");

	login.assert_async().await;

	assert!(matches!(err, Error::InvalidGrant { ref reason } if reason == "Invalid credentials"));
	assert!(store.is_empty());
	assert!(!gateway.is_authenticated());
}
