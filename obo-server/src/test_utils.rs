use crate::api::clients::models::{ClientResponse, CreatedClientResponse};
use crate::api::oauth::models::{GRANT_TYPE_TOKEN_EXCHANGE, TOKEN_TYPE_ACCESS_TOKEN};
use crate::create_app;
use crate::state::AppState;
use axum::Router;
use axum::body::Body;
use http::{HeaderMap, Method, Request, StatusCode};
use http_body_util::BodyExt;
use log::LevelFilter;
use serde::{Serialize, de::DeserializeOwned};
use serde_json::{Value, json};
use tower::ServiceExt;

/// Test fixture bundling the app under test with ready-made identities.
///
/// Every fixture runs against its own in-memory store and its own signing
/// key, so tests never observe each other. Two sessions are issued up front:
/// `user_token` for a plain user and `admin_token` for an administrator.
///
/// # Examples
///
/// ```rust
/// #[tokio::test]
/// async fn test_endpoint() {
///     let fixture = TestFixture::new().await;
///
///     // Register a client owned by the default user and record consent
///     let (client, secret) = fixture.register_client(&["timelapse:read"]).await;
///     fixture.consent(&client.client_id, &["timelapse:read"]).await;
///
///     // Trade the user's session for a delegated token
///     let token = fixture.exchange(&client.client_id, &secret, None).await;
///
///     let response = fixture.get_as(&token, "/api/me").await;
///     response.assert_ok();
/// }
/// ```
pub struct TestFixture {
    /// The application router
    pub app: Router,
    /// Application state sharing the fixture's in-memory store
    pub state: AppState,
    /// Session token for "test-user"
    pub user_token: String,
    /// Session token for "test-admin", with the admin flag set
    pub admin_token: String,
}

impl TestFixture {
    pub async fn new() -> Self {
        let _ = env_logger::builder()
            .is_test(true)
            .filter_level(LevelFilter::Debug)
            .try_init();

        let state = crate::state::tests::create_test_state();
        let app = create_app(state.clone()).await;

        let user_token = state
            .tokens
            .issue_session("test-user", false)
            .await
            .expect("Failed to issue user session");
        let admin_token = state
            .tokens
            .issue_session("test-admin", true)
            .await
            .expect("Failed to issue admin session");

        Self {
            app,
            state,
            user_token,
            admin_token,
        }
    }

    /// Issues a session for an arbitrary user, for cross-user tests.
    pub async fn issue_session(&self, user_id: &str, admin: bool) -> String {
        self.state
            .tokens
            .issue_session(user_id, admin)
            .await
            .expect("Failed to issue session")
    }

    /// Creates a request builder with the JSON content type preset.
    pub fn request_builder(&self, method: Method, uri: impl AsRef<str>) -> http::request::Builder {
        Request::builder()
            .method(method)
            .uri(uri.as_ref())
            .header("Content-Type", "application/json")
    }

    fn bearer_builder(
        &self,
        method: Method,
        token: &str,
        uri: impl AsRef<str>,
    ) -> http::request::Builder {
        self.request_builder(method, uri)
            .header("Authorization", format!("Bearer {token}"))
    }

    /// Sends a GET request authenticated as the default user.
    pub async fn get(&self, uri: impl AsRef<str>) -> TestResponse {
        self.get_as(&self.user_token, uri).await
    }

    /// Sends a GET request authenticated with the given token.
    pub async fn get_as(&self, token: &str, uri: impl AsRef<str>) -> TestResponse {
        let request = self
            .bearer_builder(Method::GET, token, uri)
            .body(Body::empty())
            .expect("request build failed");
        self.send(request).await
    }

    /// Sends a GET request without any Authorization header.
    pub async fn get_anonymous(&self, uri: impl AsRef<str>) -> TestResponse {
        let request = self
            .request_builder(Method::GET, uri)
            .body(Body::empty())
            .expect("request build failed");
        self.send(request).await
    }

    /// Sends a POST request with a JSON body as the default user.
    pub async fn post<T: Serialize>(&self, uri: impl AsRef<str>, body: &T) -> TestResponse {
        self.post_as(&self.user_token, uri, body).await
    }

    pub async fn post_as<T: Serialize>(
        &self,
        token: &str,
        uri: impl AsRef<str>,
        body: &T,
    ) -> TestResponse {
        let json_body = serde_json::to_vec(body).expect("body serialization failed");
        let request = self
            .bearer_builder(Method::POST, token, uri)
            .body(Body::from(json_body))
            .expect("request build failed");
        self.send(request).await
    }

    /// Sends a POST request with a JSON body and no Authorization header.
    pub async fn post_anonymous<T: Serialize>(
        &self,
        uri: impl AsRef<str>,
        body: &T,
    ) -> TestResponse {
        let json_body = serde_json::to_vec(body).expect("body serialization failed");
        let request = self
            .request_builder(Method::POST, uri)
            .body(Body::from(json_body))
            .expect("request build failed");
        self.send(request).await
    }

    /// Sends an unauthenticated form-encoded POST, as OAuth clients do.
    pub async fn post_form(&self, uri: impl AsRef<str>, params: &[(&str, &str)]) -> TestResponse {
        let mut body = url::form_urlencoded::Serializer::new(String::new());
        for (name, value) in params {
            body.append_pair(name, value);
        }
        let request = Request::builder()
            .method(Method::POST)
            .uri(uri.as_ref())
            .header("Content-Type", "application/x-www-form-urlencoded")
            .body(Body::from(body.finish()))
            .expect("request build failed");
        self.send(request).await
    }

    pub async fn patch<T: Serialize>(&self, uri: impl AsRef<str>, body: &T) -> TestResponse {
        self.patch_as(&self.user_token, uri, body).await
    }

    pub async fn patch_as<T: Serialize>(
        &self,
        token: &str,
        uri: impl AsRef<str>,
        body: &T,
    ) -> TestResponse {
        let json_body = serde_json::to_vec(body).expect("body serialization failed");
        let request = self
            .bearer_builder(Method::PATCH, token, uri)
            .body(Body::from(json_body))
            .expect("request build failed");
        self.send(request).await
    }

    pub async fn put<T: Serialize>(&self, uri: impl AsRef<str>, body: &T) -> TestResponse {
        self.put_as(&self.user_token, uri, body).await
    }

    pub async fn put_as<T: Serialize>(
        &self,
        token: &str,
        uri: impl AsRef<str>,
        body: &T,
    ) -> TestResponse {
        let json_body = serde_json::to_vec(body).expect("body serialization failed");
        let request = self
            .bearer_builder(Method::PUT, token, uri)
            .body(Body::from(json_body))
            .expect("request build failed");
        self.send(request).await
    }

    pub async fn delete(&self, uri: impl AsRef<str>) -> TestResponse {
        self.delete_as(&self.user_token, uri).await
    }

    pub async fn delete_as(&self, token: &str, uri: impl AsRef<str>) -> TestResponse {
        let request = self
            .bearer_builder(Method::DELETE, token, uri)
            .body(Body::empty())
            .expect("request build failed");
        self.send(request).await
    }

    /// Dispatches a prepared request. The convenience helpers all end up
    /// here; call it directly when a test needs an unusual request shape.
    pub async fn send(&self, request: Request<Body>) -> TestResponse {
        let response = self
            .app
            .clone()
            .oneshot(request)
            .await
            .expect("request dispatch failed");

        let status = response.status();
        let headers = response.headers().clone();
        let body = response
            .into_body()
            .collect()
            .await
            .expect("body read failed")
            .to_bytes();

        // Empty and non-JSON bodies read as an empty object
        let json = serde_json::from_slice(&body).unwrap_or_else(|_| json!({}));

        TestResponse {
            status,
            headers,
            json,
        }
    }

    /// Registers a client named "Test Client" owned by the default user.
    ///
    /// Returns the public client record together with the one-time plaintext
    /// secret from the registration response.
    pub async fn register_client(&self, scopes: &[&str]) -> (ClientResponse, String) {
        let response = self
            .post(
                "/api/clients",
                &json!({
                    "name": "Test Client",
                    "homepage_url": "https://testclient.example.com",
                    "redirect_uris": ["https://testclient.example.com/callback"],
                    "scopes": scopes,
                }),
            )
            .await;
        response.assert_status(StatusCode::CREATED);
        let created = response.json_as::<CreatedClientResponse>();
        (created.client, created.client_secret)
    }

    /// Records the default user's consent for the given client and scopes.
    pub async fn consent(&self, client_id: &str, scopes: &[&str]) -> TestResponse {
        self.post(
            "/api/grants",
            &json!({
                "client_id": client_id,
                "scopes": scopes,
            }),
        )
        .await
    }

    /// Runs the token exchange for the default user and returns the
    /// delegated access token. Panics if the exchange is refused.
    pub async fn exchange(
        &self,
        client_id: &str,
        client_secret: &str,
        scope: Option<&str>,
    ) -> String {
        let mut params = vec![
            ("grant_type", GRANT_TYPE_TOKEN_EXCHANGE),
            ("client_id", client_id),
            ("client_secret", client_secret),
            ("subject_token", self.user_token.as_str()),
            ("subject_token_type", TOKEN_TYPE_ACCESS_TOKEN),
        ];
        if let Some(scope) = scope {
            params.push(("scope", scope));
        }
        let response = self.post_form("/oauth/token", &params).await;
        response.assert_ok();
        response.json["access_token"]
            .as_str()
            .expect("access_token missing from exchange response")
            .to_string()
    }
}

/// Captured response: status, headers, and the body parsed as JSON.
pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub json: Value,
}

impl TestResponse {
    /// True for 2xx responses.
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    /// Asserts the status code, printing the body on mismatch.
    pub fn assert_status(&self, expected: StatusCode) -> &Self {
        assert_eq!(
            self.status,
            expected,
            "expected {}, got {} with body {}",
            expected,
            self.status,
            serde_json::to_string_pretty(&self.json).unwrap_or_default()
        );
        self
    }

    pub fn assert_ok(&self) -> &Self {
        self.assert_status(StatusCode::OK)
    }

    /// Returns a response header as a string, if present.
    pub fn header(&self, name: &str) -> Option<String> {
        self.headers
            .get(name)
            .and_then(|value| value.to_str().ok())
            .map(|value| value.to_string())
    }

    /// Deserializes the JSON body into `T`, panicking when it does not fit.
    pub fn json_as<T: DeserializeOwned>(&self) -> T {
        serde_json::from_value(self.json.clone())
            .expect("response body did not match the expected shape")
    }
}
