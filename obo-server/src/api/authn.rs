use crate::models::RequestAuthContext;
use crate::state::AppState;
use axum::{
    Json,
    body::Body,
    extract::{FromRequestParts, Request, State},
    http::{StatusCode, header, request::Parts},
    middleware::Next,
    response::{IntoResponse, Response},
};
use log::warn;
use serde_json::json;

/// Resolves the bearer credential on every protected request and injects the
/// resulting [`RequestAuthContext`] into the request extensions. Opaque
/// session tokens and delegated tokens both enter here; the token service
/// tells them apart. An absent header resolves to the anonymous context and
/// operations needing a user reject it downstream. A credential that is
/// present but invalid is a 401 here, never a downgrade to anonymous.
pub(super) async fn authentication_middleware(
    State(state): State<AppState>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    let credential = match bearer_credential(&request) {
        Ok(credential) => credential,
        Err(response) => return response,
    };

    let context = match state.tokens.resolve(credential.as_deref()).await {
        Ok(context) => context,
        Err(err) if err.is_transient() => {
            warn!("Credential check unavailable: {}", err);
            return err.into_response();
        }
        Err(err) => {
            warn!("Rejected bearer credential: {}", err);
            return challenge(err.to_string());
        }
    };

    request.extensions_mut().insert(context);
    next.run(request).await
}

fn bearer_credential(request: &Request<Body>) -> Result<Option<String>, Response> {
    let header = match request.headers().get(header::AUTHORIZATION) {
        Some(header) => header,
        None => return Ok(None),
    };
    match header.to_str() {
        Ok(header_str) if header_str.to_lowercase().starts_with("bearer ") => {
            let credential = header_str[7..].trim();
            if credential.is_empty() {
                warn!("Empty bearer credential");
                return Err(challenge("missing bearer credential".to_string()));
            }
            Ok(Some(credential.to_string()))
        }
        Ok(_) => {
            warn!("Authorization header is missing the 'Bearer ' prefix");
            Err(challenge(
                "expected a bearer Authorization header".to_string(),
            ))
        }
        Err(e) => {
            warn!("Failed to parse Authorization header to string: {}", e);
            Err(challenge(
                "Authorization header is not valid ASCII".to_string(),
            ))
        }
    }
}

/// 401 with the challenge header RFC 6750 requires alongside it.
fn challenge(detail: String) -> Response {
    let mut response =
        (StatusCode::UNAUTHORIZED, Json(json!({ "detail": detail }))).into_response();
    response.headers_mut().insert(
        header::WWW_AUTHENTICATE,
        header::HeaderValue::from_static("Bearer"),
    );
    response
}

/// Handlers extract the context the middleware injected. Routes outside the
/// protected layer see an anonymous context instead of a missing extension.
impl<S> FromRequestParts<S> for RequestAuthContext
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(parts
            .extensions
            .get::<RequestAuthContext>()
            .cloned()
            .unwrap_or_else(RequestAuthContext::anonymous))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::tests::create_test_state;
    use axum::Router;
    use axum::routing::get;
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    const TEST_ROUTE: &'static str = "/test";

    async fn whoami(context: RequestAuthContext) -> String {
        let user = context.user.as_ref().map(|u| u.id.as_str()).unwrap_or("-");
        match &context.actor {
            Some(actor) => format!("{} via {}", user, actor.client_id),
            None => user.to_string(),
        }
    }

    fn setup_authn_mock_app(state: &AppState) -> Router {
        Router::new()
            .route(TEST_ROUTE, get(whoami))
            .layer(axum::middleware::from_fn_with_state(
                state.clone(),
                authentication_middleware,
            ))
            .with_state(state.clone())
    }

    async fn send_request(app: &Router, auth_header: Option<&str>) -> (StatusCode, bool, String) {
        let mut request_builder = Request::builder().uri(TEST_ROUTE);

        if let Some(auth) = auth_header {
            request_builder = request_builder.header("Authorization", auth);
        }

        let request = request_builder
            .body(Body::empty())
            .expect("Failed to build request");

        let response = app
            .clone()
            .oneshot(request)
            .await
            .expect("Failed to send request");

        let status = response.status();
        let challenged = response.headers().contains_key("WWW-Authenticate");
        let body_bytes = response
            .into_body()
            .collect()
            .await
            .expect("Failed to read response body")
            .to_bytes();

        let body = String::from_utf8(body_bytes.to_vec())
            .expect("Failed to convert response body to string");

        (status, challenged, body)
    }

    #[tokio::test]
    async fn test_session_credential_is_accepted() {
        let state = create_test_state();
        let app = setup_authn_mock_app(&state);
        let token = state.tokens.issue_session("user-1", false).await.unwrap();

        let (status, _, body) = send_request(&app, Some(&format!("Bearer {}", token))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "user-1");
    }

    #[tokio::test]
    async fn test_missing_header_resolves_to_anonymous() {
        let state = create_test_state();
        let app = setup_authn_mock_app(&state);

        let (status, _, body) = send_request(&app, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "-");
    }

    #[tokio::test]
    async fn test_non_bearer_scheme_is_rejected() {
        let state = create_test_state();
        let app = setup_authn_mock_app(&state);

        // A present but unusable credential is never downgraded to anonymous
        for header in ["Basic dXNlcjpwYXNz", "some-raw-token", "Bearer "] {
            let (status, challenged, _) = send_request(&app, Some(header)).await;
            assert_eq!(status, StatusCode::UNAUTHORIZED, "header {:?}", header);
            assert!(challenged);
        }
    }

    #[tokio::test]
    async fn test_unknown_session_token_is_rejected() {
        let state = create_test_state();
        let app = setup_authn_mock_app(&state);

        let (status, challenged, _) = send_request(&app, Some("Bearer not-a-session")).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert!(challenged);
    }

    #[tokio::test]
    async fn test_garbage_jwt_is_rejected() {
        let state = create_test_state();
        let app = setup_authn_mock_app(&state);

        let (status, _, body) = send_request(&app, Some("Bearer a.b.c")).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert!(body.contains("malformed token"));
    }
}
