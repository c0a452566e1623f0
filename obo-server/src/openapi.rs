use crate::state::AppState;
use axum::{Json, Router, routing::get};
use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi};

pub(crate) const HEALTH_TAG: &str = "Health API";
pub(crate) const ME_TAG: &str = "Identity API";
pub(crate) const CLIENTS_TAG: &str = "Client Registry API";
pub(crate) const GRANTS_TAG: &str = "Consent API";
pub(crate) const OAUTH_TAG: &str = "OAuth API";

#[derive(OpenApi)]
#[openapi(
    paths(
        crate::api::health::health_check,
        crate::api::health::ready_check,
        crate::api::me::me,
        crate::api::clients::handlers::register_client,
        crate::api::clients::handlers::list_clients,
        crate::api::clients::handlers::get_client,
        crate::api::clients::handlers::update_client,
        crate::api::clients::handlers::rotate_secret,
        crate::api::clients::handlers::revoke_client,
        crate::api::clients::handlers::set_trust_level,
        crate::api::grants::handlers::record_consent,
        crate::api::grants::handlers::list_grants,
        crate::api::grants::handlers::revoke_grant,
        crate::api::oauth::handlers::list_scopes,
        crate::api::oauth::handlers::authorize,
        crate::api::oauth::handlers::token,
        crate::api::oauth::handlers::introspect,
    ),
    components(schemas(
        crate::api::health::Health,
        crate::api::me::MeResponse,
        crate::api::clients::models::RegisterClientRequest,
        crate::api::clients::models::UpdateClientRequest,
        crate::api::clients::models::ClientResponse,
        crate::api::clients::models::CreatedClientResponse,
        crate::api::clients::models::RotatedSecretResponse,
        crate::api::clients::models::TrustLevelRequest,
        crate::api::grants::models::ConsentRequest,
        crate::api::grants::models::GrantResponse,
        crate::api::oauth::models::AuthorizeContext,
        crate::api::oauth::models::TokenExchangeRequest,
        crate::api::oauth::models::TokenExchangeResponse,
        crate::api::oauth::models::IntrospectionRequest,
        crate::api::oauth::models::IntrospectionResponse,
        crate::api::oauth::models::OAuthError,
        crate::models::ActorClient,
        crate::models::TrustLevel,
        crate::scopes::ScopeDescriptor,
        crate::scopes::ScopeGroup,
    )),
    modifiers(&SecurityAddon),
    tags(
        (name = HEALTH_TAG, description = "Health check endpoints"),
        (name = ME_TAG, description = "Authenticated identity endpoints"),
        (name = CLIENTS_TAG, description = "Service client registry endpoints"),
        (name = GRANTS_TAG, description = "User consent grant endpoints"),
        (name = OAUTH_TAG, description = "Token exchange and introspection endpoints"),
    ),
    info(
        title = "OBO Authorization Server API",
        description = "Multi-tenant delegated access for service clients",
        version = "0.1.0"
    )
)]
pub(crate) struct ApiDoc;

/// Registers the bearer scheme referenced by the protected operations
struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer",
                SecurityScheme::Http(
                    HttpBuilder::new().scheme(HttpAuthScheme::Bearer).build(),
                ),
            );
        }
    }
}

/// Handler for the OpenAPI JSON specification endpoint
async fn openapi_json_handler() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}

/// Creates a router for OpenAPI documentation routes
pub(crate) fn router() -> Router<AppState> {
    Router::new().route("/openapi.json", get(openapi_json_handler))
}
