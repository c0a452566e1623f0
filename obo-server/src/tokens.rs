//! Token issuer and verifier
//!
//! Mints and validates the delegated-access token: a signed, self-contained
//! JWT carrying the subject user, the acting client, the granted scope
//! subset, and an absolute expiry. Verification is hybrid: the signature and
//! expiry are checked statelessly, then the registry and grant store are
//! consulted on every call so client or grant revocation cuts access
//! immediately instead of at token expiry.
//!
//! The same service owns opaque first-party session tokens, which the
//! out-of-scope login layer issues through it and which double as subject
//! tokens at the exchange endpoint.

use crate::config::TokenConfig;
use crate::errors::AuthError;
use crate::grants::GrantService;
use crate::models::{ActorClient, Principal, RequestAuthContext};
use crate::registry::ClientRegistry;
use crate::scopes;
use crate::store::{AuthStore, SessionRecord, Store};
use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::Utc;
use jsonwebtoken::{
    Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode, errors::ErrorKind,
};
use rand::RngCore;
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

/// Clock skew tolerated when validating expiry.
const LEEWAY_SECS: u64 = 5;

const SESSION_TOKEN_LEN: usize = 32;

/// Claims embedded in a delegated-access token. The actor claim follows
/// RFC 8693: the token's subject is the user, `act` names the client acting
/// on their behalf.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DelegatedClaims {
    pub iss: String,
    /// Subject user id
    pub sub: String,
    /// Acting client
    pub act: ActorClaim,
    /// Space-delimited granted scopes
    pub scope: String,
    pub iat: i64,
    pub exp: i64,
    pub jti: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActorClaim {
    pub client_id: String,
}

/// A freshly minted token with the scope set actually embedded.
#[derive(Debug, Clone)]
pub struct MintedToken {
    pub token: String,
    pub scopes: Vec<String>,
    pub expires_in: u64,
}

/// A verified token: the request context to act on plus the raw claims for
/// introspection.
#[derive(Debug, Clone)]
pub struct VerifiedToken {
    pub context: RequestAuthContext,
    pub claims: DelegatedClaims,
}

pub struct TokenService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
    issuer: String,
    default_ttl_secs: u64,
    max_ttl_secs: u64,
    store: Arc<Store>,
    registry: ClientRegistry,
    grants: GrantService,
}

impl TokenService {
    pub fn new(
        config: &TokenConfig,
        store: Arc<Store>,
        registry: ClientRegistry,
        grants: GrantService,
    ) -> Self {
        let secret: Vec<u8> = match &config.signing_key {
            Some(key) => key.as_bytes().to_vec(),
            None => {
                log::warn!(
                    "OBO_TOKEN_SIGNING_KEY is not set, using an ephemeral key; \
                     delegated tokens will not survive a restart"
                );
                let mut bytes = [0u8; 32];
                OsRng.fill_bytes(&mut bytes);
                bytes.to_vec()
            }
        };

        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[&config.issuer]);
        validation.validate_exp = true;
        validation.leeway = LEEWAY_SECS;
        validation.required_spec_claims =
            ["exp", "iss", "sub"].iter().map(|s| s.to_string()).collect();

        Self {
            encoding_key: EncodingKey::from_secret(&secret),
            decoding_key: DecodingKey::from_secret(&secret),
            validation,
            issuer: config.issuer.clone(),
            default_ttl_secs: config.ttl_secs,
            max_ttl_secs: config.max_ttl_secs,
            store,
            registry,
            grants,
        }
    }

    /// TTL the exchange endpoint applies when the caller does not choose one.
    pub fn default_ttl_secs(&self) -> u64 {
        self.default_ttl_secs
    }

    /// Mints a delegated token for `actor_client_id` to act as `user_id`.
    ///
    /// Preconditions, in order: the client exists and is active; every
    /// requested scope is within the client's registration (a scope error
    /// otherwise); an active grant covers all requested scopes
    /// (ConsentRequired otherwise); the TTL is within bounds. The token
    /// embeds exactly the requested scopes, never more.
    pub async fn mint(
        &self,
        user_id: &str,
        actor_client_id: &str,
        requested_scopes: &[String],
        ttl_secs: u64,
    ) -> Result<MintedToken, AuthError> {
        let client = self.registry.get_client(actor_client_id).await?;
        if !client.lifecycle.is_active() {
            return Err(AuthError::Revoked);
        }

        let requested = scopes::normalize(requested_scopes);
        if requested.is_empty() {
            return Err(AuthError::Scope { scopes: vec![] });
        }
        let outside_registration = scopes::missing_from(&requested, &client.scopes);
        if !outside_registration.is_empty() {
            return Err(AuthError::Scope {
                scopes: outside_registration,
            });
        }

        let grant = self
            .grants
            .find_active(user_id, actor_client_id)
            .await?
            .ok_or(AuthError::ConsentRequired)?;
        if !scopes::missing_from(&requested, &grant.scopes).is_empty() {
            return Err(AuthError::ConsentRequired);
        }

        if ttl_secs == 0 || ttl_secs > self.max_ttl_secs {
            return Err(AuthError::InvalidTtl {
                requested: ttl_secs,
                max: self.max_ttl_secs,
            });
        }

        let now = Utc::now();
        let claims = DelegatedClaims {
            iss: self.issuer.clone(),
            sub: user_id.to_string(),
            act: ActorClaim {
                client_id: actor_client_id.to_string(),
            },
            scope: scopes::join_scopes(&requested),
            iat: now.timestamp(),
            exp: now.timestamp() + ttl_secs as i64,
            jti: Uuid::new_v4().to_string(),
        };
        let token = self.sign(&claims)?;
        self.spawn_touch(&grant.id);

        log::info!(
            "minted token for user {} via client {} with scopes [{}]",
            user_id,
            actor_client_id,
            claims.scope
        );
        Ok(MintedToken {
            token,
            scopes: requested,
            expires_in: ttl_secs,
        })
    }

    /// Verifies a delegated token and rebuilds the request context.
    ///
    /// After the stateless signature and expiry checks, the acting client and
    /// the (user, client) grant are re-read from the store. A revoked client
    /// or a missing active grant invalidates the token immediately. The
    /// effective scopes are the intersection of the embedded set with the
    /// grant's current set, so a narrowed re-consent applies to tokens minted
    /// before it.
    pub async fn verify(&self, token: &str) -> Result<VerifiedToken, AuthError> {
        let data = decode::<DelegatedClaims>(token, &self.decoding_key, &self.validation)
            .map_err(map_jwt_error)?;
        let claims = data.claims;

        let client = self.registry.get_client(&claims.act.client_id).await?;
        if !client.lifecycle.is_active() {
            return Err(AuthError::Revoked);
        }

        let grant = self
            .grants
            .find_active(&claims.sub, &claims.act.client_id)
            .await?
            .ok_or(AuthError::Revoked)?;

        let embedded = scopes::parse_scope_param(&claims.scope);
        let effective = scopes::intersect(&embedded, &grant.scopes);
        self.spawn_touch(&grant.id);

        // Delegated requests never carry administrative rights
        let context = RequestAuthContext::delegated(
            Principal {
                id: claims.sub.clone(),
                admin: false,
            },
            ActorClient {
                client_id: client.client_id.clone(),
                name: client.name.clone(),
            },
            effective,
        );
        Ok(VerifiedToken { context, claims })
    }

    /// Resolves a bearer credential into a request context: absent means
    /// anonymous, a structured token is verified as delegated, anything else
    /// is looked up as a first-party session.
    pub async fn resolve(&self, credential: Option<&str>) -> Result<RequestAuthContext, AuthError> {
        let credential = match credential {
            Some(credential) if !credential.is_empty() => credential,
            _ => return Ok(RequestAuthContext::anonymous()),
        };
        if credential.contains('.') {
            let verified = self.verify(credential).await?;
            Ok(verified.context)
        } else {
            let session = self.resolve_session(credential).await?;
            Ok(RequestAuthContext::first_party(Principal {
                id: session.user_id,
                admin: session.admin,
            }))
        }
    }

    /// Issues an opaque session token for a first-party user. Called by the
    /// surrounding login layer, not exposed over HTTP here.
    pub async fn issue_session(&self, user_id: &str, admin: bool) -> Result<String, AuthError> {
        let token = generate_session_token();
        let record = SessionRecord {
            user_id: user_id.to_string(),
            admin,
        };
        self.store.put_session(&token, &record).await?;
        Ok(token)
    }

    /// Looks up a session token. Expired and unknown tokens are
    /// indistinguishable once the store TTL has dropped the record.
    pub async fn resolve_session(&self, token: &str) -> Result<SessionRecord, AuthError> {
        match self.store.get_session(token).await? {
            Some(record) => Ok(record),
            None => Err(AuthError::Expired),
        }
    }

    /// Drops a session, for the login layer's logout path.
    pub async fn revoke_session(&self, token: &str) -> Result<(), AuthError> {
        self.store.delete_session(token).await?;
        Ok(())
    }

    pub(crate) fn sign(&self, claims: &DelegatedClaims) -> Result<String, AuthError> {
        encode(&Header::default(), claims, &self.encoding_key)
            .map_err(|e| AuthError::Internal(format!("failed to sign token: {e}")))
    }

    /// Last-used stamping is off the request path on purpose.
    fn spawn_touch(&self, grant_id: &str) {
        let grants = self.grants.clone();
        let grant_id = grant_id.to_string();
        tokio::spawn(async move {
            grants.touch_last_used(&grant_id).await;
        });
    }
}

fn map_jwt_error(err: jsonwebtoken::errors::Error) -> AuthError {
    match err.kind() {
        ErrorKind::ExpiredSignature => AuthError::Expired,
        _ => AuthError::Malformed(err.to_string()),
    }
}

fn generate_session_token() -> String {
    let mut bytes = [0u8; SESSION_TOKEN_LEN];
    OsRng.fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}
