//! Acting user and role resolution.
//!
//! A bearer token resolves to an [`Identity`]; the identity's profile row
//! resolves to a [`Session`] carrying the role. Anything that goes wrong on the
//! way to a role lands on [`Role::Staff`], the least-privileged default.

use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::StaticToken;
use crate::models::{NewProfile, Profile, Role, UserId};
use crate::store::{decode_row, to_row, Collection, DataStore, Query, StoreError};

/// Authenticated user, before any role lookup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    #[serde(rename = "id")]
    pub user_id: UserId,
    #[serde(default)]
    pub email: Option<String>,
}

/// The caller's bearer token, kept so data access can run as that user.
#[derive(Clone, PartialEq, Eq)]
pub struct AccessToken(String);

impl AccessToken {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("AccessToken(***)")
    }
}

/// Authenticated user with a resolved role.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Session {
    pub user_id: UserId,
    pub email: Option<String>,
    pub role: Role,
    pub display_name: Option<String>,
    #[serde(skip)]
    pub access_token: Option<AccessToken>,
}

impl Session {
    pub fn is_admin(&self) -> bool {
        self.role.is_admin()
    }

    pub fn with_access_token(mut self, token: AccessToken) -> Self {
        self.access_token = Some(token);
        self
    }
}

/// Resolve the role for `identity`, creating a staff profile on first sight.
///
/// Never fails: an unreadable profile, an unknown role string, or a failed
/// profile insert all resolve to staff.
pub async fn resolve_session<S: DataStore>(store: &S, identity: Identity) -> Session {
    let profile = match fetch_profile(store, &identity.user_id).await {
        Ok(profile) => profile,
        Err(e) => {
            tracing::warn!(user_id = %identity.user_id, error = %e, "Profile unreadable, using staff role");
            return staff_session(identity, None);
        }
    };

    match profile {
        Some(profile) => {
            let role = Role::resolve(profile.role.as_deref());
            Session {
                display_name: profile.display_name.or_else(|| identity.email.clone()),
                user_id: identity.user_id,
                email: identity.email,
                role,
                access_token: None,
            }
        }
        None => {
            if let Err(e) = ensure_profile(store, &identity).await {
                if e.is_unique_violation() {
                    tracing::debug!(user_id = %identity.user_id, "Profile created concurrently");
                } else {
                    tracing::warn!(user_id = %identity.user_id, error = %e, "Failed to create profile");
                }
            }
            let display_name = identity.email.clone();
            staff_session(identity, display_name)
        }
    }
}

async fn fetch_profile<S: DataStore>(
    store: &S,
    user_id: &UserId,
) -> Result<Option<Profile>, StoreError> {
    let query = Query::new(Collection::Profiles).eq("id", user_id);
    match store.select_optional(&query).await? {
        Some(row) => Ok(Some(decode_row(Collection::Profiles, row)?)),
        None => Ok(None),
    }
}

async fn ensure_profile<S: DataStore>(store: &S, identity: &Identity) -> Result<(), StoreError> {
    let profile = NewProfile {
        id: identity.user_id.clone(),
        role: Role::Staff.as_str(),
        display_name: identity.email.clone(),
    };
    store
        .insert(Collection::Profiles, to_row(Collection::Profiles, &profile)?)
        .await?;
    tracing::info!(user_id = %identity.user_id, "Created staff profile");
    Ok(())
}

fn staff_session(identity: Identity, display_name: Option<String>) -> Session {
    Session {
        user_id: identity.user_id,
        email: identity.email,
        role: Role::Staff,
        display_name,
        access_token: None,
    }
}

// ═══════════════════════════════════════════════════════════
// Bearer token authentication
// ═══════════════════════════════════════════════════════════

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("Authentication required")]
    Unauthorized,
    #[error("Identity provider unreachable: {0}")]
    Transport(String),
}

/// Hash a bearer token string using SHA-256.
pub fn hash_token(token: &str) -> [u8; 32] {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hasher.finalize().into()
}

/// Pre-shared tokens, stored hashed.
#[derive(Debug, Default)]
pub struct TokenRegistry {
    identities: HashMap<[u8; 32], Identity>,
}

impl TokenRegistry {
    pub fn new(tokens: &[StaticToken]) -> Self {
        let identities = tokens
            .iter()
            .map(|t| {
                (
                    hash_token(&t.token),
                    Identity {
                        user_id: UserId::new(t.user_id.clone()),
                        email: t.email.clone(),
                    },
                )
            })
            .collect();
        Self { identities }
    }

    pub fn lookup(&self, token: &str) -> Option<&Identity> {
        self.identities.get(&hash_token(token))
    }

    pub fn len(&self) -> usize {
        self.identities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.identities.is_empty()
    }
}

/// Hosted identity provider: `GET {base}/auth/v1/user` with the caller's token.
pub struct RemoteAuth {
    base_url: String,
    api_key: String,
    client: reqwest::Client,
}

impl RemoteAuth {
    pub fn new(base_url: &str, api_key: &str, timeout_secs: u64) -> Result<Self, AuthError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| AuthError::Transport(format!("HTTP client error: {e}")))?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            client,
        })
    }

    async fn user(&self, token: &str) -> Result<Identity, AuthError> {
        let url = format!("{}/auth/v1/user", self.base_url);
        let response = self
            .client
            .get(&url)
            .header("apikey", &self.api_key)
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| AuthError::Transport(e.to_string()))?;

        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN
        {
            return Err(AuthError::Unauthorized);
        }
        if !status.is_success() {
            return Err(AuthError::Transport(format!(
                "identity provider returned status {}",
                status.as_u16()
            )));
        }

        let identity: Identity = response
            .json()
            .await
            .map_err(|e| AuthError::Transport(format!("Invalid user payload: {e}")))?;
        if identity.user_id.as_str().trim().is_empty() {
            return Err(AuthError::Unauthorized);
        }
        Ok(identity)
    }
}

/// Turns a bearer token into an [`Identity`].
pub enum Authenticator {
    Tokens(TokenRegistry),
    Remote(RemoteAuth),
}

impl Authenticator {
    pub async fn authenticate(&self, token: &str) -> Result<Identity, AuthError> {
        if token.trim().is_empty() {
            return Err(AuthError::Unauthorized);
        }
        match self {
            Authenticator::Tokens(registry) => {
                registry.lookup(token).cloned().ok_or(AuthError::Unauthorized)
            }
            Authenticator::Remote(remote) => remote.user(token).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::testing::{memory_store, ScriptedStore};
    use axum::http::{HeaderMap, StatusCode};
    use axum::routing::get;
    use axum::{Json, Router};
    use serde_json::json;

    fn identity(id: &str, email: Option<&str>) -> Identity {
        Identity {
            user_id: UserId::new(id),
            email: email.map(String::from),
        }
    }

    async fn seed_profile<S: DataStore>(store: &S, id: &str, role: &str, name: Option<&str>) {
        let mut row = crate::store::Row::new();
        row.insert("id".into(), json!(id));
        row.insert("role".into(), json!(role));
        row.insert("display_name".into(), json!(name));
        store.insert(Collection::Profiles, row).await.unwrap();
    }

    #[tokio::test]
    async fn first_login_creates_staff_profile() {
        let store = memory_store();
        let session = resolve_session(&store, identity("u-1", Some("desk@clinic.test"))).await;

        assert_eq!(session.role, Role::Staff);
        assert_eq!(session.display_name.as_deref(), Some("desk@clinic.test"));

        let profile = fetch_profile(&store, &UserId::new("u-1")).await.unwrap().unwrap();
        assert_eq!(profile.role.as_deref(), Some("staff"));
        assert_eq!(profile.display_name.as_deref(), Some("desk@clinic.test"));
    }

    #[tokio::test]
    async fn admin_profile_resolves_admin() {
        let store = memory_store();
        seed_profile(&store, "u-1", "admin", Some("Dr Admin")).await;

        let session = resolve_session(&store, identity("u-1", None)).await;
        assert!(session.is_admin());
        assert_eq!(session.display_name.as_deref(), Some("Dr Admin"));
    }

    #[tokio::test]
    async fn unknown_role_is_staff() {
        let store = memory_store();
        seed_profile(&store, "u-1", "superuser", None).await;

        let session = resolve_session(&store, identity("u-1", Some("x@y.z"))).await;
        assert_eq!(session.role, Role::Staff);
        assert_eq!(session.display_name.as_deref(), Some("x@y.z"));
    }

    #[tokio::test]
    async fn second_login_does_not_insert_again() {
        let store = ScriptedStore::new(memory_store());
        resolve_session(&store, identity("u-1", None)).await;
        let after_first = store.calls();
        resolve_session(&store, identity("u-1", None)).await;
        assert_eq!(after_first, 2, "lookup + insert");
        assert_eq!(store.calls() - after_first, 1, "lookup only");
    }

    #[tokio::test]
    async fn failed_profile_insert_still_resolves_staff() {
        let store = ScriptedStore::new(memory_store());
        store.fail_inserts_into(Collection::Profiles);

        let session = resolve_session(&store, identity("u-1", None)).await;
        assert_eq!(session.role, Role::Staff);
    }

    #[test]
    fn access_token_is_not_printed_or_serialized() {
        let session = staff_session(identity("u-1", None), None)
            .with_access_token(AccessToken::new("user-jwt"));
        assert!(!format!("{session:?}").contains("user-jwt"));
        let json = serde_json::to_value(&session).unwrap();
        assert!(json.get("access_token").is_none());
        assert_eq!(session.access_token.unwrap().as_str(), "user-jwt");
    }

    #[test]
    fn hash_token_is_deterministic() {
        assert_eq!(hash_token("abc"), hash_token("abc"));
        assert_ne!(hash_token("abc"), hash_token("abd"));
    }

    #[tokio::test]
    async fn static_tokens_authenticate() {
        let auth = Authenticator::Tokens(TokenRegistry::new(&[StaticToken {
            token: "secret".into(),
            user_id: "u-1".into(),
            email: Some("a@b.c".into()),
        }]));

        let who = auth.authenticate("secret").await.unwrap();
        assert_eq!(who, identity("u-1", Some("a@b.c")));
        assert!(matches!(
            auth.authenticate("wrong").await,
            Err(AuthError::Unauthorized)
        ));
        assert!(matches!(
            auth.authenticate("  ").await,
            Err(AuthError::Unauthorized)
        ));
    }

    async fn fake_identity_provider() -> String {
        async fn user(headers: HeaderMap) -> Result<Json<serde_json::Value>, StatusCode> {
            let bearer = headers
                .get("Authorization")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.strip_prefix("Bearer "));
            let has_key = headers.get("apikey").is_some();
            match bearer {
                Some("good") if has_key => {
                    Ok(Json(json!({"id": "u-42", "email": "nurse@clinic.test", "aud": "authenticated"})))
                }
                _ => Err(StatusCode::UNAUTHORIZED),
            }
        }

        let app = Router::new().route("/auth/v1/user", get(user));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}")
    }

    #[tokio::test]
    async fn remote_tokens_authenticate() {
        let base = fake_identity_provider().await;
        let auth = Authenticator::Remote(RemoteAuth::new(&base, "anon", 5).unwrap());

        let who = auth.authenticate("good").await.unwrap();
        assert_eq!(who, identity("u-42", Some("nurse@clinic.test")));
        assert!(matches!(
            auth.authenticate("bad").await,
            Err(AuthError::Unauthorized)
        ));
    }

    #[tokio::test]
    async fn unreachable_provider_is_transport_error() {
        let auth = Authenticator::Remote(RemoteAuth::new("http://127.0.0.1:1", "anon", 2).unwrap());
        assert!(matches!(
            auth.authenticate("good").await,
            Err(AuthError::Transport(_))
        ));
    }
}
