use crate::auth::errors::AuthError;
use crate::auth::session::IdentityProvider;
use crate::auth::types::{AuthenticatedUser, OAuthProvider, Session};
use chrono::{TimeDelta, Utc};
use core::future::Future;
use core::time::Duration;
use reqwest::{ClientBuilder, StatusCode};
use serde::Deserialize;
use serde_json::{Value, json};
use urlencoding::encode;

/// Client for the identity provider's REST interface. One instance is shared
/// for all sign-in, sign-up, sign-out and introspection requests.
pub struct AuthClient {
    /// A HTTP client used to execute all requests against the provider
    http: reqwest::Client,
    /// Base URL of the provider's auth endpoints, without a trailing slash
    base_url: String,
    /// Public API key the provider expects on every request
    api_key: String,
}

/// Successful token grant, as the provider serializes it.
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: Option<String>,
    expires_in: Option<i64>,
    user: ProviderUser,
}

/// Provider-side user object. Profile fields live in a free-form metadata
/// map, so they are picked out leniently.
#[derive(Debug, Deserialize)]
struct ProviderUser {
    id: String,
    email: Option<String>,
    #[serde(default)]
    user_metadata: Value,
}

impl AuthClient {
    /// Create a new client for the provider reachable at `base_url`.
    /// # Errors
    /// Fails if the underlying HTTP client cannot be constructed.
    #[allow(
        clippy::missing_inline_in_public_items,
        reason = "Called once at start of program"
    )]
    pub fn new(base_url: &str, api_key: &str) -> Result<Self, AuthError> {
        let http = ClientBuilder::new()
            .user_agent(concat!("shelfmark/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(25))
            .build()?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_owned(),
            api_key: api_key.to_owned(),
        })
    }

    async fn password_grant(&self, email: &str, password: &str) -> Result<Session, AuthError> {
        let url = format!("{}/token?grant_type=password", self.base_url);
        let response = self
            .http
            .post(&url)
            .header("apikey", &self.api_key)
            .json(&json!({ "email": email, "password": password }))
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if status.is_success() {
            let raw: TokenResponse = serde_json::from_str(&body)?;
            return Ok(session_from_token_response(raw));
        }
        if status == StatusCode::BAD_REQUEST || status == StatusCode::UNAUTHORIZED {
            log::warn!("Sign-in rejected: {}", provider_error_message(&body));
            return Err(AuthError::InvalidCredentials);
        }

        let message = provider_error_message(&body);
        log::error!("Sign-in failed with status {status}: {message}");
        Err(AuthError::Unexpected {
            status: status.as_u16(),
            message,
        })
    }

    async fn create_account(
        &self,
        email: &str,
        password: &str,
        display_name: &str,
    ) -> Result<Option<Session>, AuthError> {
        let url = format!("{}/signup", self.base_url);
        let response = self
            .http
            .post(&url)
            .header("apikey", &self.api_key)
            .json(&json!({
                "email": email,
                "password": password,
                "data": { "name": display_name },
            }))
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if status.is_success() {
            // Depending on the provider's verification policy the response is
            // either a full session or a bare user awaiting confirmation.
            return Ok(serde_json::from_str::<TokenResponse>(&body)
                .ok()
                .map(session_from_token_response));
        }
        if status == StatusCode::BAD_REQUEST || status == StatusCode::UNPROCESSABLE_ENTITY {
            let message = provider_error_message(&body);
            log::warn!("Sign-up rejected: {message}");
            return Err(AuthError::SignupRejected(message));
        }

        let message = provider_error_message(&body);
        log::error!("Sign-up failed with status {status}: {message}");
        Err(AuthError::Unexpected {
            status: status.as_u16(),
            message,
        })
    }

    async fn revoke(&self, access_token: &str) -> Result<(), AuthError> {
        let url = format!("{}/logout", self.base_url);
        let response = self
            .http
            .post(&url)
            .header("apikey", &self.api_key)
            .bearer_auth(access_token)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let body = response.text().await?;
        Err(AuthError::Unexpected {
            status: status.as_u16(),
            message: provider_error_message(&body),
        })
    }

    async fn introspect(&self, access_token: &str) -> Result<AuthenticatedUser, AuthError> {
        let url = format!("{}/user", self.base_url);
        let response = self
            .http
            .get(&url)
            .header("apikey", &self.api_key)
            .bearer_auth(access_token)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if status.is_success() {
            let raw: ProviderUser = serde_json::from_str(&body)?;
            return Ok(user_from_provider(raw));
        }
        if status == StatusCode::UNAUTHORIZED {
            return Err(AuthError::InvalidCredentials);
        }

        Err(AuthError::Unexpected {
            status: status.as_u16(),
            message: provider_error_message(&body),
        })
    }

    fn consent_url(&self, provider: OAuthProvider, redirect_to: &str) -> String {
        format!(
            "{}/authorize?provider={}&redirect_to={}",
            self.base_url,
            provider.as_str(),
            encode(redirect_to)
        )
    }
}

#[allow(
    clippy::missing_inline_in_public_items,
    reason = "Trait impl, called through the session manager"
)]
impl IdentityProvider for AuthClient {
    fn sign_in_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> impl Future<Output = Result<Session, AuthError>> + Send {
        self.password_grant(email, password)
    }

    fn sign_up(
        &self,
        email: &str,
        password: &str,
        display_name: &str,
    ) -> impl Future<Output = Result<Option<Session>, AuthError>> + Send {
        self.create_account(email, password, display_name)
    }

    fn sign_out(&self, access_token: &str) -> impl Future<Output = Result<(), AuthError>> + Send {
        self.revoke(access_token)
    }

    fn fetch_user(
        &self,
        access_token: &str,
    ) -> impl Future<Output = Result<AuthenticatedUser, AuthError>> + Send {
        self.introspect(access_token)
    }

    fn authorize_url(&self, provider: OAuthProvider, redirect_to: &str) -> String {
        self.consent_url(provider, redirect_to)
    }
}

fn session_from_token_response(raw: TokenResponse) -> Session {
    let TokenResponse {
        access_token,
        refresh_token,
        expires_in,
        user,
    } = raw;
    let expires_at = expires_in.map(|seconds| Utc::now() + TimeDelta::seconds(seconds));

    Session::new(
        access_token,
        refresh_token,
        expires_at,
        user_from_provider(user),
    )
}

fn user_from_provider(raw: ProviderUser) -> AuthenticatedUser {
    let email = raw.email.unwrap_or_default();
    let metadata = raw.user_metadata;
    let from_metadata = |key: &str| {
        metadata
            .get(key)
            .and_then(Value::as_str)
            .filter(|value| !value.is_empty())
            .map(str::to_owned)
    };
    let name = from_metadata("name")
        .or_else(|| from_metadata("full_name"))
        .unwrap_or_else(|| email.split('@').next().unwrap_or("").to_owned());

    AuthenticatedUser {
        id: raw.id,
        email,
        name,
        avatar_url: from_metadata("avatar_url"),
    }
}

/// Pulls a human-readable reason out of a provider error body. The field
/// name varies by endpoint, so several are tried before falling back to the
/// raw body.
fn provider_error_message(body: &str) -> String {
    let parsed: Value = serde_json::from_str(body).unwrap_or(Value::Null);
    for key in ["error_description", "msg", "message", "error"] {
        if let Some(message) = parsed.get(key).and_then(Value::as_str) {
            return message.to_owned();
        }
    }

    let fallback = body.trim();
    if fallback.chars().count() > 200 {
        fallback.chars().take(200).collect()
    } else {
        fallback.to_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn provider_user(metadata: Value) -> ProviderUser {
        ProviderUser {
            id: String::from("user-123"),
            email: Some(String::from("reader@example.com")),
            user_metadata: metadata,
        }
    }

    #[test]
    fn token_response_maps_to_session() {
        let body = r#"{
            "access_token": "at-1",
            "token_type": "bearer",
            "expires_in": 3600,
            "refresh_token": "rt-1",
            "user": {
                "id": "user-123",
                "email": "reader@example.com",
                "user_metadata": { "name": "Avid Reader", "avatar_url": "https://example.com/a.png" }
            }
        }"#;

        let raw: TokenResponse = serde_json::from_str(body).unwrap();
        let session = session_from_token_response(raw);

        assert_eq!(session.access_token, "at-1");
        assert_eq!(session.refresh_token, Some(String::from("rt-1")));
        assert!(session.expires_at.is_some());
        assert_eq!(session.user.id, "user-123");
        assert_eq!(session.user.name, "Avid Reader");
        assert_eq!(
            session.user.avatar_url,
            Some(String::from("https://example.com/a.png"))
        );
    }

    #[test]
    fn user_name_prefers_profile_metadata() {
        let user = user_from_provider(provider_user(serde_json::json!({
            "full_name": "Reader McBookface"
        })));

        assert_eq!(user.name, "Reader McBookface");
    }

    #[test]
    fn user_name_falls_back_to_email_local_part() {
        let user = user_from_provider(provider_user(Value::Null));

        assert_eq!(user.name, "reader");
        assert_eq!(user.avatar_url, None);
    }

    #[test]
    fn provider_error_message_prefers_known_fields() {
        let body = r#"{"error":"invalid_grant","error_description":"Invalid login credentials"}"#;
        assert_eq!(provider_error_message(body), "Invalid login credentials");

        let body = r#"{"msg":"User already registered"}"#;
        assert_eq!(provider_error_message(body), "User already registered");
    }

    #[test]
    fn provider_error_message_falls_back_to_raw_body() {
        assert_eq!(provider_error_message("upstream offline"), "upstream offline");
    }

    #[test]
    fn consent_url_encodes_redirect_target() {
        let client = AuthClient::new("https://auth.example.com/auth/v1/", "anon-key").unwrap();

        let url = client.consent_url(OAuthProvider::Google, "https://shelfmark.app/auth/callback");

        assert_eq!(
            url,
            "https://auth.example.com/auth/v1/authorize?provider=google\
             &redirect_to=https%3A%2F%2Fshelfmark.app%2Fauth%2Fcallback"
        );
    }
}
