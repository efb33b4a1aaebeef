use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The identity behind an active session, as reported by the provider.
#[non_exhaustive]
#[derive(Serialize, Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct AuthenticatedUser {
    /// Opaque provider-assigned user id; owner key for all membership rows.
    pub id: String,
    pub email: String,
    /// Display name from the profile metadata, falling back to the local
    /// part of the email address.
    pub name: String,
    pub avatar_url: Option<String>,
}

impl AuthenticatedUser {
    #[must_use]
    #[inline]
    pub const fn new(
        id: String,
        email: String,
        name: String,
        avatar_url: Option<String>,
    ) -> Self {
        Self {
            id,
            email,
            name,
            avatar_url,
        }
    }
}

/// An active session. Lifetime is bound to the provider's token lifecycle;
/// nothing here is persisted by this system.
#[non_exhaustive]
#[derive(Serialize, Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct Session {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
    pub user: AuthenticatedUser,
}

impl Session {
    #[must_use]
    #[inline]
    pub const fn new(
        access_token: String,
        refresh_token: Option<String>,
        expires_at: Option<DateTime<Utc>>,
        user: AuthenticatedUser,
    ) -> Self {
        Self {
            access_token,
            refresh_token,
            expires_at,
            user,
        }
    }
}

/// External consent-flow providers the login page offers.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OAuthProvider {
    Google,
    Github,
}

impl OAuthProvider {
    #[must_use]
    #[inline]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Google => "google",
            Self::Github => "github",
        }
    }

    /// Parses the provider segment of an OAuth route, e.g. `google`.
    #[must_use]
    #[inline]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "google" => Some(Self::Google),
            "github" => Some(Self::Github),
            _ => None,
        }
    }
}
