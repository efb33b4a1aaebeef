use crate::auth::errors::AuthError;
use crate::auth::types::{AuthenticatedUser, OAuthProvider, Session};
use core::future::Future;
use tokio::sync::{RwLock, watch};

/// Interface to the external identity provider. The session manager only
/// talks to the provider through this seam, so shells and tests can swap the
/// HTTP-backed client for something else.
pub trait IdentityProvider {
    fn sign_in_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> impl Future<Output = Result<Session, AuthError>> + Send;

    /// Creates an account. Returns `None` when the provider withholds the
    /// session until the address is verified.
    fn sign_up(
        &self,
        email: &str,
        password: &str,
        display_name: &str,
    ) -> impl Future<Output = Result<Option<Session>, AuthError>> + Send;

    fn sign_out(&self, access_token: &str) -> impl Future<Output = Result<(), AuthError>> + Send;

    /// Resolves an access token to the user it belongs to.
    fn fetch_user(
        &self,
        access_token: &str,
    ) -> impl Future<Output = Result<AuthenticatedUser, AuthError>> + Send;

    /// URL of the provider's consent page for an OAuth sign-in. Completion
    /// comes back through the shell's callback route, not a return value.
    fn authorize_url(&self, provider: OAuthProvider, redirect_to: &str) -> String;
}

/// Tracks the active session and broadcasts every change. Guards and shells
/// read the session through [`SessionManager::current_session`] or react to
/// changes through [`SessionManager::subscribe`]; nothing else holds session
/// state.
pub struct SessionManager<P> {
    provider: P,
    current: RwLock<Option<Session>>,
    changes: watch::Sender<Option<Session>>,
}

impl<P: IdentityProvider> SessionManager<P> {
    #[must_use]
    #[inline]
    pub fn new(provider: P) -> Self {
        let (changes, _) = watch::channel(None);
        Self {
            provider,
            current: RwLock::new(None),
            changes,
        }
    }

    /// The active session, or `None` for an anonymous visitor.
    #[allow(
        clippy::missing_inline_in_public_items,
        reason = "Called once per page view"
    )]
    pub async fn current_session(&self) -> Option<Session> {
        self.current.read().await.clone()
    }

    /// Subscribe to session changes. The receiver observes sign-in,
    /// sign-out and OAuth completion without polling.
    #[must_use]
    #[inline]
    pub fn subscribe(&self) -> watch::Receiver<Option<Session>> {
        self.changes.subscribe()
    }

    /// # Errors
    /// Fails with `AuthError::InvalidCredentials` when the provider rejects
    /// the pair; no session is installed in that case.
    #[allow(clippy::missing_inline_in_public_items, reason = "Called rarely")]
    pub async fn sign_in(&self, email: &str, password: &str) -> Result<Session, AuthError> {
        let session = self.provider.sign_in_with_password(email, password).await?;
        log::info!("Signed in as {}", session.user.email);
        self.install(Some(session.clone())).await;

        Ok(session)
    }

    /// # Errors
    /// Fails with `AuthError::SignupRejected` on duplicate email or a policy
    /// violation. `Ok(None)` means the account exists but the provider wants
    /// the address verified before handing out a session.
    #[allow(clippy::missing_inline_in_public_items, reason = "Called rarely")]
    pub async fn sign_up(
        &self,
        email: &str,
        password: &str,
        display_name: &str,
    ) -> Result<Option<Session>, AuthError> {
        let session = self.provider.sign_up(email, password, display_name).await?;
        match &session {
            Some(session) => {
                log::info!("Signed up and in as {}", session.user.email);
                self.install(Some(session.clone())).await;
            }
            None => log::info!("Signed up {email}, awaiting verification"),
        }

        Ok(session)
    }

    /// Ends the session. Provider-side revocation is best effort: a failure
    /// there is logged and swallowed, the local session is cleared either
    /// way, so navigation away from the app is never blocked.
    #[allow(clippy::missing_inline_in_public_items, reason = "Called rarely")]
    pub async fn sign_out(&self) {
        let access_token = self
            .current
            .read()
            .await
            .as_ref()
            .map(|session| session.access_token.clone());
        if let Some(access_token) = access_token {
            if let Err(err) = self.provider.sign_out(&access_token).await {
                log::warn!("Provider sign-out failed, clearing local session anyway: {err}");
            }
        }
        self.install(None).await;
    }

    /// Starts an OAuth sign-in by handing back the consent URL the browser
    /// must be redirected to. The flow finishes asynchronously in
    /// [`SessionManager::complete_oauth`].
    #[must_use]
    #[inline]
    pub fn oauth_sign_in(&self, provider: OAuthProvider, redirect_to: &str) -> String {
        self.provider.authorize_url(provider, redirect_to)
    }

    /// Finishes an OAuth flow with the tokens delivered to the callback
    /// route.
    /// # Errors
    /// Fails when the provider does not recognize the access token.
    #[allow(clippy::missing_inline_in_public_items, reason = "Called rarely")]
    pub async fn complete_oauth(
        &self,
        access_token: String,
        refresh_token: Option<String>,
    ) -> Result<Session, AuthError> {
        let user = self.provider.fetch_user(&access_token).await?;
        log::info!("OAuth sign-in completed for {}", user.email);
        let session = Session::new(access_token, refresh_token, None, user);
        self.install(Some(session.clone())).await;

        Ok(session)
    }

    /// Adopts an already established session, e.g. one rehydrated by the
    /// shell at startup. Subscribers are notified like for any other change.
    #[allow(clippy::missing_inline_in_public_items, reason = "Called rarely")]
    pub async fn restore(&self, session: Session) {
        self.install(Some(session)).await;
    }

    async fn install(&self, session: Option<Session>) {
        *self.current.write().await = session.clone();
        self.changes.send_replace(session);
    }
}
