use shelfmark_core::auth::client::AuthClient;
use shelfmark_core::auth::session::SessionManager;
use shelfmark_core::database::queries::Db;
use std::sync::Arc;

/// Shared state behind every route handler: the collection store and the
/// session manager, both living for the whole process.
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<Db>,
    pub sessions: Arc<SessionManager<AuthClient>>,
    /// Public base URL of this deployment, used to build the OAuth
    /// callback target.
    pub site_url: String,
}
