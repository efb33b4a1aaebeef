//! Page guards
//!
//! Synchronous gate checks that run before a page fetches any data. The
//! session is passed in explicitly; guards never reach into ambient state.

use crate::auth::types::Session;

/// The user-facing routes that carry a gate check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Dashboard,
    AddBook,
    Login,
}

/// What a gate check decided. `Redirect` means render nothing and send the
/// browser to the named route instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardOutcome {
    Proceed,
    Redirect(Route),
}

impl Route {
    #[must_use]
    #[inline]
    pub const fn path(self) -> &'static str {
        match self {
            Self::Dashboard => "/dashboard",
            Self::AddBook => "/books/add",
            Self::Login => "/login",
        }
    }

    /// Evaluates this route's gate for the given session. Protected routes
    /// send anonymous visitors to the login page; the login page sends
    /// signed-in users back to the dashboard.
    #[must_use]
    #[inline]
    pub const fn guard(self, session: Option<&Session>) -> GuardOutcome {
        match (self, session) {
            (Self::Login, Some(_)) => GuardOutcome::Redirect(Self::Dashboard),
            (Self::Login, None) | (Self::Dashboard | Self::AddBook, Some(_)) => {
                GuardOutcome::Proceed
            }
            (Self::Dashboard | Self::AddBook, None) => GuardOutcome::Redirect(Self::Login),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::types::{AuthenticatedUser, Session};
    use pretty_assertions::assert_eq;

    fn session() -> Session {
        Session::new(
            String::from("at-1"),
            None,
            None,
            AuthenticatedUser {
                id: String::from("user-1"),
                email: String::from("reader@example.com"),
                name: String::from("Reader"),
                avatar_url: None,
            },
        )
    }

    #[test]
    fn protected_routes_redirect_anonymous_visitors_to_login() {
        for route in [Route::Dashboard, Route::AddBook] {
            assert_eq!(route.guard(None), GuardOutcome::Redirect(Route::Login));
        }
    }

    #[test]
    fn protected_routes_admit_signed_in_users() {
        let session = session();
        for route in [Route::Dashboard, Route::AddBook] {
            assert_eq!(route.guard(Some(&session)), GuardOutcome::Proceed);
        }
    }

    #[test]
    fn login_inverts_the_check() {
        let session = session();
        assert_eq!(
            Route::Login.guard(Some(&session)),
            GuardOutcome::Redirect(Route::Dashboard)
        );
        assert_eq!(Route::Login.guard(None), GuardOutcome::Proceed);
    }

    #[test]
    fn route_paths_match_the_served_urls() {
        assert_eq!(Route::Dashboard.path(), "/dashboard");
        assert_eq!(Route::AddBook.path(), "/books/add");
        assert_eq!(Route::Login.path(), "/login");
    }
}
