use crate::errors::PageError;
use crate::state::AppState;
use axum::extract::{Path, Query, State};
use axum::response::{IntoResponse, Redirect, Response};
use axum::routing::{get, post};
use axum::{Form, Json, Router};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::json;
use shelfmark_core::auth::errors::AuthError;
use shelfmark_core::auth::types::{OAuthProvider, Session};
use shelfmark_core::database::types::{
    CollectionEntry, ListOrder, NewBook, NewMembership, ReadingStatus, StoreError, UserBook,
    UserBookChanges,
};
use shelfmark_core::guard::{GuardOutcome, Route};

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(home))
        .route("/dashboard", get(dashboard))
        .route("/books/add", get(add_book_page))
        .route("/books", post(add_book))
        .route("/books/{id}", post(update_book))
        .route("/books/{id}/remove", post(remove_book))
        .route("/login", get(login_page).post(login))
        .route("/signup", post(signup))
        .route("/logout", post(logout))
        .route("/auth/oauth/{provider}", get(oauth_start))
        .route("/auth/callback", get(oauth_callback))
        .with_state(state)
}

/// Runs a protected route's gate check. `Err` carries the redirect that must
/// be returned instead of rendering anything or touching the store.
async fn protect(state: &AppState, route: Route) -> Result<Session, Response> {
    let session = state.sessions.current_session().await;
    match route.guard(session.as_ref()) {
        GuardOutcome::Redirect(target) => Err(Redirect::temporary(target.path()).into_response()),
        GuardOutcome::Proceed => {
            session.ok_or_else(|| Redirect::temporary(Route::Login.path()).into_response())
        }
    }
}

async fn home() -> Redirect {
    Redirect::temporary(Route::Dashboard.path())
}

#[derive(Serialize)]
struct DashboardView {
    reading: Vec<CollectionEntry>,
    up_next: Vec<CollectionEntry>,
    recently_completed: Vec<CollectionEntry>,
}

async fn dashboard(State(state): State<AppState>) -> Response {
    let session = match protect(&state, Route::Dashboard).await {
        Ok(session) => session,
        Err(redirect) => return redirect,
    };
    let user_id = session.user.id;

    // The three shelves are independent, so their queries run concurrently.
    let (reading, up_next, recently_completed) = futures::join!(
        state.db.list_user_books(
            &user_id,
            Some(ReadingStatus::Reading),
            ListOrder::Unordered,
            None,
        ),
        state.db.list_user_books(
            &user_id,
            Some(ReadingStatus::Queued),
            ListOrder::Unordered,
            Some(5),
        ),
        state.db.list_user_books(
            &user_id,
            Some(ReadingStatus::Completed),
            ListOrder::FinishDateDesc,
            Some(5),
        ),
    );

    let view = reading.and_then(|reading| {
        Ok(DashboardView {
            reading,
            up_next: up_next?,
            recently_completed: recently_completed?,
        })
    });
    match view {
        Ok(view) => Json(view).into_response(),
        Err(err) => {
            PageError::internal("Failed to load your dashboard. Please try again.", &err)
                .into_response()
        }
    }
}

async fn add_book_page(State(state): State<AppState>) -> Response {
    if let Err(redirect) = protect(&state, Route::AddBook).await {
        return redirect;
    }

    Json(json!({ "statuses": ReadingStatus::ALL })).into_response()
}

#[derive(Deserialize)]
struct AddBookForm {
    title: String,
    author: String,
    cover_image: Option<String>,
    description: Option<String>,
    status: Option<String>,
    rating: Option<String>,
    notes: Option<String>,
    start_date: Option<String>,
    finish_date: Option<String>,
}

async fn add_book(State(state): State<AppState>, Form(form): Form<AddBookForm>) -> Response {
    let session = match protect(&state, Route::AddBook).await {
        Ok(session) => session,
        Err(redirect) => return redirect,
    };

    match add_book_inner(&state, &session, form).await {
        Ok(()) => Redirect::to(Route::Dashboard.path()).into_response(),
        Err(err) => err.into_response(),
    }
}

async fn add_book_inner(
    state: &AppState,
    session: &Session,
    form: AddBookForm,
) -> Result<(), PageError> {
    if form.title.trim().is_empty() || form.author.trim().is_empty() {
        return Err(PageError::invalid("Title and author are required."));
    }
    let status = match blank_to_none(form.status) {
        Some(raw) => ReadingStatus::parse(&raw)
            .ok_or_else(|| PageError::invalid("Unknown reading status."))?,
        None => ReadingStatus::Reading,
    };

    let book = NewBook {
        title: form.title,
        author: form.author,
        cover_image: blank_to_none(form.cover_image),
        description: blank_to_none(form.description),
    };
    let membership = NewMembership {
        status,
        rating: parse_rating(form.rating)?,
        notes: blank_to_none(form.notes),
        start_date: parse_date(form.start_date, "Invalid start date.")?,
        finish_date: parse_date(form.finish_date, "Invalid finish date.")?,
    };

    state
        .db
        .add_book_to_collection(&session.user.id, &book, &membership)
        .await
        .map_err(|err| PageError::internal("Failed to add book. Please try again.", &err))?;

    Ok(())
}

#[derive(Deserialize)]
struct UpdateBookForm {
    status: Option<String>,
    rating: Option<String>,
    notes: Option<String>,
    start_date: Option<String>,
    finish_date: Option<String>,
}

async fn update_book(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Form(form): Form<UpdateBookForm>,
) -> Response {
    let session = match protect(&state, Route::Dashboard).await {
        Ok(session) => session,
        Err(redirect) => return redirect,
    };

    match update_book_inner(&state, &session, id, form).await {
        Ok(updated) => Json(updated).into_response(),
        Err(err) => err.into_response(),
    }
}

async fn update_book_inner(
    state: &AppState,
    session: &Session,
    id: i64,
    form: UpdateBookForm,
) -> Result<UserBook, PageError> {
    let status = blank_to_none(form.status)
        .map(|raw| {
            ReadingStatus::parse(&raw).ok_or_else(|| PageError::invalid("Unknown reading status."))
        })
        .transpose()?;
    let changes = UserBookChanges {
        status,
        rating: parse_rating(form.rating)?,
        notes: blank_to_none(form.notes),
        start_date: parse_date(form.start_date, "Invalid start date.")?,
        finish_date: parse_date(form.finish_date, "Invalid finish date.")?,
    };

    state
        .db
        .update_user_book(id, &session.user.id, &changes)
        .await
        .map_err(|err| match err {
            StoreError::NotFound => PageError::NotFound,
            other => PageError::internal("Failed to update book. Please try again.", &other),
        })
}

async fn remove_book(State(state): State<AppState>, Path(id): Path<i64>) -> Response {
    let session = match protect(&state, Route::Dashboard).await {
        Ok(session) => session,
        Err(redirect) => return redirect,
    };

    match state.db.remove_user_book(id, &session.user.id).await {
        Ok(()) => Redirect::to(Route::Dashboard.path()).into_response(),
        Err(err) => PageError::internal("Failed to remove book. Please try again.", &err)
            .into_response(),
    }
}

async fn login_page(State(state): State<AppState>) -> Response {
    let session = state.sessions.current_session().await;
    if let GuardOutcome::Redirect(target) = Route::Login.guard(session.as_ref()) {
        return Redirect::temporary(target.path()).into_response();
    }

    Json(json!({ "oauth_providers": ["google", "github"] })).into_response()
}

#[derive(Deserialize)]
struct CredentialsForm {
    email: String,
    password: String,
}

async fn login(State(state): State<AppState>, Form(form): Form<CredentialsForm>) -> Response {
    match state.sessions.sign_in(&form.email, &form.password).await {
        Ok(_) => Redirect::to(Route::Dashboard.path()).into_response(),
        Err(AuthError::InvalidCredentials) => PageError::InvalidCredentials.into_response(),
        Err(err) => {
            PageError::internal("Failed to sign in. Please try again.", &err).into_response()
        }
    }
}

#[derive(Deserialize)]
struct SignupForm {
    email: String,
    password: String,
    name: String,
}

async fn signup(State(state): State<AppState>, Form(form): Form<SignupForm>) -> Response {
    match state
        .sessions
        .sign_up(&form.email, &form.password, &form.name)
        .await
    {
        Ok(Some(_)) => Redirect::to(Route::Dashboard.path()).into_response(),
        Ok(None) => {
            Json(json!({ "notice": "Check your email to confirm your account." })).into_response()
        }
        Err(AuthError::SignupRejected(reason)) => {
            tracing::warn!("Sign-up rejected: {reason}");
            PageError::invalid("Could not create your account. Please check your details.")
                .into_response()
        }
        Err(err) => {
            PageError::internal("Failed to sign up. Please try again.", &err).into_response()
        }
    }
}

async fn logout(State(state): State<AppState>) -> Redirect {
    state.sessions.sign_out().await;

    Redirect::to(Route::Login.path())
}

async fn oauth_start(State(state): State<AppState>, Path(provider): Path<String>) -> Response {
    let Some(provider) = OAuthProvider::parse(&provider) else {
        return PageError::NotFound.into_response();
    };
    let redirect_to = format!("{}/auth/callback", state.site_url.trim_end_matches('/'));
    let consent_url = state.sessions.oauth_sign_in(provider, &redirect_to);

    Redirect::temporary(&consent_url).into_response()
}

#[derive(Deserialize)]
struct CallbackParams {
    access_token: Option<String>,
    refresh_token: Option<String>,
}

async fn oauth_callback(
    State(state): State<AppState>,
    Query(params): Query<CallbackParams>,
) -> Response {
    let Some(access_token) = params.access_token else {
        tracing::warn!("OAuth callback arrived without an access token");
        return Redirect::temporary(Route::Login.path()).into_response();
    };

    match state
        .sessions
        .complete_oauth(access_token, params.refresh_token)
        .await
    {
        Ok(_) => Redirect::to(Route::Dashboard.path()).into_response(),
        Err(err) => {
            tracing::warn!("OAuth completion failed: {err}");
            Redirect::temporary(Route::Login.path()).into_response()
        }
    }
}

/// Browsers submit unfilled inputs as empty strings; treat those as absent.
fn blank_to_none(value: Option<String>) -> Option<String> {
    value.filter(|raw| !raw.trim().is_empty())
}

fn parse_rating(value: Option<String>) -> Result<Option<i64>, PageError> {
    blank_to_none(value)
        .map(|raw| raw.parse::<i64>())
        .transpose()
        .map_err(|_| PageError::invalid("Invalid rating."))
}

fn parse_date(
    value: Option<String>,
    message: &'static str,
) -> Result<Option<NaiveDate>, PageError> {
    blank_to_none(value)
        .map(|raw| raw.parse::<NaiveDate>())
        .transpose()
        .map_err(|_| PageError::invalid(message))
}
