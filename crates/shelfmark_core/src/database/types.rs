use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

/// The reading status a user assigns to a book in their collection. Stored as
/// its snake_case text form, but no other value can be persisted.
#[derive(Serialize, Debug, Deserialize, Clone, Copy, PartialEq, Eq, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum ReadingStatus {
    Reading,
    Queued,
    Completed,
    Recommended,
    OnHold,
}

impl ReadingStatus {
    /// All statuses, in the order the add-book form presents them.
    pub const ALL: [Self; 5] = [
        Self::Reading,
        Self::Queued,
        Self::Completed,
        Self::Recommended,
        Self::OnHold,
    ];

    #[must_use]
    #[inline]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Reading => "reading",
            Self::Queued => "queued",
            Self::Completed => "completed",
            Self::Recommended => "recommended",
            Self::OnHold => "on_hold",
        }
    }

    /// Parses the snake_case text form, e.g. from a submitted form value.
    #[must_use]
    #[inline]
    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|status| status.as_str() == value)
    }
}

/// How the find-or-create lookup decides that two (title, author) pairs refer
/// to the same catalog entry.
#[derive(Serialize, Debug, Deserialize, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DedupPolicy {
    /// Byte-for-byte equality. "Dune" and "dune" are distinct books.
    #[default]
    Exact,
    /// Case-folded and whitespace-trimmed equality.
    Folded,
}

/// Requested ordering for collection listings. Listings carry no ordering
/// guarantee unless one is requested here.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ListOrder {
    #[default]
    Unordered,
    /// Most recently finished first, e.g. for the completed shelf.
    FinishDateDesc,
}

/// A shared catalog entry. Catalog rows are created lazily on first add and
/// never deleted, since any number of users may reference them.
#[non_exhaustive]
#[derive(Serialize, Debug, Deserialize, Clone, PartialEq, sqlx::FromRow)]
pub struct Book {
    pub id: i64,
    pub title: String,
    pub author: String,
    pub cover_image: Option<String>,
    pub description: Option<String>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

/// One user's membership row for one catalog entry.
#[non_exhaustive]
#[derive(Serialize, Debug, Deserialize, Clone, PartialEq, sqlx::FromRow)]
pub struct UserBook {
    pub id: i64,
    pub user_id: String,
    pub book_id: i64,
    pub status: ReadingStatus,
    pub rating: Option<i64>,
    pub notes: Option<String>,
    pub start_date: Option<NaiveDate>,
    pub finish_date: Option<NaiveDate>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

/// A membership row joined with its catalog entry, shaped for list views.
#[non_exhaustive]
#[derive(Serialize, Debug, Deserialize, Clone, PartialEq, sqlx::FromRow)]
pub struct CollectionEntry {
    pub id: i64,
    pub status: ReadingStatus,
    pub rating: Option<i64>,
    pub notes: Option<String>,
    pub start_date: Option<NaiveDate>,
    pub finish_date: Option<NaiveDate>,
    pub book_id: i64,
    pub title: String,
    pub author: String,
    pub cover_image: Option<String>,
    pub description: Option<String>,
}

/// Catalog fields supplied when adding a book.
#[derive(Serialize, Debug, Deserialize, Clone, PartialEq)]
pub struct NewBook {
    pub title: String,
    pub author: String,
    pub cover_image: Option<String>,
    pub description: Option<String>,
}

/// Membership fields supplied when adding a book to a collection. The rating
/// is intended to be 1-5 but is passed through unvalidated.
#[derive(Serialize, Debug, Deserialize, Clone, PartialEq)]
pub struct NewMembership {
    pub status: ReadingStatus,
    pub rating: Option<i64>,
    pub notes: Option<String>,
    pub start_date: Option<NaiveDate>,
    pub finish_date: Option<NaiveDate>,
}

/// Partial update for a membership row. `None` leaves a field unchanged;
/// clearing a stored value back to null is not supported.
#[derive(Serialize, Debug, Deserialize, Clone, Default, PartialEq)]
pub struct UserBookChanges {
    pub status: Option<ReadingStatus>,
    pub rating: Option<i64>,
    pub notes: Option<String>,
    pub start_date: Option<NaiveDate>,
    pub finish_date: Option<NaiveDate>,
}

#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// An ownership-filtered mutation matched no row. Either the id does not
    /// exist or the row belongs to someone else; the two are not
    /// distinguished.
    #[error("no matching row for the requesting user")]
    NotFound,

    #[error("required field is empty: {0}")]
    MissingField(&'static str),

    #[error("database error: {0}")]
    Db(#[from] sqlx::Error),
}
