use crate::database::types::{
    Book, CollectionEntry, DedupPolicy, ListOrder, NewBook, NewMembership, ReadingStatus,
    StoreError, UserBook, UserBookChanges,
};
use chrono::Utc;
use sqlx::{
    QueryBuilder, Sqlite, SqlitePool, Transaction,
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
};
use std::path::Path;

/// Columns returned for membership rows, so `RETURNING` and `SELECT` results
/// map onto [`UserBook`] the same way everywhere.
const USER_BOOK_COLUMNS: &str = "id, user_id, book_id, status, rating, notes, start_date, \
     finish_date, created_at, updated_at";

/// Handle to the collection store. Every mutating operation takes the owning
/// user's id and folds it into the query filter, so there is no code path
/// that can touch another user's membership rows.
pub struct Db {
    pool: SqlitePool,
    dedup: DedupPolicy,
}

impl Db {
    #[allow(
        clippy::missing_inline_in_public_items,
        reason = "Called once at start of program"
    )]
    pub async fn init(path: &Path, dedup: DedupPolicy) -> Result<Self, sqlx::Error> {
        let options = SqliteConnectOptions::new()
            .foreign_keys(true)
            .create_if_missing(true)
            .filename(path);
        let pool = SqlitePool::connect_with(options).await?;
        sqlx::migrate!().run(&pool).await?;

        Ok(Self { pool, dedup })
    }

    /// Opens an in-memory database with the schema applied. The pool is
    /// pinned to a single connection because every SQLite `:memory:`
    /// connection is its own database.
    #[allow(clippy::missing_inline_in_public_items, reason = "Called rarely")]
    pub async fn init_in_memory(dedup: DedupPolicy) -> Result<Self, sqlx::Error> {
        let options = SqliteConnectOptions::new()
            .foreign_keys(true)
            .in_memory(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;
        sqlx::migrate!().run(&pool).await?;

        Ok(Self { pool, dedup })
    }

    #[allow(
        clippy::missing_inline_in_public_items,
        reason = "Called once at end of program"
    )]
    pub async fn close(&self) {
        self.pool.close().await;
    }

    /// Lists one user's membership rows joined with their catalog entries,
    /// optionally narrowed to a single status. No ordering is applied unless
    /// the caller asks for one.
    /// # Errors
    /// Fails with `StoreError::Db` when the underlying query fails.
    #[allow(
        clippy::missing_inline_in_public_items,
        reason = "Large function, called per page view"
    )]
    pub async fn list_user_books(
        &self,
        user_id: &str,
        status: Option<ReadingStatus>,
        order: ListOrder,
        limit: Option<u32>,
    ) -> Result<Vec<CollectionEntry>, StoreError> {
        let mut query = QueryBuilder::<Sqlite>::new(
            "SELECT ub.id, ub.status, ub.rating, ub.notes, ub.start_date, ub.finish_date, \
             b.id AS book_id, b.title, b.author, b.cover_image, b.description \
             FROM user_books ub \
             JOIN books b ON b.id = ub.book_id \
             WHERE ub.user_id = ",
        );
        query.push_bind(user_id.to_owned());
        if let Some(status) = status {
            query.push(" AND ub.status = ");
            query.push_bind(status);
        }
        if order == ListOrder::FinishDateDesc {
            query.push(" ORDER BY ub.finish_date DESC");
        }
        if let Some(limit) = limit {
            query.push(" LIMIT ");
            query.push_bind(i64::from(limit));
        }

        let entries = query
            .build_query_as::<CollectionEntry>()
            .fetch_all(&self.pool)
            .await
            .inspect_err(|err| log::error!("Failed to list collection entries: {err}"))?;
        Ok(entries)
    }

    /// Adds a book to a user's collection, reusing the catalog entry for the
    /// same (title, author) pair when one exists.
    ///
    /// The lookup, the catalog insert and the membership insert run in one
    /// transaction, and the insert resolves concurrent exact duplicates
    /// through the unique (title, author) index, so two users adding the same
    /// new book cannot end up with two catalog rows.
    /// # Errors
    /// Fails with `StoreError::MissingField` when title or author is empty
    /// and with `StoreError::Db` when any query fails.
    #[allow(
        clippy::missing_inline_in_public_items,
        reason = "Large function, called rarely"
    )]
    pub async fn add_book_to_collection(
        &self,
        user_id: &str,
        book: &NewBook,
        membership: &NewMembership,
    ) -> Result<UserBook, StoreError> {
        if book.title.trim().is_empty() {
            return Err(StoreError::MissingField("title"));
        }
        if book.author.trim().is_empty() {
            return Err(StoreError::MissingField("author"));
        }

        let mut tx: Transaction<'_, Sqlite> = self.pool.begin().await?;
        let now = Utc::now().naive_utc();

        let book_id = match self.find_book_id(&mut tx, book).await? {
            Some(id) => id,
            None => {
                sqlx::query_scalar::<_, i64>(
                    "INSERT INTO books (title, author, cover_image, description, created_at, updated_at) \
                     VALUES (?, ?, ?, ?, ?, ?) \
                     ON CONFLICT (title, author) DO UPDATE SET updated_at = excluded.updated_at \
                     RETURNING id",
                )
                .bind(&book.title)
                .bind(&book.author)
                .bind(&book.cover_image)
                .bind(&book.description)
                .bind(now)
                .bind(now)
                .fetch_one(&mut *tx)
                .await
                .inspect_err(|err| log::error!("Failed to create catalog entry: {err}"))?
            }
        };

        let entry = sqlx::query_as::<_, UserBook>(&format!(
            "INSERT INTO user_books \
             (user_id, book_id, status, rating, notes, start_date, finish_date, created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?) \
             RETURNING {USER_BOOK_COLUMNS}"
        ))
        .bind(user_id)
        .bind(book_id)
        .bind(membership.status)
        .bind(membership.rating)
        .bind(&membership.notes)
        .bind(membership.start_date)
        .bind(membership.finish_date)
        .bind(now)
        .bind(now)
        .fetch_one(&mut *tx)
        .await
        .inspect_err(|err| log::error!("Failed to create membership row: {err}"))?;

        tx.commit().await?;

        Ok(entry)
    }

    /// Applies a partial update to a membership row. The filter carries both
    /// the row id and the owner id; a mismatch on either matches zero rows
    /// and surfaces as `NotFound` instead of leaking another user's data.
    /// # Errors
    /// Fails with `StoreError::NotFound` when no row matches the (id, owner)
    /// pair and with `StoreError::Db` when the query fails.
    #[allow(clippy::missing_inline_in_public_items, reason = "Called rarely")]
    pub async fn update_user_book(
        &self,
        user_book_id: i64,
        user_id: &str,
        changes: &UserBookChanges,
    ) -> Result<UserBook, StoreError> {
        let now = Utc::now().naive_utc();
        let updated = sqlx::query_as::<_, UserBook>(&format!(
            "UPDATE user_books SET \
             status = COALESCE(?, status), \
             rating = COALESCE(?, rating), \
             notes = COALESCE(?, notes), \
             start_date = COALESCE(?, start_date), \
             finish_date = COALESCE(?, finish_date), \
             updated_at = ? \
             WHERE id = ? AND user_id = ? \
             RETURNING {USER_BOOK_COLUMNS}"
        ))
        .bind(changes.status)
        .bind(changes.rating)
        .bind(&changes.notes)
        .bind(changes.start_date)
        .bind(changes.finish_date)
        .bind(now)
        .bind(user_book_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .inspect_err(|err| log::error!("Failed to update membership row: {err}"))?;

        updated.ok_or(StoreError::NotFound)
    }

    /// Removes a book from a user's collection. Only the membership row is
    /// deleted; the catalog entry stays for everyone else. Deleting a row
    /// that is already gone is indistinguishable from success.
    /// # Errors
    /// Fails with `StoreError::Db` when the query fails.
    #[allow(clippy::missing_inline_in_public_items, reason = "Called rarely")]
    pub async fn remove_user_book(
        &self,
        user_book_id: i64,
        user_id: &str,
    ) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM user_books WHERE id = ? AND user_id = ?")
            .bind(user_book_id)
            .bind(user_id)
            .execute(&self.pool)
            .await
            .inspect_err(|err| log::error!("Failed to remove membership row: {err}"))?;

        Ok(())
    }

    /// Searches the shared catalog for a case-insensitive substring of title
    /// or author, capped at 10 results. LIKE wildcards in the query are
    /// treated as literal characters.
    /// # Errors
    /// Fails with `StoreError::Db` when the query fails.
    #[allow(clippy::missing_inline_in_public_items, reason = "Called rarely")]
    pub async fn search_books(&self, query: &str) -> Result<Vec<Book>, StoreError> {
        let pattern = format!("%{}%", escape_like(query));
        let books = sqlx::query_as::<_, Book>(
            "SELECT id, title, author, cover_image, description, created_at, updated_at \
             FROM books \
             WHERE title LIKE ? ESCAPE '\\' OR author LIKE ? ESCAPE '\\' \
             LIMIT 10",
        )
        .bind(&pattern)
        .bind(&pattern)
        .fetch_all(&self.pool)
        .await
        .inspect_err(|err| log::error!("Failed to search catalog: {err}"))?;

        Ok(books)
    }

    async fn find_book_id(
        &self,
        tx: &mut Transaction<'_, Sqlite>,
        book: &NewBook,
    ) -> Result<Option<i64>, StoreError> {
        let found = match self.dedup {
            DedupPolicy::Exact => {
                sqlx::query_scalar::<_, i64>(
                    "SELECT id FROM books WHERE title = ? AND author = ? LIMIT 1",
                )
                .bind(&book.title)
                .bind(&book.author)
                .fetch_optional(&mut **tx)
                .await
            }
            DedupPolicy::Folded => {
                sqlx::query_scalar::<_, i64>(
                    "SELECT id FROM books \
                     WHERE lower(trim(title)) = lower(trim(?)) \
                     AND lower(trim(author)) = lower(trim(?)) \
                     LIMIT 1",
                )
                .bind(&book.title)
                .bind(&book.author)
                .fetch_optional(&mut **tx)
                .await
            }
        };

        Ok(found.inspect_err(|err| log::error!("Failed to search catalog for duplicates: {err}"))?)
    }
}

/// Escapes `%`, `_` and the escape character itself so user input matches as
/// a literal substring under `LIKE ... ESCAPE '\'`.
fn escape_like(term: &str) -> String {
    term.replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use pretty_assertions::assert_eq;

    async fn test_db(dedup: DedupPolicy) -> Db {
        Db::init_in_memory(dedup).await.unwrap()
    }

    fn dune() -> NewBook {
        NewBook {
            title: String::from("Dune"),
            author: String::from("Frank Herbert"),
            cover_image: None,
            description: Some(String::from("Spice and sandworms.")),
        }
    }

    fn membership(status: ReadingStatus) -> NewMembership {
        NewMembership {
            status,
            rating: None,
            notes: None,
            start_date: None,
            finish_date: None,
        }
    }

    async fn count(db: &Db, table: &str) -> i64 {
        sqlx::query_scalar::<_, i64>(&format!("SELECT COUNT(*) FROM {table}"))
            .fetch_one(&db.pool)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn add_creates_catalog_entry_and_membership() {
        let db = test_db(DedupPolicy::Exact).await;

        let entry = db
            .add_book_to_collection("user-1", &dune(), &membership(ReadingStatus::Reading))
            .await
            .unwrap();

        assert_eq!(entry.user_id, "user-1");
        assert_eq!(entry.status, ReadingStatus::Reading);
        assert_eq!(count(&db, "books").await, 1);
        assert_eq!(count(&db, "user_books").await, 1);
    }

    #[tokio::test]
    async fn second_add_reuses_catalog_entry() {
        let db = test_db(DedupPolicy::Exact).await;

        let first = db
            .add_book_to_collection("user-1", &dune(), &membership(ReadingStatus::Reading))
            .await
            .unwrap();
        let second = db
            .add_book_to_collection("user-2", &dune(), &membership(ReadingStatus::Queued))
            .await
            .unwrap();

        assert_eq!(first.book_id, second.book_id);
        assert_ne!(first.id, second.id);
        assert_eq!(count(&db, "books").await, 1);
        assert_eq!(count(&db, "user_books").await, 2);
    }

    #[tokio::test]
    async fn exact_policy_treats_case_variants_as_distinct() {
        let db = test_db(DedupPolicy::Exact).await;
        let mut lowercase = dune();
        lowercase.title = String::from("dune");

        db.add_book_to_collection("user-1", &dune(), &membership(ReadingStatus::Reading))
            .await
            .unwrap();
        db.add_book_to_collection("user-1", &lowercase, &membership(ReadingStatus::Queued))
            .await
            .unwrap();

        assert_eq!(count(&db, "books").await, 2);
    }

    #[tokio::test]
    async fn folded_policy_reuses_catalog_entry_across_case() {
        let db = test_db(DedupPolicy::Folded).await;
        let mut shouty = dune();
        shouty.title = String::from("  DUNE ");

        let first = db
            .add_book_to_collection("user-1", &dune(), &membership(ReadingStatus::Reading))
            .await
            .unwrap();
        let second = db
            .add_book_to_collection("user-2", &shouty, &membership(ReadingStatus::Queued))
            .await
            .unwrap();

        assert_eq!(first.book_id, second.book_id);
        assert_eq!(count(&db, "books").await, 1);
    }

    #[tokio::test]
    async fn add_rejects_empty_required_fields() {
        let db = test_db(DedupPolicy::Exact).await;
        let mut untitled = dune();
        untitled.title = String::from("   ");

        let error = db
            .add_book_to_collection("user-1", &untitled, &membership(ReadingStatus::Reading))
            .await
            .unwrap_err();

        assert!(matches!(error, StoreError::MissingField("title")));
        assert_eq!(count(&db, "books").await, 0);
    }

    #[tokio::test]
    async fn update_applies_partial_changes() {
        let db = test_db(DedupPolicy::Exact).await;
        let entry = db
            .add_book_to_collection(
                "user-1",
                &dune(),
                &NewMembership {
                    status: ReadingStatus::Reading,
                    rating: None,
                    notes: Some(String::from("slow start")),
                    start_date: NaiveDate::from_ymd_opt(2023, 12, 1),
                    finish_date: None,
                },
            )
            .await
            .unwrap();

        let updated = db
            .update_user_book(
                entry.id,
                "user-1",
                &UserBookChanges {
                    status: Some(ReadingStatus::Completed),
                    finish_date: NaiveDate::from_ymd_opt(2024, 1, 1),
                    ..UserBookChanges::default()
                },
            )
            .await
            .unwrap();

        assert_eq!(updated.status, ReadingStatus::Completed);
        assert_eq!(updated.finish_date, NaiveDate::from_ymd_opt(2024, 1, 1));
        // untouched fields keep their stored values
        assert_eq!(updated.notes, Some(String::from("slow start")));
        assert_eq!(updated.start_date, NaiveDate::from_ymd_opt(2023, 12, 1));
    }

    #[tokio::test]
    async fn update_by_non_owner_matches_zero_rows() {
        let db = test_db(DedupPolicy::Exact).await;
        let entry = db
            .add_book_to_collection("user-1", &dune(), &membership(ReadingStatus::Reading))
            .await
            .unwrap();

        let error = db
            .update_user_book(
                entry.id,
                "user-2",
                &UserBookChanges {
                    status: Some(ReadingStatus::Completed),
                    ..UserBookChanges::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(error, StoreError::NotFound));

        let rows = db
            .list_user_books("user-1", None, ListOrder::Unordered, None)
            .await
            .unwrap();
        assert_eq!(rows[0].status, ReadingStatus::Reading);
    }

    #[tokio::test]
    async fn remove_is_ownership_filtered_and_idempotent() {
        let db = test_db(DedupPolicy::Exact).await;
        let entry = db
            .add_book_to_collection("user-1", &dune(), &membership(ReadingStatus::Reading))
            .await
            .unwrap();

        // a stranger deleting the row is a silent no-op
        db.remove_user_book(entry.id, "user-2").await.unwrap();
        assert_eq!(count(&db, "user_books").await, 1);

        db.remove_user_book(entry.id, "user-1").await.unwrap();
        assert_eq!(count(&db, "user_books").await, 0);
        // the shared catalog entry survives
        assert_eq!(count(&db, "books").await, 1);

        // deleting again is still a success
        db.remove_user_book(entry.id, "user-1").await.unwrap();
    }

    #[tokio::test]
    async fn list_filters_by_user_and_status() {
        let db = test_db(DedupPolicy::Exact).await;
        let mut other = dune();
        other.title = String::from("Dune Messiah");

        db.add_book_to_collection("user-1", &dune(), &membership(ReadingStatus::Reading))
            .await
            .unwrap();
        db.add_book_to_collection("user-1", &other, &membership(ReadingStatus::Queued))
            .await
            .unwrap();
        db.add_book_to_collection("user-2", &dune(), &membership(ReadingStatus::Reading))
            .await
            .unwrap();

        let reading = db
            .list_user_books(
                "user-1",
                Some(ReadingStatus::Reading),
                ListOrder::Unordered,
                None,
            )
            .await
            .unwrap();
        assert_eq!(reading.len(), 1);
        assert_eq!(reading[0].title, "Dune");

        let all = db
            .list_user_books("user-1", None, ListOrder::Unordered, None)
            .await
            .unwrap();
        assert_eq!(all.len(), 2);
    }

    #[tokio::test]
    async fn completed_list_orders_by_finish_date_desc() {
        let db = test_db(DedupPolicy::Exact).await;
        let titles_and_dates = [
            ("Dune", NaiveDate::from_ymd_opt(2024, 1, 1)),
            ("Dune Messiah", NaiveDate::from_ymd_opt(2024, 3, 1)),
            ("Children of Dune", NaiveDate::from_ymd_opt(2024, 2, 1)),
        ];
        for (title, finish_date) in titles_and_dates {
            let mut book = dune();
            book.title = String::from(title);
            db.add_book_to_collection(
                "user-1",
                &book,
                &NewMembership {
                    status: ReadingStatus::Completed,
                    rating: None,
                    notes: None,
                    start_date: None,
                    finish_date,
                },
            )
            .await
            .unwrap();
        }

        let completed = db
            .list_user_books(
                "user-1",
                Some(ReadingStatus::Completed),
                ListOrder::FinishDateDesc,
                Some(2),
            )
            .await
            .unwrap();

        let titles: Vec<&str> = completed.iter().map(|entry| entry.title.as_str()).collect();
        assert_eq!(titles, vec!["Dune Messiah", "Children of Dune"]);
    }

    #[tokio::test]
    async fn search_matches_case_insensitively_and_caps_results() {
        let db = test_db(DedupPolicy::Exact).await;
        for index in 0..12 {
            let book = NewBook {
                title: format!("The Wheel of Time {index}"),
                author: String::from("Robert Jordan"),
                cover_image: None,
                description: None,
            };
            db.add_book_to_collection("user-1", &book, &membership(ReadingStatus::Queued))
                .await
                .unwrap();
        }
        db.add_book_to_collection("user-1", &dune(), &membership(ReadingStatus::Reading))
            .await
            .unwrap();

        let by_author = db.search_books("robert jordan").await.unwrap();
        assert_eq!(by_author.len(), 10);

        let by_title = db.search_books("wHeEl").await.unwrap();
        assert_eq!(by_title.len(), 10);

        let narrow = db.search_books("dune").await.unwrap();
        assert_eq!(narrow.len(), 1);
        assert_eq!(narrow[0].title, "Dune");
    }

    #[tokio::test]
    async fn search_treats_like_wildcards_as_literals() {
        let db = test_db(DedupPolicy::Exact).await;
        let odd = NewBook {
            title: String::from("100% Wolf"),
            author: String::from("Jayne Lyons"),
            cover_image: None,
            description: None,
        };
        db.add_book_to_collection("user-1", &odd, &membership(ReadingStatus::Queued))
            .await
            .unwrap();
        db.add_book_to_collection("user-1", &dune(), &membership(ReadingStatus::Reading))
            .await
            .unwrap();

        let literal = db.search_books("100%").await.unwrap();
        assert_eq!(literal.len(), 1);
        assert_eq!(literal[0].title, "100% Wolf");

        // a bare % would otherwise match every row
        let wildcard = db.search_books("%").await.unwrap();
        assert_eq!(wildcard.len(), 1);
    }
}
