//! Collection store
//!
//! The library crate exposes the `Db` struct and its methods to interact
//! with the book catalog and per-user collection memberships through
//! pre-defined, ownership-filtered queries.
pub mod queries;
pub mod types;
