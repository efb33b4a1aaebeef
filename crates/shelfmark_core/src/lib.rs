//! `shelfmark_core`
//!
//! Core library for the platform-independent logic of Shelfmark. This
//! library aims to provide a crate that can be used by any web shell on top
//! of it, so the collection service, session handling and page gates live
//! here rather than in a particular frontend.

pub mod auth;

pub mod database;

pub mod guard;
