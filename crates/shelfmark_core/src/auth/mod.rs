//! Identity and sessions
//!
//! Client for the external identity provider plus the session manager that
//! tracks the active identity and broadcasts session changes to whoever
//! subscribes.
pub mod client;
pub mod errors;
pub mod session;
pub mod types;
