//! Collaborators the holder drives but does not implement.
//!
//! Each concern is a trait behind [async_trait](async_trait::async_trait), so
//! an application can plug in its own persistence, key management and
//! protocol client. In-memory stores are provided for development.

pub mod client;
pub mod identifier;
pub mod presentation;
pub mod store;
pub mod verifier;
