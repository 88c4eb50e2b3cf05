//! Registry integration
//!
//! Credential handling, the registry HTTP API client, and the publisher
//! that pushes packaged images under their computed tags.

pub mod auth;
pub mod client;
pub mod publisher;
