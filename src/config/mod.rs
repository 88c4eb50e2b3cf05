//! Configuration constants
//!
//! Static defaults used across the crate. Run-scoped configuration lives in
//! [`crate::core::release::ReleaseConfig`]; nothing here is ambient state.

pub mod defaults;
