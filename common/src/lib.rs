//! Shared building blocks for the WOOF workspace.
//!
//! This crate holds the small pieces every other crate leans on:
//!
//! - [`ErrorLocation`]: caller location captured into every error variant
//! - [`RedactedSecret`]: API secrets and session signing keys that never leak
//!   into logs, debug output, or serialized configuration

pub mod error;
pub mod redacted_secret;

pub use error::error_location::ErrorLocation;
pub use error::redact_error::RedactError;
pub use redacted_secret::RedactedSecret;
