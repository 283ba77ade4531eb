pub mod client;
pub mod codec;
pub mod config;
pub mod correlation;
pub mod endpoint;
pub mod error;
pub mod proto;
pub mod registry;
pub mod server;
pub mod session;
pub mod transport;

#[cfg(test)]
mod tests;

pub const WOOF_PROTOCOL_VERSION: u32 = 1;
/// WebSocket subprotocol both sides must agree on during the upgrade.
pub const WOOF_SUBPROTOCOL: &str = const_format::concatcp!("woof.v", WOOF_PROTOCOL_VERSION);
/// Type ids below this value belong to the built-in catalogue.
pub const FIRST_APPLICATION_TYPE_ID: u32 = 100;
/// Unix time (seconds) this crate was built, stamped by `build.rs`.
pub const BUILD_UNIX_TIME: &str = env!("WOOF_BUILD_UNIX_TIME");
