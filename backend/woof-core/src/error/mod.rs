pub mod auth;
pub mod codec;
pub mod config;
pub mod endpoint;
pub mod registry;
pub mod stream;
pub mod transport;

pub use auth::AuthBackendError;
pub use codec::CodecError;
pub use config::ConfigError;
pub use endpoint::EndpointError;
pub use registry::RegistryError;
pub use stream::StreamError;
pub use transport::TransportError;
