mod correlation;
mod endpoint;
mod registry;
mod session;
mod stream;
mod support;
