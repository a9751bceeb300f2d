// Entry point for the `client` library: the backend contract, both backends
// and the selector that hands one of them to the application.
pub mod config;
pub mod error;
pub mod mock;
pub mod rest;
pub mod selector;
pub mod server;

pub use error::ServerError;
pub use mock::MockServer;
pub use rest::RestServer;
pub use selector::{init, server, Environment};
pub use server::{Capability, CapabilitySet, CommentStream, LibraryServer};
