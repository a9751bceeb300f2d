// --- File: backend/src/lib.rs ---

// Entry point for the `backend` library. The modules are public so the
// integration tests and the REST client tests can build the router.
pub mod catalog;
pub mod config;
pub mod db;
pub mod error;
pub mod web_server;
