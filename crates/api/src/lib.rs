//! rtrain server library.
//!
//! Exposes the building blocks of the `rtraind` binary (config, state,
//! error handling, routes, the auth middleware and the cleaner loop) so
//! integration tests and the binary entrypoint share them.

pub mod background;
pub mod config;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod router;
pub mod routes;
pub mod state;
