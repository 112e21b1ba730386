//! Shared domain types for the rtrain remote-training service.
//!
//! Everything that both the server side (API, worker, store) and the client
//! need to agree on lives here: job identifiers, the submission envelope,
//! the tensor wire codec, checksums, and the [`compute::CompiledJob`]
//! capability interface with its built-in training implementation.

pub mod compute;
pub mod error;
pub mod hashing;
pub mod linear;
pub mod submission;
pub mod tensor;
pub mod training;
pub mod types;
