//! Row models for the job store.

pub mod job;
