//! Internals of the stepfuzz harness.
//!
//! Most users want the `stepfuzz-runtime` crate, which re-exports what is needed here and adds
//! the process-wide entry points a fuzz target calls.

#![deny(bare_trait_objects)]

#[macro_use]
pub mod error;

pub mod context;
pub mod governor;
pub mod guard;
pub mod harness;
pub mod interceptor;
pub mod limits;
pub mod signals;
pub mod termination;
