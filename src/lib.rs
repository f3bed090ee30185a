//! Retrieval-augmented prescription tooling.
//!
//! A stdio tool server exposes patient and prescription operations over
//! line-delimited JSON-RPC, including similarity retrieval of past
//! prescriptions by embedding and cosine ranking. An HTTP backend drives the
//! tool server and drafts prescriptions with a text-completion model.

// Compiler lints
#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(unused_must_use)]
#![deny(nonstandard_style)]
#![forbid(unsafe_op_in_unsafe_fn)]
// Clippy lints
#![deny(clippy::all)]
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::print_stdout)]
#![deny(clippy::todo)]
#![deny(clippy::unimplemented)]
#![deny(clippy::module_inception)]
#![deny(clippy::redundant_clone)]
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used, clippy::panic))]

pub mod clinical;
pub mod rpc;
pub mod server;
pub mod startup;
pub mod tools;

#[cfg(test)]
mod testing;
