//! Palaver is a streaming chat-completion client for hosted LLM endpoints.
//!
//! The crate is organized around a small set of collaborating layers:
//! - [`core`] builds completion requests, gathers verification tokens,
//!   classifies transport failures, decodes streamed replies, publishes
//!   shared conversations, and owns the on-disk configuration.
//! - [`cli`] parses arguments and drives the pipeline for one-shot use.
//! - [`logging`] installs the diagnostic `tracing` subscriber.
//! - [`utils`] holds URL helpers shared by the layers above.
//!
//! Runtime entrypoints live in the binary crate (`src/main.rs`) and route
//! through [`crate::cli::main`].

pub mod cli;
pub mod core;
pub mod logging;
pub mod utils;
