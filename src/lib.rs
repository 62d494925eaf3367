//! chatwire is a terminal client for a multi-model chat portal.
//!
//! The crate is organized around a small set of collaborating layers:
//! - [`core`] owns the observable chat state, the send/stream/reconcile
//!   orchestration in [`core::client`], the SSE decoder, configuration and
//!   keyring-backed session storage.
//! - [`api`] defines the portal's payloads and the reqwest-based
//!   [`api::client::HttpBackend`], plus the admin console client.
//! - [`cli`] parses arguments and renders streamed replies to the terminal.
//! - [`utils`] holds URL handling, session cookies and transcript logging.
//!
//! Runtime entrypoints live in the binary crate (`src/main.rs`) and route
//! through [`crate::cli::main`].

pub mod api;
pub mod cli;
pub mod core;
pub mod utils;
