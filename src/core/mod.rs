pub mod accumulator;
pub mod backend;
pub mod client;
pub mod config;
pub mod credentials;
pub mod message;
pub mod session;
pub mod sse;
pub mod state;
