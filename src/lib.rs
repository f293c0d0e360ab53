//! Chat Interview: session-bound conversational survey service and its
//! terminal client.

pub mod client;
pub mod config;
pub mod error;
pub mod interview;
pub mod llm;
pub mod questions;
pub mod store;
