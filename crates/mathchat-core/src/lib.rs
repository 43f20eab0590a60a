//! Core mathchat library (streaming protocol engine, formatter, session).

pub mod client;
pub mod config;
pub mod error;
pub mod format;
pub mod message;
pub mod session;
pub mod transcript;
