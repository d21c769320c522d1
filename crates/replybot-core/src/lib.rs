//! Core domain + application logic for the reply-command bot.
//!
//! This crate is intentionally framework-agnostic. Telegram and the news feed
//! live behind ports (traits) implemented in adapter crates.

pub mod auth;
pub mod config;
pub mod dispatch;
pub mod domain;
pub mod errors;
pub mod formatting;
pub mod logging;
pub mod messaging;
pub mod news;
pub mod registry;
pub mod scope;
pub mod store;
pub mod utils;

pub use errors::{Error, Result};
