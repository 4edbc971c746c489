//! Todoist Sync API: domain types, wire format, commands and the HTTP client.

pub mod api_types;
mod cache;
pub mod client;
pub mod commands;
pub mod types;

pub use client::SyncClient;
