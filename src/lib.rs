//! Tipimate: app update notifications for Runtipi servers.
//!
//! Each pass fetches the installed apps from the Runtipi API, compares them
//! with the versions recorded in a local SQLite database and sends one
//! webhook per app whose version changed since the last pass.

pub mod api;
pub mod appstore;
pub mod check;
pub mod config;
pub mod notify;
pub mod poll;
pub mod reconcile;
pub mod server;
pub mod store;
pub mod types;
