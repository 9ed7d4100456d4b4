//! Tracking core of listing-watch: sources, per-link poll loops, destination
//! groups and the session registry.  See `main.rs` for how they are wired.

pub mod command;
pub mod config;
pub mod error;
pub mod group;
pub mod notify;
pub mod poll;
pub mod registry;
pub mod source;
