//! Kiroku - personal anime episode tracker
//!
//! Keeps a library of shows with their season layout, numbers every episode
//! on a single absolute axis, and periodically searches a torrent index for
//! the next missing episodes of each show.

pub mod api;
pub mod app;
pub mod config;
pub mod db;
pub mod error;
pub mod indexer;
pub mod jobs;
pub mod services;
pub mod torrent;

pub use app::AppState;
