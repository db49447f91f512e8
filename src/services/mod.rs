//! Business logic services

pub mod cache;
pub mod numbering;
pub mod scan_controller;
pub mod scan_engine;
pub mod scan_state;

pub use cache::TtlCache;
pub use numbering::{EpisodeRange, EpisodesPerSeason};
pub use scan_controller::{ScanController, ScanStatus, StopOutcome};
pub use scan_engine::{
    ScanEngine, ScanGuard, ScanPlan, ScanSettings, ScanSummary, ScanTarget, ScanTicket, StopReason,
    StoreGuard,
};
pub use scan_state::{ScanStateOptions, ScanStatePatch, ScanStateStore};
