//! Episode search
//!
//! The scan engine asks a [`SearchProvider`] for releases of one episode at a
//! time. Providers report "nothing found" as an empty list and reserve `Err`
//! for failures worth retrying later (network errors, bad responses).

pub mod matching;
pub mod torznab;

use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;

use crate::db::ShowRecord;
use crate::torrent::Resolution;

pub use torznab::TorznabSearchProvider;

/// What to look for
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EpisodeQuery {
    pub show_id: i64,
    pub title: String,
    pub alternate_names: Vec<String>,
    pub season: u32,
    pub episode: u32,
    pub absolute: u32,
}

impl EpisodeQuery {
    pub fn for_show(show: &ShowRecord, season: u32, episode: u32, absolute: u32) -> Self {
        Self {
            show_id: show.id,
            title: show.title.clone(),
            alternate_names: show.alternate_names.clone(),
            season,
            episode,
            absolute,
        }
    }

    /// Title followed by alternate names, blank and duplicate names removed
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = Vec::new();
        for name in std::iter::once(&self.title).chain(&self.alternate_names) {
            let name = name.trim();
            if !name.is_empty() && !names.iter().any(|n| n.eq_ignore_ascii_case(name)) {
                names.push(name);
            }
        }
        names
    }

    /// `S02E09` style marker
    pub fn episode_tag(&self) -> String {
        format!("S{:02}E{:02}", self.season, self.episode)
    }
}

/// A release that may satisfy a query
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SearchCandidate {
    pub title: String,
    pub magnet_link: String,
    pub quality: Resolution,
    pub seeders: u32,
}

#[async_trait]
pub trait SearchProvider: Send + Sync {
    fn name(&self) -> &str;

    /// Releases matching the query. `Ok(vec![])` means nothing was found.
    async fn search(&self, query: &EpisodeQuery) -> Result<Vec<SearchCandidate>>;
}
