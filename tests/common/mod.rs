//! Shared fixtures for integration tests
#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tokio::sync::Notify;

use kiroku::db::{EpisodeRecord, EpisodeUpdate, MemoryScanStateBackend, ShowRecord, ShowRepository};
use kiroku::indexer::{EpisodeQuery, SearchCandidate, SearchProvider};
use kiroku::services::{
    EpisodeRange, EpisodesPerSeason, ScanController, ScanEngine, ScanSettings, ScanStateOptions,
    ScanStateStore,
};
use kiroku::torrent::Resolution;

/// Show and episode storage held in memory
#[derive(Default)]
pub struct MemoryShowRepository {
    shows: Mutex<BTreeMap<i64, ShowRecord>>,
    episodes: Mutex<BTreeMap<(i64, u32), EpisodeRecord>>,
    broken_shows: Mutex<HashSet<i64>>,
    fail_upserts: Mutex<bool>,
}

impl MemoryShowRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_show(
        &self,
        id: i64,
        title: &str,
        range: EpisodeRange,
        layout: EpisodesPerSeason,
    ) -> ShowRecord {
        let now = Utc::now();
        let show = ShowRecord {
            id,
            title: title.to_string(),
            alternate_names: Vec::new(),
            range,
            episodes_per_season: layout,
            quality: None,
            status: "watching".to_string(),
            last_scanned: None,
            created_at: now,
            updated_at: now,
        };

        let (min, max) = show.absolute_bounds();
        let mut episodes = self.episodes.lock();
        for n in min..=max {
            episodes.insert(
                (id, n),
                EpisodeRecord {
                    id: id * 10_000 + i64::from(n),
                    show_id: id,
                    episode_number: n,
                    is_downloaded: false,
                    magnet_link: None,
                    created_at: now,
                    updated_at: now,
                },
            );
        }
        self.shows.lock().insert(id, show.clone());
        show
    }

    pub fn mark_downloaded(&self, show_id: i64, numbers: impl IntoIterator<Item = u32>) {
        let mut episodes = self.episodes.lock();
        for n in numbers {
            if let Some(episode) = episodes.get_mut(&(show_id, n)) {
                episode.is_downloaded = true;
                episode.magnet_link = Some(format!("magnet:?xt=urn:btih:seed{}", n));
            }
        }
    }

    /// Make `list_episodes` fail for a show
    pub fn break_show(&self, show_id: i64) {
        self.broken_shows.lock().insert(show_id);
    }

    pub fn fail_upserts(&self) {
        *self.fail_upserts.lock() = true;
    }

    pub fn episode(&self, show_id: i64, number: u32) -> Option<EpisodeRecord> {
        self.episodes.lock().get(&(show_id, number)).cloned()
    }

    pub fn downloaded(&self, show_id: i64) -> Vec<u32> {
        self.episodes
            .lock()
            .values()
            .filter(|e| e.show_id == show_id && e.is_downloaded)
            .map(|e| e.episode_number)
            .collect()
    }

    pub fn last_scanned(&self, show_id: i64) -> Option<DateTime<Utc>> {
        self.shows.lock().get(&show_id).and_then(|s| s.last_scanned)
    }
}

#[async_trait]
impl ShowRepository for MemoryShowRepository {
    async fn get_show(&self, id: i64) -> Result<Option<ShowRecord>> {
        Ok(self.shows.lock().get(&id).cloned())
    }

    async fn list_shows(&self) -> Result<Vec<ShowRecord>> {
        Ok(self.shows.lock().values().cloned().collect())
    }

    async fn list_episodes(&self, show_id: i64) -> Result<Vec<EpisodeRecord>> {
        if self.broken_shows.lock().contains(&show_id) {
            return Err(anyhow!("disk I/O error"));
        }
        Ok(self
            .episodes
            .lock()
            .values()
            .filter(|e| e.show_id == show_id)
            .cloned()
            .collect())
    }

    async fn upsert_episode(
        &self,
        show_id: i64,
        episode_number: u32,
        update: EpisodeUpdate,
    ) -> Result<EpisodeRecord> {
        if *self.fail_upserts.lock() {
            return Err(anyhow!("database is locked"));
        }
        let now = Utc::now();
        let mut episodes = self.episodes.lock();
        let record = episodes
            .entry((show_id, episode_number))
            .or_insert_with(|| EpisodeRecord {
                id: show_id * 10_000 + i64::from(episode_number),
                show_id,
                episode_number,
                is_downloaded: false,
                magnet_link: None,
                created_at: now,
                updated_at: now,
            });
        record.is_downloaded = update.is_downloaded;
        record.magnet_link = update.magnet_link;
        record.updated_at = now;
        Ok(record.clone())
    }

    async fn set_last_scanned(&self, show_id: i64, at: DateTime<Utc>) -> Result<()> {
        if let Some(show) = self.shows.lock().get_mut(&show_id) {
            show.last_scanned = Some(at);
        }
        Ok(())
    }
}

/// Scripted response for one `(show_id, absolute)` search
#[derive(Clone)]
pub enum Reply {
    Found(Vec<SearchCandidate>),
    NotFound,
    Fail,
    /// Never resolves; only the engine's timeout ends it
    Hang,
    /// Waits for the gate to open, then reports nothing found
    Gated(Arc<Notify>),
    Panic,
}

/// Search provider answering from a script, recording every query
#[derive(Default)]
pub struct ScriptedSearch {
    replies: Mutex<HashMap<(i64, u32), Reply>>,
    queries: Mutex<Vec<EpisodeQuery>>,
}

impl ScriptedSearch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reply(&self, show_id: i64, absolute: u32, reply: Reply) {
        self.replies.lock().insert((show_id, absolute), reply);
    }

    pub fn queries(&self) -> Vec<EpisodeQuery> {
        self.queries.lock().clone()
    }

    /// `(show_id, absolute)` of every search made, in order
    pub fn searched(&self) -> Vec<(i64, u32)> {
        self.queries
            .lock()
            .iter()
            .map(|q| (q.show_id, q.absolute))
            .collect()
    }
}

#[async_trait]
impl SearchProvider for ScriptedSearch {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn search(&self, query: &EpisodeQuery) -> Result<Vec<SearchCandidate>> {
        self.queries.lock().push(query.clone());
        let reply = self
            .replies
            .lock()
            .get(&(query.show_id, query.absolute))
            .cloned()
            .unwrap_or(Reply::NotFound);

        match reply {
            Reply::Found(candidates) => Ok(candidates),
            Reply::NotFound => Ok(Vec::new()),
            Reply::Fail => Err(anyhow!("connection reset by peer")),
            Reply::Hang => {
                std::future::pending::<()>().await;
                Ok(Vec::new())
            }
            Reply::Gated(gate) => {
                gate.notified().await;
                Ok(Vec::new())
            }
            Reply::Panic => panic!("search provider blew up"),
        }
    }
}

pub fn candidate(title: &str, seeders: u32) -> SearchCandidate {
    SearchCandidate {
        title: title.to_string(),
        magnet_link: format!("magnet:?xt=urn:btih:{}", title.replace(' ', "")),
        quality: Resolution::parse(title),
        seeders,
    }
}

pub fn fast_settings(max_consecutive_failures: u32) -> ScanSettings {
    ScanSettings {
        max_consecutive_failures,
        episode_delay: Duration::ZERO,
        search_timeout: Duration::from_secs(30),
    }
}

pub struct Harness {
    pub shows: Arc<MemoryShowRepository>,
    pub search: Arc<ScriptedSearch>,
    pub state_backend: Arc<MemoryScanStateBackend>,
    pub state: Arc<ScanStateStore>,
    pub engine: Arc<ScanEngine>,
}

impl Harness {
    pub fn new(settings: ScanSettings) -> Self {
        let shows = Arc::new(MemoryShowRepository::new());
        let search = Arc::new(ScriptedSearch::new());
        let state_backend = Arc::new(MemoryScanStateBackend::new());
        let state = Arc::new(ScanStateStore::new(
            state_backend.clone(),
            ScanStateOptions::default(),
        ));
        let engine = Arc::new(ScanEngine::new(
            shows.clone(),
            search.clone(),
            state.clone(),
            settings,
        ));

        Self {
            shows,
            search,
            state_backend,
            state,
            engine,
        }
    }

    pub fn controller(&self) -> ScanController {
        ScanController::new(self.engine.clone())
    }
}
