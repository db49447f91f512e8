//! RSS / Torznab search provider
//!
//! Talks to either a Torznab endpoint (when an API key is configured) or a
//! nyaa-style RSS search feed. Both return RSS 2.0 with per-item extension
//! attributes, so one parser handles both:
//!
//! ```xml
//! <item>
//!   <title>[SubsPlease] Frieren - 21 (1080p)</title>
//!   <link>https://nyaa.si/download/123.torrent</link>
//!   <nyaa:seeders>512</nyaa:seeders>
//!   <nyaa:infoHash>0123abcd...</nyaa:infoHash>
//!   <torznab:attr name="seeders" value="512"/>
//!   <torznab:attr name="magneturl" value="magnet:?xt=..."/>
//! </item>
//! ```

use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};
use reqwest::StatusCode;
use tracing::{debug, info};

use super::matching::title_matches_episode;
use super::{EpisodeQuery, SearchCandidate, SearchProvider};
use crate::services::cache::TtlCache;
use crate::torrent::Resolution;

const USER_AGENT: &str = concat!("kiroku/", env!("CARGO_PKG_VERSION"));

/// How long raw feed results are reused for an identical search term
const FEED_CACHE_TTL: Duration = Duration::from_secs(5 * 60);

/// Anime - English-translated category on nyaa
const NYAA_ANIME_CATEGORY: &str = "1_2";

/// Item fields collected while walking the feed
#[derive(Debug, Default)]
struct ItemBuilder {
    title: Option<String>,
    link: Option<String>,
    enclosure: Option<String>,
    magnet: Option<String>,
    info_hash: Option<String>,
    seeders: Option<u32>,
}

impl ItemBuilder {
    fn set_attr(&mut self, name: &str, value: &str) {
        match name {
            "seeders" => self.seeders = value.parse().ok(),
            "magneturl" => self.magnet = Some(value.to_string()),
            "infohash" => self.info_hash = Some(value.to_string()),
            _ => {}
        }
    }

    fn set_text(&mut self, tag: &str, text: String) {
        match tag {
            "title" => self.title = Some(text),
            "link" => self.link = Some(text),
            "nyaa:seeders" => self.seeders = text.parse().ok(),
            "nyaa:infoHash" => self.info_hash = Some(text),
            _ => {}
        }
    }

    fn magnet_link(&self, title: &str) -> Option<String> {
        if let Some(magnet) = &self.magnet {
            return Some(magnet.clone());
        }
        if let Some(link) = [&self.link, &self.enclosure]
            .into_iter()
            .flatten()
            .find(|link| link.starts_with("magnet:"))
        {
            return Some(link.clone());
        }
        self.info_hash.as_ref().map(|hash| {
            format!(
                "magnet:?xt=urn:btih:{}&dn={}",
                hash.to_lowercase(),
                urlencoding::encode(title)
            )
        })
    }

    fn build(self) -> Option<SearchCandidate> {
        let title = self.title.clone()?;
        let Some(magnet_link) = self.magnet_link(&title) else {
            debug!(title = %title, "Skipping release without magnet or info hash");
            return None;
        };

        Some(SearchCandidate {
            quality: Resolution::parse(&title),
            seeders: self.seeders.unwrap_or(0),
            magnet_link,
            title,
        })
    }
}

fn attrs_of(e: &BytesStart<'_>) -> Vec<(String, String)> {
    e.attributes()
        .flatten()
        .map(|attr| {
            (
                String::from_utf8_lossy(attr.key.as_ref()).to_string(),
                String::from_utf8_lossy(&attr.value).to_string(),
            )
        })
        .collect()
}

/// Handle attribute-carrying elements (`torznab:attr`, `enclosure`)
fn apply_element(item: &mut ItemBuilder, tag: &str, e: &BytesStart<'_>) {
    let attrs = attrs_of(e);
    let get = |key: &str| attrs.iter().find(|(k, _)| k == key).map(|(_, v)| v.as_str());

    match tag {
        "torznab:attr" | "newznab:attr" => {
            if let (Some(name), Some(value)) = (get("name"), get("value")) {
                item.set_attr(name, value);
            }
        }
        "enclosure" => item.enclosure = get("url").map(str::to_string),
        _ => {}
    }
}

/// Parse an RSS/Torznab feed into candidates, dropping items without a magnet
pub fn parse_feed(xml: &str) -> Result<Vec<SearchCandidate>> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut candidates = Vec::new();
    let mut current: Option<ItemBuilder> = None;
    let mut current_tag = String::new();

    loop {
        match reader.read_event() {
            Ok(Event::Start(ref e)) => {
                let tag = String::from_utf8_lossy(e.name().as_ref()).to_string();
                if tag == "item" {
                    current = Some(ItemBuilder::default());
                } else if let Some(item) = current.as_mut() {
                    apply_element(item, &tag, e);
                }
                current_tag = tag;
            }
            Ok(Event::Empty(ref e)) => {
                if let Some(item) = current.as_mut() {
                    let tag = String::from_utf8_lossy(e.name().as_ref()).to_string();
                    apply_element(item, &tag, e);
                }
            }
            Ok(Event::Text(ref e)) => {
                if let Some(item) = current.as_mut() {
                    let text = e.unescape().unwrap_or_default().to_string();
                    if !text.is_empty() {
                        item.set_text(&current_tag, text);
                    }
                }
            }
            Ok(Event::CData(e)) => {
                if let Some(item) = current.as_mut() {
                    let raw = e.into_inner();
                    let text = String::from_utf8_lossy(&raw).trim().to_string();
                    if !text.is_empty() {
                        item.set_text(&current_tag, text);
                    }
                }
            }
            Ok(Event::End(ref e)) => {
                if e.name().as_ref() == b"item"
                    && let Some(candidate) = current.take().and_then(ItemBuilder::build)
                {
                    candidates.push(candidate);
                }
                current_tag.clear();
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(anyhow!(
                    "Feed parse error at position {}: {}",
                    reader.error_position(),
                    e
                ));
            }
            _ => {}
        }
    }

    Ok(candidates)
}

pub struct TorznabSearchProvider {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    cache: TtlCache<String, Vec<SearchCandidate>>,
}

impl TorznabSearchProvider {
    pub fn new(base_url: &str, api_key: Option<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .gzip(true)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.filter(|key| !key.is_empty()),
            cache: TtlCache::new(FEED_CACHE_TTL),
        })
    }

    /// Search URL for a free-text term
    pub fn search_url(&self, term: &str) -> String {
        let term = urlencoding::encode(term);
        match &self.api_key {
            Some(key) => format!(
                "{}/api?t=search&apikey={}&q={}",
                self.base_url,
                urlencoding::encode(key),
                term
            ),
            None => format!(
                "{}/?page=rss&q={}&c={}&f=0",
                self.base_url, term, NYAA_ANIME_CATEGORY
            ),
        }
    }

    /// Search terms in the order they are tried
    pub fn search_terms(query: &EpisodeQuery) -> Vec<String> {
        query
            .names()
            .into_iter()
            .flat_map(|name| {
                [
                    format!("{} {}", name, query.episode_tag()),
                    format!("{} {:02}", name, query.absolute),
                ]
            })
            .collect()
    }

    async fn fetch(&self, term: &str) -> Result<Vec<SearchCandidate>> {
        let key = term.to_lowercase();
        if let Some(cached) = self.cache.get(&key) {
            debug!(term, results = cached.len(), "Feed cache hit");
            return Ok(cached);
        }

        let response = self
            .client
            .get(self.search_url(term))
            .send()
            .await
            .with_context(|| format!("Search request for '{}' failed", term))?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(Vec::new());
        }
        if !status.is_success() {
            return Err(anyhow!("Search for '{}' returned HTTP {}", term, status));
        }

        let body = response.text().await.context("Failed to read search response")?;
        let candidates = parse_feed(&body)?;
        let purged = self.cache.purge_expired();
        if purged > 0 {
            debug!(purged, "Dropped expired feed cache entries");
        }
        self.cache.insert(key, candidates.clone());
        Ok(candidates)
    }
}

#[async_trait]
impl SearchProvider for TorznabSearchProvider {
    fn name(&self) -> &str {
        if self.api_key.is_some() { "torznab" } else { "rss" }
    }

    async fn search(&self, query: &EpisodeQuery) -> Result<Vec<SearchCandidate>> {
        for term in Self::search_terms(query) {
            let matching: Vec<SearchCandidate> = self
                .fetch(&term)
                .await?
                .into_iter()
                .filter(|c| title_matches_episode(&c.title, query.season, query.episode, query.absolute))
                .collect();

            if !matching.is_empty() {
                info!(
                    show_id = query.show_id,
                    term = %term,
                    results = matching.len(),
                    "Found matching releases"
                );
                return Ok(matching);
            }
            debug!(show_id = query.show_id, term = %term, "No matching releases");
        }

        Ok(Vec::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const NYAA_FEED: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<rss xmlns:atom="http://www.w3.org/2005/Atom" xmlns:nyaa="https://nyaa.si/xmlns/nyaa" version="2.0">
  <channel>
    <title>Nyaa - "frieren" - Torrent File RSS</title>
    <item>
      <title>[SubsPlease] Sousou no Frieren - 21 (1080p) [ABCD1234].mkv</title>
      <link>https://nyaa.si/download/100.torrent</link>
      <nyaa:seeders>812</nyaa:seeders>
      <nyaa:infoHash>ABCDEF0123456789ABCDEF0123456789ABCDEF01</nyaa:infoHash>
    </item>
    <item>
      <title>[SubsPlease] Sousou no Frieren - 21 (720p) [EF567890].mkv</title>
      <link>https://nyaa.si/download/101.torrent</link>
      <nyaa:seeders>120</nyaa:seeders>
      <nyaa:infoHash>1111111111111111111111111111111111111111</nyaa:infoHash>
    </item>
    <item>
      <title>Release without hash</title>
      <link>https://nyaa.si/download/102.torrent</link>
    </item>
  </channel>
</rss>"#;

    const TORZNAB_FEED: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0" xmlns:torznab="http://torznab.com/schemas/2015/feed">
  <channel>
    <item>
      <title><![CDATA[Frieren S02E09 2160p WEB]]></title>
      <link>magnet:?xt=urn:btih:feed&amp;dn=Frieren</link>
      <enclosure url="https://tracker.example/get/1" length="100" type="application/x-bittorrent"/>
      <torznab:attr name="seeders" value="42"/>
    </item>
    <item>
      <title>Frieren S02E09 720p</title>
      <torznab:attr name="seeders" value="7"/>
      <torznab:attr name="magneturl" value="magnet:?xt=urn:btih:attr"/>
    </item>
  </channel>
</rss>"#;

    fn provider(api_key: Option<&str>) -> TorznabSearchProvider {
        TorznabSearchProvider::new(
            "https://nyaa.si/",
            api_key.map(str::to_string),
            Duration::from_secs(5),
        )
        .unwrap()
    }

    #[test]
    fn test_parse_nyaa_feed() {
        let candidates = parse_feed(NYAA_FEED).unwrap();
        assert_eq!(candidates.len(), 2);

        let first = &candidates[0];
        assert_eq!(first.seeders, 812);
        assert_eq!(first.quality, Resolution::P1080);
        assert!(first
            .magnet_link
            .starts_with("magnet:?xt=urn:btih:abcdef0123456789abcdef0123456789abcdef01&dn="));
        assert_eq!(candidates[1].quality, Resolution::P720);
    }

    #[test]
    fn test_parse_torznab_feed() {
        let candidates = parse_feed(TORZNAB_FEED).unwrap();
        assert_eq!(candidates.len(), 2);
        assert_eq!(candidates[0].title, "Frieren S02E09 2160p WEB");
        assert_eq!(candidates[0].magnet_link, "magnet:?xt=urn:btih:feed&dn=Frieren");
        assert_eq!(candidates[0].seeders, 42);
        assert_eq!(candidates[1].magnet_link, "magnet:?xt=urn:btih:attr");
    }

    #[test]
    fn test_parse_empty_feed() {
        let xml = r#"<rss version="2.0"><channel><title>empty</title></channel></rss>"#;
        assert!(parse_feed(xml).unwrap().is_empty());
    }

    #[test]
    fn test_search_url_modes() {
        assert_eq!(
            provider(None).search_url("Frieren S02E09"),
            "https://nyaa.si/?page=rss&q=Frieren%20S02E09&c=1_2&f=0"
        );
        assert_eq!(
            provider(Some("secret")).search_url("Frieren 21"),
            "https://nyaa.si/api?t=search&apikey=secret&q=Frieren%2021"
        );
        assert_eq!(provider(Some("")).name(), "rss");
    }

    #[test]
    fn test_search_terms_widen_over_names() {
        let query = EpisodeQuery {
            show_id: 1,
            title: "Sousou no Frieren".to_string(),
            alternate_names: vec!["Frieren".to_string()],
            season: 2,
            episode: 9,
            absolute: 21,
        };
        assert_eq!(
            TorznabSearchProvider::search_terms(&query),
            vec![
                "Sousou no Frieren S02E09".to_string(),
                "Sousou no Frieren 21".to_string(),
                "Frieren S02E09".to_string(),
                "Frieren 21".to_string(),
            ]
        );
    }
}
