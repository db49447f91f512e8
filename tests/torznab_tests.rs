use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    Router,
    extract::{Query, State},
    http::{StatusCode, header},
    response::IntoResponse,
    routing::get,
};
use parking_lot::Mutex;
use pretty_assertions::assert_eq;
use tokio::net::TcpListener;

use kiroku::indexer::{EpisodeQuery, SearchProvider, TorznabSearchProvider};

type Requests = Arc<Mutex<Vec<String>>>;

fn feed(titles: &[&str]) -> String {
    let items: String = titles
        .iter()
        .enumerate()
        .map(|(i, title)| {
            format!(
                "<item><title>{}</title><nyaa:seeders>{}</nyaa:seeders>\
                 <nyaa:infoHash>{:040x}</nyaa:infoHash></item>",
                title,
                100 + i,
                i + 1
            )
        })
        .collect();
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?><rss xmlns:nyaa="https://nyaa.si/xmlns/nyaa" version="2.0"><channel>{}</channel></rss>"#,
        items
    )
}

/// Canned search feed keyed on the `q` parameter
async fn search_feed(
    State(requests): State<Requests>,
    Query(params): Query<HashMap<String, String>>,
) -> impl IntoResponse {
    let term = params.get("q").cloned().unwrap_or_default();
    requests.lock().push(term.clone());

    let (status, body) = match term.as_str() {
        t if t.starts_with("Broken") => (StatusCode::INTERNAL_SERVER_ERROR, "upstream down".to_string()),
        t if t.starts_with("Missing") => (StatusCode::NOT_FOUND, String::new()),
        "Sousou no Frieren S02E09" => (StatusCode::OK, feed(&["[Group] Sousou no Frieren S02E10 1080p"])),
        "Frieren S02E09" => (
            StatusCode::OK,
            feed(&["[Group] Frieren S02E09 1080p WEB", "[Group] Frieren S02E08 1080p WEB"]),
        ),
        _ => (StatusCode::OK, feed(&[])),
    };

    (status, [(header::CONTENT_TYPE, "application/rss+xml")], body)
}

async fn serve_feed() -> (SocketAddr, Requests) {
    let requests = Requests::default();
    let app = Router::new()
        .route("/", get(search_feed))
        .with_state(requests.clone());

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (addr, requests)
}

fn provider(addr: SocketAddr) -> TorznabSearchProvider {
    TorznabSearchProvider::new(&format!("http://{}/", addr), None, Duration::from_secs(5)).unwrap()
}

fn query(title: &str, alternate_names: &[&str]) -> EpisodeQuery {
    EpisodeQuery {
        show_id: 7,
        title: title.to_string(),
        alternate_names: alternate_names.iter().map(|s| s.to_string()).collect(),
        season: 2,
        episode: 9,
        absolute: 21,
    }
}

#[tokio::test]
async fn test_not_found_response_means_no_results() {
    let (addr, requests) = serve_feed().await;

    let results = provider(addr).search(&query("Missing Show", &[])).await.unwrap();

    assert!(results.is_empty());
    assert_eq!(
        *requests.lock(),
        vec!["Missing Show S02E09".to_string(), "Missing Show 21".to_string()]
    );
}

#[tokio::test]
async fn test_server_error_is_reported() {
    let (addr, requests) = serve_feed().await;

    let err = provider(addr)
        .search(&query("Broken Show", &["Missing Alias"]))
        .await
        .unwrap_err();

    assert!(err.to_string().contains("HTTP 500"));
    // The first failure ends the search; later terms are not tried
    assert_eq!(*requests.lock(), vec!["Broken Show S02E09".to_string()]);
}

#[tokio::test]
async fn test_falls_through_to_alternate_name() {
    let (addr, requests) = serve_feed().await;
    let provider = provider(addr);
    let query = query("Sousou no Frieren", &["Frieren"]);

    let results = provider.search(&query).await.unwrap();

    assert_eq!(results.len(), 1);
    assert_eq!(results[0].title, "[Group] Frieren S02E09 1080p WEB");
    assert!(results[0].magnet_link.starts_with("magnet:?xt=urn:btih:"));
    assert_eq!(
        *requests.lock(),
        vec![
            "Sousou no Frieren S02E09".to_string(),
            "Sousou no Frieren 21".to_string(),
            "Frieren S02E09".to_string(),
        ]
    );

    // Repeat searches are answered from the feed cache
    let again = provider.search(&query).await.unwrap();
    assert_eq!(again, results);
    assert_eq!(requests.lock().len(), 3);
}
