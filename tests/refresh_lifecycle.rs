//! End-to-end refresh runs: real HTTP (mocked server), real stores.
//!
//! Each test seeds a MemoryStore with a page holding Feeds/Items containers,
//! points feed definitions at a wiremock server, and drives the engine
//! through complete passes, asserting on the document state afterwards.

use chrono::{DateTime, TimeZone, Utc};
use pagefeed::engine::{RefreshEngine, RefreshError, RunOutcome, MAX_ITEMS};
use pagefeed::feed::{FeedFetcher, FetchError, HttpFetcher};
use pagefeed::store::{Block, MemoryStore};
use pretty_assertions::assert_eq;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
}

fn feed_block(id: &str, title: &str, url: &str, annotations: &str) -> Block {
    Block::new(
        id,
        format!("[{title}]({url})\nSCHEDULED: <2024-05-31 Fri 08:00 .+1d>{annotations}"),
    )
}

fn seeded_store(feed_blocks: Vec<Block>, item_texts: &[&str]) -> MemoryStore {
    let items = item_texts
        .iter()
        .enumerate()
        .map(|(i, text)| Block::new(format!("i{i}"), *text))
        .collect();
    let store = MemoryStore::new();
    store.set_page(
        "rss",
        vec![
            Block::new("b1", "Feeds").with_children(feed_blocks),
            Block::new("b2", "Items").with_children(items),
        ],
    );
    store
}

const ATOM_BODY: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<feed xmlns="http://www.w3.org/2005/Atom">
  <title>Releases</title>
  <entry>
    <title>Release v2.0</title>
    <link href="https://example.com/v2"/>
    <updated>2024-05-31T09:15:00Z</updated>
  </entry>
  <entry>
    <title>Draft v3.0</title>
    <link href="https://example.com/v3-draft"/>
    <updated>2024-05-31T10:00:00Z</updated>
  </entry>
</feed>"#;

const RSS_BODY: &str = r#"<rss version="2.0"><channel>
  <item>
    <title>Weekly notes</title>
    <link>https://example.com/notes</link>
    <pubDate>Fri, 31 May 2024 07:00:00 GMT</pubDate>
  </item>
</channel></rss>"#;

async fn mount(server: &MockServer, route: &str, body: &str) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(body)
                .insert_header("Content-Type", "application/xml"),
        )
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_atom_and_rss_feeds_merge_sorted() {
    let server = MockServer::start().await;
    mount(&server, "/atom.xml", ATOM_BODY).await;
    mount(&server, "/rss.xml", RSS_BODY).await;

    let store = seeded_store(
        vec![
            feed_block("f1", "Releases", &format!("{}/atom.xml", server.uri()), ""),
            feed_block("f2", "Notes", &format!("{}/rss.xml", server.uri()), ""),
        ],
        &[],
    );
    let engine = RefreshEngine::new(store, HttpFetcher::new(), "rss");

    let outcome = engine.refresh_at(false, now()).await.unwrap();
    let RunOutcome::Completed(summary) = outcome else {
        panic!("expected completed run");
    };
    assert_eq!(summary.feeds_due, 2);
    assert!(summary.items_changed);

    let page = engine.store().page("rss").unwrap();
    let texts: Vec<&str> = page[1].children.iter().map(|b| b.text.as_str()).collect();
    assert_eq!(
        texts,
        vec![
            "<2024-05-31 10:00> [[Releases]]: [Draft v3.0](https://example.com/v3-draft)",
            "<2024-05-31 09:15> [[Releases]]: [Release v2.0](https://example.com/v2)",
            "<2024-05-31 07:00> [[Notes]]: [Weekly notes](https://example.com/notes)",
        ]
    );

    // Both schedules advanced past `now`, interval suffix untouched.
    for feed in &page[0].children {
        assert!(feed.text.contains("SCHEDULED: <2024-06-02 Sun 08:00 .+1d>"), "{}", feed.text);
    }
    assert_eq!(page[1].text, "Items");
}

#[tokio::test]
async fn test_title_filter_rewrites_and_drops() {
    let server = MockServer::start().await;
    mount(&server, "/atom.xml", ATOM_BODY).await;

    let store = seeded_store(
        vec![feed_block(
            "f1",
            "Releases",
            &format!("{}/atom.xml", server.uri()),
            "\n<!-- REGEXP: /^Release (.+)$/$1 -->",
        )],
        &[],
    );
    let engine = RefreshEngine::new(store, HttpFetcher::new(), "rss");

    engine.refresh_at(false, now()).await.unwrap();
    let page = engine.store().page("rss").unwrap();
    let texts: Vec<&str> = page[1].children.iter().map(|b| b.text.as_str()).collect();
    // "Draft v3.0" does not match the filter and is dropped entirely.
    assert_eq!(
        texts,
        vec!["<2024-05-31 09:15> [[Releases]]: [v2.0](https://example.com/v2)"]
    );
    // The annotation line survives the schedule rewrite byte-for-byte.
    assert!(page[0].children[0]
        .text
        .ends_with("<!-- REGEXP: /^Release (.+)$/$1 -->"));
}

#[tokio::test]
async fn test_second_run_issues_no_item_writes() {
    let server = MockServer::start().await;
    mount(&server, "/atom.xml", ATOM_BODY).await;

    let store = seeded_store(
        vec![feed_block("f1", "Releases", &format!("{}/atom.xml", server.uri()), "")],
        &[],
    );
    let engine = RefreshEngine::new(store, HttpFetcher::new(), "rss");

    engine.refresh_at(false, now()).await.unwrap();
    let (_, inserts, removes) = engine.store().mutation_counts();
    let items_before = engine.store().page("rss").unwrap()[1].children.clone();

    // Second pass with force: the remote has nothing new.
    let outcome = engine.refresh_at(true, now()).await.unwrap();
    let RunOutcome::Completed(summary) = outcome else {
        panic!("expected completed run");
    };
    assert!(!summary.items_changed);

    let (_, inserts_after, removes_after) = engine.store().mutation_counts();
    assert_eq!(inserts, inserts_after);
    assert_eq!(removes, removes_after);
    assert_eq!(engine.store().page("rss").unwrap()[1].children, items_before);
}

#[tokio::test]
async fn test_one_failing_fetch_fails_both_feeds() {
    let server = MockServer::start().await;
    mount(&server, "/atom.xml", ATOM_BODY).await;
    Mock::given(method("GET"))
        .and(path("/down.xml"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let store = seeded_store(
        vec![
            feed_block("f1", "Releases", &format!("{}/atom.xml", server.uri()), ""),
            feed_block("f2", "Down", &format!("{}/down.xml", server.uri()), ""),
        ],
        &[],
    );
    let engine = RefreshEngine::new(store, HttpFetcher::new(), "rss");

    let err = engine.refresh_at(false, now()).await.unwrap_err();
    assert!(matches!(err, RefreshError::Fetch { .. }));

    let page = engine.store().page("rss").unwrap();
    // Neither schedule advanced, no items committed, label restored.
    for feed in &page[0].children {
        assert!(feed.text.contains("SCHEDULED: <2024-05-31 Fri 08:00 .+1d>"));
    }
    assert!(page[1].children.is_empty());
    assert_eq!(page[1].text, "Items");
}

#[tokio::test]
async fn test_existing_items_kept_and_capped() {
    let server = MockServer::start().await;
    mount(&server, "/rss.xml", RSS_BODY).await;

    // Seed the container at the cap with items newer than the feed's entry.
    let seeded: Vec<String> = (0..MAX_ITEMS)
        .map(|i| format!("<2024-05-31 11:{:02}> [[Old]]: [old {i}](https://example.com/old{i})", i % 60))
        .collect();
    let seeded_refs: Vec<&str> = seeded.iter().map(String::as_str).collect();
    let store = seeded_store(
        vec![feed_block("f1", "Notes", &format!("{}/rss.xml", server.uri()), "")],
        &seeded_refs,
    );
    let engine = RefreshEngine::new(store, HttpFetcher::new(), "rss");

    engine.refresh_at(false, now()).await.unwrap();
    let page = engine.store().page("rss").unwrap();
    assert_eq!(page[1].children.len(), MAX_ITEMS);
    // The fetched 07:00 entry is older than every seeded 11:xx item and
    // fell off the end of the capped list.
    assert!(page[1]
        .children
        .iter()
        .all(|b| !b.text.contains("Weekly notes")));
}

/// Resolves only after a delay, so a second refresh can arrive while the
/// first is still in its fetch phase.
struct StallFetcher;

impl FeedFetcher for StallFetcher {
    async fn fetch(&self, _url: &str) -> Result<String, FetchError> {
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        Ok(r#"<rss version="2.0"><channel></channel></rss>"#.to_string())
    }
}

#[tokio::test]
async fn test_overlapping_refresh_is_skipped() {
    let store = seeded_store(
        vec![feed_block("f1", "Slow", "https://example.com/slow.xml", "")],
        &[],
    );
    let engine = RefreshEngine::new(store, StallFetcher, "rss");

    let (first, second) = futures::join!(
        engine.refresh_at(false, now()),
        engine.refresh_at(false, now()),
    );

    assert!(matches!(first.unwrap(), RunOutcome::Completed(_)));
    assert_eq!(second.unwrap(), RunOutcome::SkippedBusy);
}
