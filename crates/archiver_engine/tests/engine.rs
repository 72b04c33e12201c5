mod support;

use std::fs;
use std::sync::Arc;

use archiver_core::Stage;
use archiver_engine::{ArchiveEngine, EngineConfig, MaterializerConfig};
use pretty_assertions::assert_eq;
use support::{fixed_clock, medium_rules, snapshot, FakeWeb};
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

const FIRST: &str = "https://medium.com/@julsimon/first-post-1234abcd5678";
const SECOND: &str = "https://medium.com/@julsimon/second-post-abcd12345678";
const DELETED: &str = "https://medium.com/@julsimon/deleted-post-9999aaaa0000";

fn web() -> FakeWeb {
    let web = FakeWeb::new();
    web.page(
        FIRST,
        r#"<html><head><title>First</title></head><body><article>
        <img src="https://cdn.example.com/a.png"><script>x()</script></article></body></html>"#,
    );
    web.page(
        SECOND,
        &format!(
            r#"<html><head><title>Second</title></head><body><article>
            <p>See <a href="{FIRST}?source=user_profile">the first one</a>
            and <a href="{DELETED}">a deleted one</a>.</p></article></body></html>"#
        ),
    );
    web.image("https://cdn.example.com/a.png", [0, 0, 0, 0]);
    web
}

fn engine(web: &FakeWeb, root: &std::path::Path) -> ArchiveEngine {
    let mut materializer = MaterializerConfig::new(root);
    materializer.clock = fixed_clock();
    ArchiveEngine::new(
        Arc::new(web.clone()),
        &medium_rules(),
        EngineConfig {
            materializer,
            group_by_year: true,
            concurrency: 2,
        },
    )
    .unwrap()
}

fn inputs() -> Vec<String> {
    vec![
        FIRST.to_string(),
        SECOND.to_string(),
        DELETED.to_string(),
        FIRST.to_string(),
    ]
}

#[tokio::test]
async fn full_run_materializes_then_links() {
    archiver_logging::initialize_for_tests();
    let temp = TempDir::new().unwrap();
    let web = web();

    let summary = engine(&web, temp.path())
        .run(inputs(), CancellationToken::new())
        .await;

    assert_eq!(summary.total, 3);
    assert_eq!(summary.duplicates_skipped, 1);
    assert_eq!(summary.materialized, 2);
    assert_eq!(summary.failed, 1);
    assert_eq!(summary.images_written, 1);
    assert_eq!(summary.links_rewritten, 1);
    assert_eq!(summary.links_unresolved, 1);
    assert!(!summary.is_fatal());
    assert_eq!(summary.failures[0].identifier, DELETED);
    assert_eq!(summary.failures[0].stage, Stage::Load);

    let second = fs::read_to_string(temp.path().join("second-post").join("index.html")).unwrap();
    assert!(second.contains("href=\"../first-post/index.html\""));
    assert!(second.contains(&format!("href=\"{DELETED}\"")));
    let first = fs::read_to_string(temp.path().join("first-post").join("index.html")).unwrap();
    assert!(first.contains("src=\"image01.webp\""));
    assert!(!first.contains("<script"));
}

#[tokio::test]
async fn rerun_only_retries_failures_and_changes_nothing() {
    archiver_logging::initialize_for_tests();
    let temp = TempDir::new().unwrap();
    let web = web();

    engine(&web, temp.path())
        .run(inputs(), CancellationToken::new())
        .await;
    let before = snapshot(temp.path());
    web.reset_calls();

    let summary = engine(&web, temp.path())
        .run(inputs(), CancellationToken::new())
        .await;

    assert_eq!(summary.resumed, 2);
    assert_eq!(summary.materialized, 0);
    assert_eq!(summary.failed, 1);
    assert_eq!(web.calls(), vec![DELETED]);
    assert_eq!(snapshot(temp.path()), before);
}

#[tokio::test]
async fn cancelled_run_skips_link_resolution() {
    archiver_logging::initialize_for_tests();
    let temp = TempDir::new().unwrap();
    let web = web();
    let cancel = CancellationToken::new();
    cancel.cancel();

    let summary = engine(&web, temp.path()).run(inputs(), cancel).await;

    assert!(summary.cancelled);
    assert_eq!(summary.pending, 3);
    assert_eq!(summary.links_rewritten, 0);
    assert!(summary.link_error.is_none());
    assert!(web.calls().is_empty());
    assert!(snapshot(temp.path()).is_empty());
}

#[tokio::test]
async fn links_only_mode_uses_the_corpus_on_disk() {
    archiver_logging::initialize_for_tests();
    let temp = TempDir::new().unwrap();
    let web = web();

    // Archive the second post alone first: its link to the first stays external.
    let summary = engine(&web, temp.path())
        .run(vec![SECOND.to_string()], CancellationToken::new())
        .await;
    assert_eq!(summary.links_unresolved, 2);

    engine(&web, temp.path())
        .run(vec![FIRST.to_string()], CancellationToken::new())
        .await;
    let report = engine(&web, temp.path()).resolve_links().await.unwrap();
    assert_eq!(report.posts_scanned, 2);
    assert_eq!(report.links_rewritten, 0, "the second run already linked it");

    let second = fs::read_to_string(temp.path().join("second-post").join("index.html")).unwrap();
    assert!(second.contains("href=\"../first-post/index.html\""));
}

#[tokio::test]
async fn colliding_slug_from_a_later_run_gets_its_own_directory() {
    archiver_logging::initialize_for_tests();
    let temp = TempDir::new().unwrap();
    let a = "https://medium.com/@julsimon/update-111aaa111aaa";
    let b = "https://medium.com/@julsimon/update-222bbb222bbb";
    let web = FakeWeb::new();
    web.page(a, "<html><head><title>A</title></head><body><p>A</p></body></html>");
    web.page(b, "<html><head><title>B</title></head><body><p>B</p></body></html>");

    engine(&web, temp.path())
        .run(vec![a.to_string()], CancellationToken::new())
        .await;
    web.reset_calls();

    let summary = engine(&web, temp.path())
        .run(vec![b.to_string()], CancellationToken::new())
        .await;
    assert_eq!(summary.materialized, 1);
    assert_eq!(summary.resumed, 0);
    assert_eq!(web.calls(), vec![b]);

    web.reset_calls();
    let summary = engine(&web, temp.path())
        .run(vec![b.to_string(), a.to_string()], CancellationToken::new())
        .await;
    assert_eq!(summary.resumed, 2);
    assert!(web.calls().is_empty());

    let source = |dir: &str| archiver_engine::load_metadata(&temp.path().join(dir)).unwrap().source;
    assert_eq!(source("update"), a);
    assert_eq!(source("update-2"), b);
}
