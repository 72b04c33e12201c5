//! Pass 2: rewriting links between archived posts.
//!
//! The link map is built from the whole on-disk corpus first and only then
//! handed, read-only, to the rewrite step. Rewriting refuses to run against a
//! map that does not cover every post it is asked to touch.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use archiver_core::{normalize_url, relative_href, LinkMap, LinkMapBuilder, LinkReport};
use archiver_logging::{archive_debug, archive_info, archive_warn};
use url::Url;

use crate::markup::Document;
use crate::persist::{AtomicFileWriter, PersistError};
use crate::post::{scan_corpus, StoredPost};

#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
    #[error("link map does not cover {missing} post(s), first: {first}")]
    IncompleteMap { missing: usize, first: String },
    #[error("scanning corpus under {path}: {source}")]
    Scan {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("reading {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    Persist(#[from] PersistError),
    #[error("link resolution task failed: {0}")]
    Task(String),
}

/// Phase 1: registers every post of the corpus.
pub fn build_link_map(posts: &[StoredPost]) -> LinkMap {
    let mut builder = LinkMapBuilder::new();
    for post in posts {
        for key in builder.register(&post.rel_dir, post.metadata.link_keys()) {
            archive_warn!("{key} is claimed by another post; keeping the first, not {}", post.rel_dir);
        }
    }
    builder.build()
}

/// Phase 2 over a whole corpus. Fails before touching anything if `map`
/// misses one of `posts`.
pub fn rewrite_corpus(
    posts: &[StoredPost],
    map: &LinkMap,
    document_name: &str,
) -> Result<LinkReport, ResolveError> {
    let missing: Vec<&str> = posts
        .iter()
        .filter(|post| !map.covers(&post.rel_dir))
        .map(|post| post.rel_dir.as_str())
        .collect();
    if let Some(first) = missing.first() {
        return Err(ResolveError::IncompleteMap {
            missing: missing.len(),
            first: first.to_string(),
        });
    }

    let mut report = LinkReport::default();
    for post in posts {
        report.absorb(rewrite_post(post, map, document_name)?);
    }
    Ok(report)
}

/// Rewrites the internal links of one post against `map`.
///
/// Only absolute hrefs recorded as internal at sanitize time are candidates,
/// so hrefs that are already local are never touched again. Targets missing
/// from the map keep their original URL.
pub fn rewrite_post(
    post: &StoredPost,
    map: &LinkMap,
    document_name: &str,
) -> Result<LinkReport, ResolveError> {
    let path = post.dir.join(document_name);
    let html = fs::read_to_string(&path).map_err(|source| ResolveError::Read {
        path: path.clone(),
        source,
    })?;

    let internal: HashSet<String> = post
        .metadata
        .internal_links
        .iter()
        .map(|href| normalize_url(href))
        .collect();

    let mut report = LinkReport {
        posts_scanned: 1,
        ..LinkReport::default()
    };
    if internal.is_empty() {
        return Ok(report);
    }

    let mut document = Document::parse(&html);
    for id in document.elements_named("a") {
        let Some(href) = document.element(id).and_then(|el| el.attr("href")) else {
            continue;
        };
        if Url::parse(href).is_err() || !internal.contains(&normalize_url(href)) {
            continue;
        }
        match map.lookup(href) {
            Some(target) => {
                let local = relative_href(&post.rel_dir, target, document_name);
                archive_debug!("{}: {href} -> {local}", post.rel_dir);
                document.edit_element(id, |el| el.set_attr("href", local));
                report.links_rewritten += 1;
            }
            None => {
                archive_warn!("{}: no archived post for {href}; leaving it external", post.rel_dir);
                report.links_unresolved += 1;
            }
        }
    }

    if report.links_rewritten > 0 {
        AtomicFileWriter::new(&post.dir).write(document_name, &document.to_html())?;
        report.posts_rewritten = 1;
    }
    Ok(report)
}

/// Both phases over everything under `root`.
pub fn resolve_corpus(root: &Path, document_name: &str) -> Result<LinkReport, ResolveError> {
    let posts = scan_corpus(root, document_name).map_err(|source| ResolveError::Scan {
        path: root.to_path_buf(),
        source,
    })?;
    let map = build_link_map(&posts);
    archive_info!(
        "link map: {} urls across {} posts",
        map.len(),
        map.post_count()
    );
    let report = rewrite_corpus(&posts, &map, document_name)?;
    archive_info!(
        "links: {} rewritten in {} posts, {} left external",
        report.links_rewritten,
        report.posts_rewritten,
        report.links_unresolved
    );
    Ok(report)
}
