//! On-disk layout of a materialized post and the completeness predicate.

use std::collections::BTreeSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use archiver_logging::archive_debug;
use chrono::NaiveDate;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::markup::Document;

pub const METADATA_FILE: &str = "metadata.json";

static LOCAL_IMAGE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^image\d{2,}\.[a-z]+$").expect("local image pattern is valid"));

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageRecord {
    pub origin_url: String,
    pub index: usize,
    pub filename: String,
}

/// Sidecar written next to every canonical document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostMetadata {
    pub source: String,
    pub canonical_url: Option<String>,
    pub title: Option<String>,
    pub published: Option<NaiveDate>,
    /// RFC 3339 time the post was materialized.
    pub archived_at: String,
    pub images: Vec<ImageRecord>,
    pub internal_links: Vec<String>,
}

impl PostMetadata {
    /// URLs other posts may use to link here.
    pub fn link_keys(&self) -> Vec<&str> {
        let mut keys = Vec::new();
        if self.source.starts_with("http://") || self.source.starts_with("https://") {
            keys.push(self.source.as_str());
        }
        if let Some(canonical) = self.canonical_url.as_deref() {
            keys.push(canonical);
        }
        keys
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PostReadError {
    #[error("reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("parsing {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

pub fn load_metadata(dir: &Path) -> Result<PostMetadata, PostReadError> {
    let path = dir.join(METADATA_FILE);
    let raw = fs::read_to_string(&path).map_err(|source| PostReadError::Io {
        path: path.clone(),
        source,
    })?;
    serde_json::from_str(&raw).map_err(|source| PostReadError::Parse { path, source })
}

/// Whether `dir` holds a finished post.
///
/// The document must exist and be non-empty, the metadata must parse, and
/// every image named by either of them must exist on disk. The document is
/// written last, so an interrupted write never passes.
pub fn is_complete(dir: &Path, document_name: &str) -> bool {
    match check_complete(dir, document_name) {
        Ok(()) => true,
        Err(reason) => {
            archive_debug!("{} is not a complete post: {reason}", dir.display());
            false
        }
    }
}

fn check_complete(dir: &Path, document_name: &str) -> Result<(), String> {
    let document = fs::read_to_string(dir.join(document_name)).map_err(|e| e.to_string())?;
    if document.trim().is_empty() {
        return Err("document is empty".into());
    }
    let metadata = load_metadata(dir).map_err(|e| e.to_string())?;

    let mut expected: BTreeSet<String> = metadata
        .images
        .iter()
        .map(|record| record.filename.clone())
        .collect();
    expected.extend(referenced_local_images(&document));

    for name in expected {
        let present = fs::metadata(dir.join(&name))
            .map(|meta| meta.is_file() && meta.len() > 0)
            .unwrap_or(false);
        if !present {
            return Err(format!("missing {name}"));
        }
    }
    Ok(())
}

/// Whether `name` follows the `imageNN.ext` naming of localized images.
pub(crate) fn is_local_image_name(name: &str) -> bool {
    LOCAL_IMAGE.is_match(name)
}

/// `imageNN.ext` sources used by a materialized document.
pub fn referenced_local_images(html: &str) -> Vec<String> {
    let doc = Document::parse(html);
    doc.elements_named("img")
        .into_iter()
        .filter_map(|id| doc.element(id)?.attr("src").map(str::to_string))
        .filter(|src| is_local_image_name(src))
        .collect()
}

/// A complete post found under the output root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredPost {
    /// `/`-separated, relative to the output root.
    pub rel_dir: String,
    pub dir: PathBuf,
    pub metadata: PostMetadata,
}

/// Every complete post under `root`, sorted by directory.
///
/// Posts live either directly under the root or one level down in a year
/// directory. Hidden entries are skipped.
pub fn scan_corpus(root: &Path, document_name: &str) -> io::Result<Vec<StoredPost>> {
    let mut posts = Vec::new();
    for top in sorted_subdirs(root)? {
        let top_name = dir_name(&top);
        if is_complete(&top, document_name) {
            push_post(&mut posts, top_name, top);
            continue;
        }
        for nested in sorted_subdirs(&top)? {
            if is_complete(&nested, document_name) {
                let rel_dir = format!("{top_name}/{}", dir_name(&nested));
                push_post(&mut posts, rel_dir, nested);
            }
        }
    }
    Ok(posts)
}

fn push_post(posts: &mut Vec<StoredPost>, rel_dir: String, dir: PathBuf) {
    match load_metadata(&dir) {
        Ok(metadata) => posts.push(StoredPost {
            rel_dir,
            dir,
            metadata,
        }),
        Err(err) => archive_debug!("skipping {rel_dir}: {err}"),
    }
}

fn sorted_subdirs(dir: &Path) -> io::Result<Vec<PathBuf>> {
    let mut dirs = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        if entry.file_name().to_string_lossy().starts_with('.') {
            continue;
        }
        if entry.file_type()?.is_dir() {
            dirs.push(entry.path());
        }
    }
    dirs.sort();
    Ok(dirs)
}

fn dir_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}
