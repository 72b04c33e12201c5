use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::LazyLock;

use chrono::NaiveDate;
use regex::Regex;
use url::Url;

use crate::source::{SourceItem, SourceKind};

const MAX_SLUG_CHARS: usize = 120;

static FULL_UUID: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)[-_]?[0-9a-f]{8}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{12}")
        .expect("uuid pattern is valid")
});
static URL_DATE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"/(\d{4})/(\d{2})/(\d{2})/").expect("url date pattern is valid"));
static PREFIX_DATE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d{4})-(\d{2})-(\d{2})").expect("prefix date pattern is valid"));

/// Where a post lives inside the output root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostLocation {
    pub slug: String,
    /// Directory relative to the output root, always `/`-separated.
    pub rel_dir: String,
    pub published: Option<NaiveDate>,
}

/// Derives a clean, stable directory name from a source identifier.
///
/// Opaque tokens (full UUIDs, trailing hex ids such as `-e09fe95bbfce`) are
/// dropped. When the identifier carries a publication date the slug is
/// prefixed with it unless it already starts with it.
pub fn derive_slug(item: &SourceItem) -> String {
    let raw = raw_name(item);
    let stripped = strip_volatile_tokens(&raw);
    let clean = sanitize_component(&stripped);
    match identifier_date(item) {
        Some(date) => {
            let prefix = date.format("%Y-%m-%d").to_string();
            if clean.starts_with(&prefix) {
                clean
            } else {
                format!("{prefix}_{clean}")
            }
        }
        None => clean,
    }
}

/// Publication date recoverable from the identifier alone (no network).
///
/// URLs are searched for a `/YYYY/MM/DD/` segment run, file names for a
/// leading `YYYY-MM-DD`.
pub fn identifier_date(item: &SourceItem) -> Option<NaiveDate> {
    let caps = match item.kind {
        SourceKind::Remote => {
            let path = Url::parse(&item.identifier)
                .map(|u| u.path().to_string())
                .unwrap_or_default();
            let caps = URL_DATE.captures(&path)?;
            [caps[1].to_string(), caps[2].to_string(), caps[3].to_string()]
        }
        SourceKind::LocalFile => {
            let stem = file_stem(&item.identifier);
            let caps = PREFIX_DATE.captures(&stem)?;
            [caps[1].to_string(), caps[2].to_string(), caps[3].to_string()]
        }
    };
    let year = caps[0].parse().ok()?;
    let month = caps[1].parse().ok()?;
    let day = caps[2].parse().ok()?;
    NaiveDate::from_ymd_opt(year, month, day)
}

fn raw_name(item: &SourceItem) -> String {
    match item.kind {
        SourceKind::Remote => {
            let Ok(url) = Url::parse(&item.identifier) else {
                return item.identifier.clone();
            };
            let segment = url
                .path_segments()
                .and_then(|segments| segments.filter(|s| !s.is_empty()).last())
                .map(|s| {
                    s.trim_end_matches(".html")
                        .trim_end_matches(".htm")
                        .to_string()
                });
            segment.unwrap_or_else(|| url.host_str().unwrap_or("untitled").to_string())
        }
        SourceKind::LocalFile => file_stem(&item.identifier),
    }
}

fn file_stem(identifier: &str) -> String {
    Path::new(identifier)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| identifier.to_string())
}

fn strip_volatile_tokens(name: &str) -> String {
    let without_uuid = FULL_UUID.replace_all(name, "").into_owned();
    match without_uuid.rsplit_once('-') {
        Some((head, tail)) if !head.is_empty() && looks_like_opaque_id(tail) => head.to_string(),
        _ => without_uuid,
    }
}

fn looks_like_opaque_id(token: &str) -> bool {
    (8..=12).contains(&token.len())
        && token.chars().all(|c| c.is_ascii_hexdigit())
        && token.chars().any(|c| c.is_ascii_digit())
}

/// Filesystem-safe path component: forbidden characters become `_`, runs of
/// `_` collapse, reserved Windows device names get a trailing `_`.
pub fn sanitize_component(input: &str) -> String {
    let replaced: String = input
        .chars()
        .map(|c| if is_forbidden(c) { '_' } else { c })
        .collect();
    let trimmed = replaced.trim_matches(&['_', ' ', '.'][..]);

    let mut compacted = String::with_capacity(trimmed.len());
    let mut prev_underscore = false;
    for c in trimmed.chars() {
        if c == '_' {
            if !prev_underscore {
                compacted.push(c);
            }
            prev_underscore = true;
        } else {
            compacted.push(c);
            prev_underscore = false;
        }
    }

    let mut name: String = compacted.chars().take(MAX_SLUG_CHARS).collect();
    if name.is_empty() {
        name = "untitled".to_string();
    }
    if is_reserved_windows_name(&name) {
        name.push('_');
    }
    name
}

fn is_forbidden(c: char) -> bool {
    matches!(c,
        '\\' | '/' | ':' | '*' | '?' | '"' | '<' | '>' | '|' | '%' | '\0'..='\u{1F}'
    )
}

fn is_reserved_windows_name(name: &str) -> bool {
    const RESERVED: &[&str] = &[
        "CON", "PRN", "AUX", "NUL", "COM1", "COM2", "COM3", "COM4", "COM5", "COM6", "COM7", "COM8",
        "COM9", "LPT1", "LPT2", "LPT3", "LPT4", "LPT5", "LPT6", "LPT7", "LPT8", "LPT9",
    ];
    RESERVED.iter().any(|r| r.eq_ignore_ascii_case(name))
}

/// A complete post found on disk before the run starts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExistingPost {
    pub rel_dir: String,
    /// Identifier the post was archived from.
    pub source: String,
}

/// Hands out collision-free post locations in input order.
///
/// Two items that derive the same directory get `-2`, `-3`, ... suffixes.
/// Directories of posts already on disk are never handed to another source,
/// and a source that is already archived gets its directory back, so the
/// result does not depend on the order of earlier runs.
#[derive(Debug, Default)]
pub struct LocationAllocator {
    group_by_year: bool,
    taken: HashSet<String>,
    archived: HashMap<String, String>,
}

impl LocationAllocator {
    pub fn new(group_by_year: bool) -> Self {
        Self {
            group_by_year,
            ..Self::default()
        }
    }

    pub fn with_existing(group_by_year: bool, existing: &[ExistingPost]) -> Self {
        let mut allocator = Self::new(group_by_year);
        for post in existing {
            allocator.taken.insert(post.rel_dir.to_lowercase());
            allocator
                .archived
                .entry(post.source.clone())
                .or_insert_with(|| post.rel_dir.clone());
        }
        allocator
    }

    pub fn allocate(&mut self, item: &SourceItem) -> PostLocation {
        let published = identifier_date(item);
        if let Some(rel_dir) = self.archived.remove(&item.identifier) {
            let slug = rel_dir.rsplit('/').next().unwrap_or(&rel_dir).to_string();
            return PostLocation {
                slug,
                rel_dir,
                published,
            };
        }

        let base = derive_slug(item);
        let prefix = match (self.group_by_year, published) {
            (true, Some(date)) => Some(date.format("%Y").to_string()),
            _ => None,
        };

        let mut suffix = 1usize;
        loop {
            let slug = if suffix == 1 {
                base.clone()
            } else {
                format!("{base}-{suffix}")
            };
            let rel_dir = match &prefix {
                Some(year) => format!("{year}/{slug}"),
                None => slug.clone(),
            };
            // Case-insensitive filesystems would merge these.
            if self.taken.insert(rel_dir.to_lowercase()) {
                return PostLocation {
                    slug,
                    rel_dir,
                    published,
                };
            }
            suffix += 1;
        }
    }
}
