use std::collections::{BTreeMap, BTreeSet};

use url::Url;

const TRACKING_PARAMS: &[&str] = &["source", "ref", "sk"];

/// Canonical form of an article URL used as a `LinkMap` key.
///
/// Drops the fragment, tracking query parameters (`utm_*`, `source`, `ref`)
/// and a trailing slash. Strings that are not absolute URLs are only trimmed.
pub fn normalize_url(raw: &str) -> String {
    let trimmed = raw.trim();
    let Ok(mut url) = Url::parse(trimmed) else {
        return trimmed.to_string();
    };
    url.set_fragment(None);

    let kept: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(k, _)| !k.starts_with("utm_") && !TRACKING_PARAMS.contains(&k.as_ref()))
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    if kept.is_empty() {
        url.set_query(None);
    } else {
        url.query_pairs_mut().clear().extend_pairs(kept);
    }

    if url.path().len() > 1 && url.path().ends_with('/') {
        let path = url.path().trim_end_matches('/').to_string();
        url.set_path(&path);
    }
    url.to_string()
}

/// Mutable accumulator for pass 1. Turned into an immutable [`LinkMap`] by [`build`](Self::build).
#[derive(Debug, Default)]
pub struct LinkMapBuilder {
    entries: BTreeMap<String, String>,
    posts: BTreeSet<String>,
}

impl LinkMapBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers every key of one post. Returns the keys that were already
    /// claimed by another post (first registration wins).
    pub fn register<'a>(
        &mut self,
        rel_dir: &str,
        keys: impl IntoIterator<Item = &'a str>,
    ) -> Vec<String> {
        self.posts.insert(rel_dir.to_string());
        let mut conflicts = Vec::new();
        for key in keys {
            let key = normalize_url(key);
            if key.is_empty() {
                continue;
            }
            match self.entries.get(&key) {
                Some(existing) if existing != rel_dir => conflicts.push(key),
                Some(_) => {}
                None => {
                    self.entries.insert(key, rel_dir.to_string());
                }
            }
        }
        conflicts
    }

    pub fn build(self) -> LinkMap {
        LinkMap {
            entries: self.entries,
            posts: self.posts,
        }
    }
}

/// Read-only snapshot: normalized source URL -> post directory relative to the output root.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct LinkMap {
    entries: BTreeMap<String, String>,
    posts: BTreeSet<String>,
}

impl LinkMap {
    pub fn lookup(&self, url: &str) -> Option<&str> {
        self.entries.get(&normalize_url(url)).map(String::as_str)
    }

    /// Whether pass 1 registered the post stored in `rel_dir`.
    pub fn covers(&self, rel_dir: &str) -> bool {
        self.posts.contains(rel_dir)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn post_count(&self) -> usize {
        self.posts.len()
    }
}

/// Relative href from a document in `from_dir` to the document `document` in `to_dir`.
///
/// Both directories are `/`-separated and relative to the same root.
pub fn relative_href(from_dir: &str, to_dir: &str, document: &str) -> String {
    let from: Vec<&str> = from_dir.split('/').filter(|s| !s.is_empty()).collect();
    let to: Vec<&str> = to_dir.split('/').filter(|s| !s.is_empty()).collect();
    let common = from
        .iter()
        .zip(to.iter())
        .take_while(|(a, b)| a == b)
        .count();

    let mut parts: Vec<&str> = Vec::new();
    parts.extend(std::iter::repeat("..").take(from.len() - common));
    parts.extend(to[common..].iter().copied());
    parts.push(document);
    parts.join("/")
}

/// Outcome of pass 2 over the whole corpus.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct LinkReport {
    pub posts_scanned: usize,
    pub posts_rewritten: usize,
    pub links_rewritten: usize,
    pub links_unresolved: usize,
}

impl LinkReport {
    pub fn absorb(&mut self, other: LinkReport) {
        self.posts_scanned += other.posts_scanned;
        self.posts_rewritten += other.posts_rewritten;
        self.links_rewritten += other.links_rewritten;
        self.links_unresolved += other.links_unresolved;
    }
}
