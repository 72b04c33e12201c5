use url::Url;

/// Where the raw markup of a source item comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    /// An http(s) URL fetched over the network.
    Remote,
    /// A file already on disk (for example an exported article).
    LocalFile,
}

/// One article to archive, as named by the input list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceItem {
    pub identifier: String,
    pub kind: SourceKind,
}

impl SourceItem {
    pub fn new(identifier: impl Into<String>) -> Self {
        let identifier = identifier.into();
        let kind = match Url::parse(&identifier) {
            Ok(url) if matches!(url.scheme(), "http" | "https") => SourceKind::Remote,
            _ => SourceKind::LocalFile,
        };
        Self { identifier, kind }
    }

    pub fn is_remote(&self) -> bool {
        self.kind == SourceKind::Remote
    }

    /// Base URL used to resolve relative references inside the document.
    pub fn base_url(&self) -> Option<&str> {
        self.is_remote().then_some(self.identifier.as_str())
    }
}

/// Parses an input list: one identifier per line, blank lines and `#` comments ignored.
///
/// Exact duplicates are dropped, first occurrence wins.
pub fn parse_source_list(raw: &str) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    raw.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter(|line| seen.insert(line.to_string()))
        .map(ToOwned::to_owned)
        .collect()
}
