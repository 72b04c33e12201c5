use std::collections::HashMap;

/// Local file name for the `index`-th image of a post: `image01.webp`, `image02.webp`, ...
pub fn sequential_filename(index: usize, extension: &str) -> String {
    format!("image{index:02}.{extension}")
}

/// First-occurrence numbering of the image references of one document.
///
/// Indices are 1-based and derived from markup order only, so a resumed run
/// assigns the same numbers as the original one.
#[derive(Debug, Default, Clone)]
pub struct ImageSequence {
    order: Vec<String>,
    index: HashMap<String, usize>,
}

impl ImageSequence {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds the sequence for a list of references in document order.
    pub fn from_refs<'a>(refs: impl IntoIterator<Item = &'a str>) -> Self {
        let mut seq = Self::new();
        for url in refs {
            seq.assign(url);
        }
        seq
    }

    /// Returns the index for `url`, allocating the next one on first sight.
    pub fn assign(&mut self, url: &str) -> usize {
        if let Some(&idx) = self.index.get(url) {
            return idx;
        }
        self.order.push(url.to_string());
        let idx = self.order.len();
        self.index.insert(url.to_string(), idx);
        idx
    }

    pub fn get(&self, url: &str) -> Option<usize> {
        self.index.get(url).copied()
    }

    /// Unique references with their indices, in first-seen order.
    pub fn iter(&self) -> impl Iterator<Item = (usize, &str)> {
        self.order
            .iter()
            .enumerate()
            .map(|(i, url)| (i + 1, url.as_str()))
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}
