#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::io::Cursor;
use std::path::Path;
use std::sync::{Arc, Mutex};

use archiver_engine::{FailureKind, FetchError, FetchOutput, Fetcher, RuleSet};
use image::{DynamicImage, ImageFormat, Rgba, RgbaImage};

/// In-memory web: known URLs answer, everything else is a 404.
#[derive(Clone, Default)]
pub struct FakeWeb {
    pages: Arc<Mutex<HashMap<String, (Vec<u8>, Option<String>)>>>,
    calls: Arc<Mutex<Vec<String>>>,
}

impl FakeWeb {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn page(&self, url: &str, html: &str) {
        self.pages.lock().unwrap().insert(
            url.to_string(),
            (html.as_bytes().to_vec(), Some("text/html; charset=utf-8".into())),
        );
    }

    pub fn image(&self, url: &str, rgba: [u8; 4]) {
        self.pages
            .lock()
            .unwrap()
            .insert(url.to_string(), (png(rgba), Some("image/png".into())));
    }

    pub fn raw(&self, url: &str, bytes: &[u8]) {
        self.pages
            .lock()
            .unwrap()
            .insert(url.to_string(), (bytes.to_vec(), None));
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn reset_calls(&self) {
        self.calls.lock().unwrap().clear();
    }
}

#[async_trait::async_trait]
impl Fetcher for FakeWeb {
    async fn fetch(&self, url: &str) -> Result<FetchOutput, FetchError> {
        self.calls.lock().unwrap().push(url.to_string());
        match self.pages.lock().unwrap().get(url) {
            Some((bytes, content_type)) => Ok(FetchOutput {
                bytes: bytes.clone(),
                content_type: content_type.clone(),
                final_url: url.to_string(),
            }),
            None => Err(FetchError::new(FailureKind::NotFound, "404 Not Found")),
        }
    }
}

pub fn png(rgba: [u8; 4]) -> Vec<u8> {
    let mut out = Vec::new();
    DynamicImage::ImageRgba8(RgbaImage::from_pixel(4, 4, Rgba(rgba)))
        .write_to(&mut Cursor::new(&mut out), ImageFormat::Png)
        .unwrap();
    out
}

pub fn medium_rules() -> RuleSet {
    RuleSet {
        remove_attributes: vec!["data-*".into()],
        remove_elements: vec!["script".into(), "iframe".into()],
        internal_link_patterns: vec!["https://medium.com/@julsimon/".into()],
        ..RuleSet::default()
    }
}

pub fn fixed_clock() -> archiver_engine::Clock {
    Arc::new(|| "2024-05-01T12:00:00+00:00".to_string())
}

/// Every file under `root`, keyed by its relative path.
pub fn snapshot(root: &Path) -> BTreeMap<String, Vec<u8>> {
    let mut files = BTreeMap::new();
    collect(root, root, &mut files);
    files
}

fn collect(root: &Path, dir: &Path, files: &mut BTreeMap<String, Vec<u8>>) {
    for entry in fs::read_dir(dir).unwrap() {
        let path = entry.unwrap().path();
        if path.is_dir() {
            collect(root, &path, files);
        } else {
            let rel = path.strip_prefix(root).unwrap().to_string_lossy().replace('\\', "/");
            files.insert(rel, fs::read(&path).unwrap());
        }
    }
}
