use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use archiver_core::{ImageSequence, ItemId, PostLocation, PostStatus, SourceItem, Stage};
use archiver_logging::{archive_debug, archive_info, archive_warn};
use tokio_util::sync::CancellationToken;

use crate::decode::{decode_html, DecodeError};
use crate::extract::ContentExtractor;
use crate::fetch::Fetcher;
use crate::persist::{AtomicFileWriter, PersistError};
use crate::post::{
    is_complete, is_local_image_name, load_metadata, ImageRecord, PostMetadata, METADATA_FILE,
};
use crate::sanitize::Sanitizer;
use crate::transcode::{transcode, TranscodeSettings, TranscodedImage};
use crate::FetchError;

/// Receives per-post status changes while a post is being materialized.
pub trait ProgressSink: Send + Sync {
    fn progress(&self, id: ItemId, status: PostStatus);
}

/// Sink that drops everything.
pub struct NullProgressSink;

impl ProgressSink for NullProgressSink {
    fn progress(&self, _id: ItemId, _status: PostStatus) {}
}

pub type Clock = Arc<dyn Fn() -> String + Send + Sync>;

#[derive(Clone)]
pub struct MaterializerConfig {
    pub output_root: PathBuf,
    pub document_name: String,
    pub transcode: TranscodeSettings,
    /// Timestamp recorded as `archived_at`.
    pub clock: Clock,
}

impl MaterializerConfig {
    pub fn new(output_root: impl Into<PathBuf>) -> Self {
        Self {
            output_root: output_root.into(),
            document_name: "index.html".to_string(),
            transcode: TranscodeSettings::default(),
            clock: Arc::new(|| chrono::Utc::now().to_rfc3339()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Materialized {
    /// The post was already complete on disk; nothing was fetched or written.
    pub resumed: bool,
    pub images_written: usize,
    pub images_skipped: usize,
}

#[derive(Debug, thiserror::Error)]
pub enum MaterializeError {
    #[error("fetching source: {0}")]
    Load(#[from] FetchError),
    #[error("reading {path}: {source}")]
    ReadLocal {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("decoding source: {0}")]
    Decode(#[from] DecodeError),
    #[error("serializing metadata: {0}")]
    Metadata(#[from] serde_json::Error),
    #[error(transparent)]
    Persist(#[from] PersistError),
    #[error("{rel_dir} already holds {owner}")]
    Occupied { rel_dir: String, owner: String },
    #[error("interrupted")]
    Interrupted,
}

impl MaterializeError {
    pub fn stage(&self) -> Stage {
        match self {
            MaterializeError::Load(_) | MaterializeError::ReadLocal { .. } => Stage::Load,
            MaterializeError::Decode(_) => Stage::Decode,
            MaterializeError::Metadata(_)
            | MaterializeError::Persist(_)
            | MaterializeError::Occupied { .. } => Stage::Persist,
            MaterializeError::Interrupted => Stage::Images,
        }
    }
}

/// Turns one source item into a post directory.
pub struct Materializer {
    fetcher: Arc<dyn Fetcher>,
    sanitizer: Arc<Sanitizer>,
    extractor: Arc<ContentExtractor>,
    config: MaterializerConfig,
}

impl Materializer {
    pub fn new(
        fetcher: Arc<dyn Fetcher>,
        sanitizer: Arc<Sanitizer>,
        extractor: Arc<ContentExtractor>,
        config: MaterializerConfig,
    ) -> Self {
        Self {
            fetcher,
            sanitizer,
            extractor,
            config,
        }
    }

    pub fn config(&self) -> &MaterializerConfig {
        &self.config
    }

    pub fn post_dir(&self, location: &PostLocation) -> PathBuf {
        location
            .rel_dir
            .split('/')
            .fold(self.config.output_root.clone(), |dir, part| dir.join(part))
    }

    pub async fn materialize(
        &self,
        id: ItemId,
        item: &SourceItem,
        location: &PostLocation,
        sink: &dyn ProgressSink,
        cancel: &CancellationToken,
    ) -> Result<Materialized, MaterializeError> {
        if cancel.is_cancelled() {
            return Err(MaterializeError::Interrupted);
        }

        let dir = self.post_dir(location);
        if is_complete(&dir, &self.config.document_name) {
            match load_metadata(&dir) {
                Ok(stored) if stored.source == item.identifier => {
                    archive_info!("{} already archived in {}", item.identifier, location.rel_dir);
                    return Ok(Materialized {
                        resumed: true,
                        images_written: 0,
                        images_skipped: 0,
                    });
                }
                Ok(stored) => {
                    return Err(MaterializeError::Occupied {
                        rel_dir: location.rel_dir.clone(),
                        owner: stored.source,
                    });
                }
                Err(err) => archive_debug!("re-materializing {}: {err}", location.rel_dir),
            }
        }

        let (bytes, content_type) = self.load(item, cancel).await?;
        sink.progress(id, PostStatus::Fetched);

        let decoded = decode_html(&bytes, content_type.as_deref())?;
        if decoded.lossy {
            archive_debug!("{} decoded lossily as {}", item.identifier, decoded.encoding);
        }
        let page = self.extractor.extract(&decoded.html, item);
        let mut sanitized = self.sanitizer.sanitize(&page.html, item.base_url());
        sink.progress(id, PostStatus::Sanitized);

        let sequence = ImageSequence::from_refs(sanitized.images.iter().map(|r| r.url.as_str()));
        let mut written: HashMap<usize, TranscodedImage> = HashMap::new();
        let mut skipped = 0usize;
        for (index, url) in sequence.iter() {
            if cancel.is_cancelled() {
                return Err(MaterializeError::Interrupted);
            }
            match self.fetch_image(url, index, cancel).await {
                Some(image) => {
                    written.insert(index, image);
                }
                None if cancel.is_cancelled() => return Err(MaterializeError::Interrupted),
                None => skipped += 1,
            }
        }

        for image_ref in &sanitized.images {
            let Some(local) = sequence.get(&image_ref.url).and_then(|i| written.get(&i)) else {
                continue;
            };
            sanitized.document.edit_element(image_ref.node, |el| {
                el.set_attr("src", local.filename.as_str());
                el.remove_attr("srcset");
            });
            if let Some(anchor) = sanitized.document.ancestor_named(image_ref.node, "a") {
                sanitized.document.edit_element(anchor, |el| {
                    let wraps_image = el
                        .attr("href")
                        .is_some_and(|href| href == image_ref.raw || href == image_ref.url);
                    if wraps_image {
                        el.set_attr("href", local.filename.as_str());
                    }
                });
            }
        }

        let mut images: Vec<ImageRecord> = sequence
            .iter()
            .filter_map(|(index, url)| {
                written.get(&index).map(|image| ImageRecord {
                    origin_url: url.to_string(),
                    index,
                    filename: image.filename.clone(),
                })
            })
            .collect();
        images.sort_by_key(|record| record.index);

        let metadata = PostMetadata {
            source: item.identifier.clone(),
            canonical_url: page.metadata.canonical_url,
            title: page.metadata.title,
            published: page.metadata.published.or(location.published),
            archived_at: (self.config.clock)(),
            images,
            internal_links: sanitized.internal_links,
        };

        if cancel.is_cancelled() {
            return Err(MaterializeError::Interrupted);
        }
        self.persist(&dir, &written, &metadata, &sanitized.document.to_html())?;

        archive_info!(
            "archived {} into {} ({} images, {} skipped)",
            item.identifier,
            location.rel_dir,
            written.len(),
            skipped
        );
        Ok(Materialized {
            resumed: false,
            images_written: written.len(),
            images_skipped: skipped,
        })
    }

    async fn load(
        &self,
        item: &SourceItem,
        cancel: &CancellationToken,
    ) -> Result<(Vec<u8>, Option<String>), MaterializeError> {
        if item.is_remote() {
            let output = tokio::select! {
                _ = cancel.cancelled() => return Err(MaterializeError::Interrupted),
                result = self.fetcher.fetch(&item.identifier) => result?,
            };
            return Ok((output.bytes, output.content_type));
        }

        let path = local_path(&item.identifier);
        let bytes = tokio::fs::read(&path)
            .await
            .map_err(|source| MaterializeError::ReadLocal { path, source })?;
        Ok((bytes, None))
    }

    /// Fetches and transcodes one image. Failures are logged and yield `None`.
    async fn fetch_image(
        &self,
        url: &str,
        index: usize,
        cancel: &CancellationToken,
    ) -> Option<TranscodedImage> {
        let fetched = tokio::select! {
            _ = cancel.cancelled() => return None,
            result = self.fetcher.fetch(url) => result,
        };
        let bytes = match fetched {
            Ok(output) => output.bytes,
            Err(err) => {
                archive_warn!("skipping image {url}: {err}");
                return None;
            }
        };

        let settings = self.config.transcode;
        let encoded = tokio::task::spawn_blocking(move || transcode(&bytes, &settings, index)).await;
        match encoded {
            Ok(Ok(image)) => Some(image),
            Ok(Err(err)) => {
                archive_warn!("skipping image {url}: {err}");
                None
            }
            Err(err) => {
                archive_warn!("skipping image {url}: transcoder task failed: {err}");
                None
            }
        }
    }

    /// Images first, then metadata, then the document. Until the document
    /// lands the directory fails the completeness check.
    fn persist(
        &self,
        dir: &Path,
        images: &HashMap<usize, TranscodedImage>,
        metadata: &PostMetadata,
        html: &str,
    ) -> Result<(), MaterializeError> {
        let writer = AtomicFileWriter::new(dir);
        writer.remove(&self.config.document_name)?;

        let mut ordered: Vec<_> = images.values().collect();
        ordered.sort_by(|a, b| a.filename.cmp(&b.filename));
        for image in &ordered {
            writer.write_bytes(&image.filename, &image.bytes)?;
        }
        let keep: HashSet<&str> = ordered.iter().map(|image| image.filename.as_str()).collect();
        for stale in stale_images(dir, &keep) {
            archive_debug!("removing stale {} from {}", stale, dir.display());
            writer.remove(&stale)?;
        }
        writer.write(METADATA_FILE, &serde_json::to_string_pretty(metadata)?)?;
        writer.write(&self.config.document_name, html)?;
        Ok(())
    }
}

/// `imageNN.ext` files left in `dir` by an earlier materialization.
fn stale_images(dir: &Path, keep: &HashSet<&str>) -> Vec<String> {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return Vec::new();
    };
    let mut stale: Vec<String> = entries
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_ok_and(|t| t.is_file()))
        .filter_map(|entry| entry.file_name().into_string().ok())
        .filter(|name| is_local_image_name(name) && !keep.contains(name.as_str()))
        .collect();
    stale.sort();
    stale
}

fn local_path(identifier: &str) -> PathBuf {
    match url::Url::parse(identifier) {
        Ok(url) if url.scheme() == "file" => url
            .to_file_path()
            .unwrap_or_else(|_| PathBuf::from(identifier)),
        _ => PathBuf::from(identifier),
    }
}
