//! Archiver engine: every piece of IO in the pipeline, and the driver that
//! runs the core state machine against it.
mod decode;
mod engine;
mod extract;
mod fetch;
mod markup;
mod materialize;
mod persist;
mod post;
mod resolve;
mod sanitize;
mod throttle;
mod transcode;
mod types;

pub use decode::{decode_html, DecodeError, DecodedHtml};
pub use engine::{ArchiveEngine, EngineConfig};
pub use extract::{ContentExtractor, ExtractedPage, PageMetadata};
pub use fetch::{FetchSettings, Fetcher, ReqwestTransport, ThrottledFetcher, Transport};
pub use markup::{Document, ElementData, MarkupNode};
pub use materialize::{
    Clock, Materialized, MaterializeError, Materializer, MaterializerConfig, NullProgressSink,
    ProgressSink,
};
pub use persist::{ensure_dir, AtomicFileWriter, PersistError};
pub use post::{
    is_complete, load_metadata, referenced_local_images, scan_corpus, ImageRecord, PostMetadata,
    PostReadError, StoredPost, METADATA_FILE,
};
pub use resolve::{build_link_map, resolve_corpus, rewrite_corpus, rewrite_post, ResolveError};
pub use sanitize::{ImageRef, RuleError, RuleSet, Sanitized, Sanitizer};
pub use throttle::{BackoffSchedule, RateLimiter};
pub use transcode::{transcode, TargetFormat, TranscodeError, TranscodeSettings, TranscodedImage};
pub use types::{FailureKind, FetchError, FetchOutput};
