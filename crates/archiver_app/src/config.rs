//! RON configuration. Every field is optional; CLI flags are applied on top.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context};
use archiver_engine::{
    EngineConfig, FetchSettings, MaterializerConfig, RuleSet, TargetFormat, TranscodeSettings,
};
use archiver_logging::archive_warn;
use serde::{Deserialize, Serialize};

use crate::cli::Cli;

/// Above this many posts in flight a single host starts refusing requests.
const CONCURRENCY_WARNING: usize = 4;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArchiverConfig {
    pub output_dir: PathBuf,
    /// Put dated posts under a `<year>/` directory.
    pub group_by_year: bool,
    pub concurrency: usize,
    pub document_name: String,
    pub fetch: FetchConfig,
    pub transcode: TranscodeConfig,
    pub rules: RuleSet,
}

impl Default for ArchiverConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("archive"),
            group_by_year: true,
            concurrency: 2,
            document_name: "index.html".to_string(),
            fetch: FetchConfig::default(),
            transcode: TranscodeConfig::default(),
            rules: RuleSet::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    pub base_delay_secs: f64,
    pub backoff_secs: Vec<u64>,
    pub max_retries: usize,
    pub retry_delay_secs: f64,
    pub connect_timeout_secs: u64,
    pub request_timeout_secs: u64,
    pub max_bytes: u64,
    pub user_agent: Option<String>,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            base_delay_secs: 3.0,
            backoff_secs: vec![60, 120],
            max_retries: 3,
            retry_delay_secs: 2.0,
            connect_timeout_secs: 10,
            request_timeout_secs: 30,
            max_bytes: 25 * 1024 * 1024,
            user_agent: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TranscodeConfig {
    pub format: TargetFormat,
    pub quality: u8,
}

impl Default for TranscodeConfig {
    fn default() -> Self {
        Self {
            format: TargetFormat::Webp,
            quality: 85,
        }
    }
}

impl ArchiverConfig {
    /// Reads `path`, or returns the defaults when no file is given.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let text = fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        Self::parse(&text).with_context(|| format!("parsing config {}", path.display()))
    }

    pub fn parse(text: &str) -> anyhow::Result<Self> {
        let config: Self = ron::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn apply_cli(&mut self, cli: &Cli) -> anyhow::Result<()> {
        if let Some(output) = &cli.output {
            self.output_dir = output.clone();
        }
        if let Some(concurrency) = cli.concurrency {
            self.concurrency = concurrency;
        }
        if let Some(delay) = cli.delay {
            self.fetch.base_delay_secs = delay;
        }
        self.validate()
    }

    fn validate(&self) -> anyhow::Result<()> {
        if self.concurrency == 0 {
            bail!("concurrency must be at least 1");
        }
        if self.concurrency > CONCURRENCY_WARNING {
            archive_warn!(
                "concurrency {} is high for a single host; expect rate limiting",
                self.concurrency
            );
        }
        if !(1..=100).contains(&self.transcode.quality) {
            bail!("transcode quality must be between 1 and 100");
        }
        if self.document_name.is_empty() || self.document_name.contains(['/', '\\']) {
            bail!("document_name must be a plain file name");
        }
        seconds("base_delay_secs", self.fetch.base_delay_secs)?;
        seconds("retry_delay_secs", self.fetch.retry_delay_secs)?;
        Ok(())
    }

    pub fn fetch_settings(&self) -> anyhow::Result<FetchSettings> {
        let fetch = &self.fetch;
        Ok(FetchSettings {
            connect_timeout: Duration::from_secs(fetch.connect_timeout_secs),
            request_timeout: Duration::from_secs(fetch.request_timeout_secs),
            max_bytes: fetch.max_bytes,
            user_agent: fetch.user_agent.clone(),
            base_delay: seconds("base_delay_secs", fetch.base_delay_secs)?,
            backoff: fetch.backoff_secs.iter().map(|s| Duration::from_secs(*s)).collect(),
            max_retries: fetch.max_retries,
            retry_delay: seconds("retry_delay_secs", fetch.retry_delay_secs)?,
            ..FetchSettings::default()
        })
    }

    pub fn engine_config(&self) -> EngineConfig {
        let mut materializer = MaterializerConfig::new(self.output_dir.clone());
        materializer.document_name = self.document_name.clone();
        materializer.transcode = TranscodeSettings {
            format: self.transcode.format,
            quality: self.transcode.quality,
        };
        EngineConfig {
            materializer,
            group_by_year: self.group_by_year,
            concurrency: self.concurrency,
        }
    }
}

fn seconds(field: &str, value: f64) -> anyhow::Result<Duration> {
    Duration::try_from_secs_f64(value)
        .with_context(|| format!("{field} must be a non-negative number of seconds"))
}
