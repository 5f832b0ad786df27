use config::{Config as ConfigBuilder, ConfigError, File};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use crate::errors::{ScanError, ScanResult};

/// Configuration for a keyword scan.
///
/// # Configuration Locations
///
/// Configuration is layered from these locations, later entries overriding earlier ones:
/// 1. Global `$HOME/.config/keyscout/config.yaml`
/// 2. Local `.keyscout.yaml` in the current directory
/// 3. Custom config file specified via `--config`
///
/// # Configuration Format
///
/// ```yaml
/// # Directory holding the corpus
/// root_path: "corpus"
///
/// # Glob matched against file names
/// file_pattern: "*.txt"
///
/// # Keywords, matched case-insensitively as whole words
/// keywords: ["python", "algorithm", "data"]
///
/// # Requested workers (default: CPU cores)
/// worker_count: 4
///
/// # threads | processes
/// model: processes
///
/// # Bounds for the process model
/// collect_timeout: "30s"
/// join_timeout: "10s"
///
/// # ignore | lossy | failfast
/// encoding_mode: ignore
///
/// log_level: "info"
/// ```
///
/// CLI arguments take precedence over file values, see [`ScanConfig::merge_with_cli`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanConfig {
    /// Directory whose files are scanned
    #[serde(default = "default_root_path")]
    pub root_path: PathBuf,

    /// Glob matched against file names (e.g. "*.txt")
    #[serde(default = "default_file_pattern")]
    pub file_pattern: String,

    /// Keywords to look for
    #[serde(default)]
    pub keywords: Vec<String>,

    /// Number of workers to partition the corpus across.
    /// Zero is rejected by [`ScanConfig::validate`].
    #[serde(default = "default_worker_count")]
    pub worker_count: usize,

    /// Concurrency model used to run the workers
    #[serde(default)]
    pub model: ConcurrencyModel,

    /// Descend into subdirectories of `root_path`
    #[serde(default)]
    pub recursive: bool,

    /// How invalid UTF-8 in a file is handled
    #[serde(default)]
    pub encoding_mode: EncodingMode,

    /// Longest wait for any single worker message (process model only)
    #[serde(default = "default_collect_timeout", with = "duration_str")]
    pub collect_timeout: Duration,

    /// Shared deadline for worker processes to exit once collection is over
    #[serde(default = "default_join_timeout", with = "duration_str")]
    pub join_timeout: Duration,

    /// Emit a progress event every this many files per worker (0 disables)
    #[serde(default = "default_progress_interval")]
    pub progress_interval: usize,

    /// Program launched for each isolated worker. Required by the processes model.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub worker_command: Option<WorkerCommand>,

    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

/// How workers are run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConcurrencyModel {
    /// Threads in one address space, merging through a single lock
    #[default]
    Threads,
    /// Separate processes reporting over a one-way channel
    Processes,
}

impl FromStr for ConcurrencyModel {
    type Err = ScanError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "threads" | "thread" | "threading" => Ok(Self::Threads),
            "processes" | "process" | "multiprocessing" => Ok(Self::Processes),
            other => Err(ScanError::invalid_configuration(format!(
                "unknown concurrency model '{}' (expected threads or processes)",
                other
            ))),
        }
    }
}

/// Controls how invalid UTF-8 sequences are handled when decoding files
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EncodingMode {
    /// Drop invalid byte sequences
    #[default]
    Ignore,
    /// Replace invalid sequences with U+FFFD
    Lossy,
    /// Count the file as unreadable
    FailFast,
}

impl FromStr for EncodingMode {
    type Err = ScanError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "ignore" => Ok(Self::Ignore),
            "lossy" | "replace" => Ok(Self::Lossy),
            "failfast" | "strict" => Ok(Self::FailFast),
            other => Err(ScanError::invalid_configuration(format!(
                "unknown encoding mode '{}' (expected ignore, lossy or failfast)",
                other
            ))),
        }
    }
}

/// External program used as an isolated-memory worker
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerCommand {
    pub program: PathBuf,
    #[serde(default)]
    pub args: Vec<String>,
}

impl WorkerCommand {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// The running executable invoked as `<exe> worker`.
    /// Only meaningful for binaries that serve jobs under a `worker` argument.
    pub fn current_exe() -> ScanResult<Self> {
        Ok(Self::new(std::env::current_exe()?).arg("worker"))
    }
}

/// Values supplied on the command line; `None` leaves the file value alone
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub root_path: Option<PathBuf>,
    pub file_pattern: Option<String>,
    pub keywords: Vec<String>,
    pub worker_count: Option<usize>,
    pub model: Option<ConcurrencyModel>,
    pub recursive: bool,
    pub encoding_mode: Option<EncodingMode>,
    pub collect_timeout: Option<Duration>,
    pub join_timeout: Option<Duration>,
    pub log_level: Option<String>,
}

fn default_root_path() -> PathBuf {
    PathBuf::from(".")
}

fn default_file_pattern() -> String {
    "*.txt".to_string()
}

fn default_worker_count() -> usize {
    num_cpus::get()
}

fn default_collect_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_join_timeout() -> Duration {
    Duration::from_secs(10)
}

pub(crate) fn default_progress_interval() -> usize {
    5
}

fn default_log_level() -> String {
    "warn".to_string()
}

impl ScanConfig {
    /// Creates a configuration with default settings for the given corpus and keywords
    pub fn new(root_path: impl Into<PathBuf>, keywords: Vec<String>) -> Self {
        Self {
            root_path: root_path.into(),
            file_pattern: default_file_pattern(),
            keywords,
            worker_count: default_worker_count(),
            model: ConcurrencyModel::default(),
            recursive: false,
            encoding_mode: EncodingMode::default(),
            collect_timeout: default_collect_timeout(),
            join_timeout: default_join_timeout(),
            progress_interval: default_progress_interval(),
            worker_command: None,
            log_level: default_log_level(),
        }
    }

    /// Loads configuration from the default locations
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(None)
    }

    /// Loads configuration from the default locations plus a specific file
    pub fn load_from(config_path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder = ConfigBuilder::builder();

        let config_files = [
            dirs::config_dir().map(|p| p.join("keyscout/config.yaml")),
            Some(PathBuf::from(".keyscout.yaml")),
            config_path.map(PathBuf::from),
        ];

        for path in config_files.iter().flatten() {
            if path.exists() {
                builder = builder.add_source(File::from(path.as_path()));
            } else if Some(path.as_path()) == config_path {
                return Err(ConfigError::NotFound(path.display().to_string()));
            }
        }

        builder.build()?.try_deserialize()
    }

    /// Merges command-line values over configuration file values
    pub fn merge_with_cli(mut self, cli: ConfigOverrides) -> Self {
        if let Some(root_path) = cli.root_path {
            self.root_path = root_path;
        }
        if let Some(file_pattern) = cli.file_pattern {
            self.file_pattern = file_pattern;
        }
        if !cli.keywords.is_empty() {
            self.keywords = cli.keywords;
        }
        if let Some(worker_count) = cli.worker_count {
            self.worker_count = worker_count;
        }
        if let Some(model) = cli.model {
            self.model = model;
        }
        if cli.recursive {
            self.recursive = true;
        }
        if let Some(encoding_mode) = cli.encoding_mode {
            self.encoding_mode = encoding_mode;
        }
        if let Some(timeout) = cli.collect_timeout {
            self.collect_timeout = timeout;
        }
        if let Some(timeout) = cli.join_timeout {
            self.join_timeout = timeout;
        }
        if let Some(log_level) = cli.log_level {
            self.log_level = log_level;
        }
        self
    }

    /// Checks every setting that would make the scan meaningless.
    /// Runs before any directory access or worker creation.
    pub fn validate(&self) -> ScanResult<()> {
        if self.worker_count == 0 {
            return Err(ScanError::invalid_configuration(
                "worker count must be at least 1",
            ));
        }
        if let Some(blank) = self.keywords.iter().position(|k| k.trim().is_empty()) {
            return Err(ScanError::invalid_configuration(format!(
                "keyword #{} is blank",
                blank + 1
            )));
        }
        glob::Pattern::new(&self.file_pattern).map_err(|e| {
            ScanError::invalid_configuration(format!(
                "invalid file pattern '{}': {}",
                self.file_pattern, e
            ))
        })?;
        if self.collect_timeout.is_zero() || self.join_timeout.is_zero() {
            return Err(ScanError::invalid_configuration(
                "collection and join timeouts must be non-zero",
            ));
        }
        if self.model == ConcurrencyModel::Processes && self.worker_command.is_none() {
            return Err(ScanError::invalid_configuration(
                "processes model requires worker_command",
            ));
        }
        Ok(())
    }
}

/// Serializes durations as humantime strings such as "30s" or "1m 30s"
mod duration_str {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&humantime::format_duration(*value).to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let raw = String::deserialize(deserializer)?;
        humantime::parse_duration(&raw).map_err(serde::de::Error::custom)
    }
}
