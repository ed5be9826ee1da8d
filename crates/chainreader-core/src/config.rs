//! Reader configuration, loadable from JSON with every field defaulted.
//!
//! ```json
//! {
//!   "mode": "node",
//!   "node": { "path": "gaiad", "args": ["start", "--home", "/data"] },
//!   "index": { "dir": "./index", "bundle_size": 10000 }
//! }
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::parser::DEFAULT_PREFIX;

/// Default line reader buffer: 10 MiB, large enough for big BLOCK payloads.
pub const DEFAULT_LINE_BUFFER_SIZE: usize = 10 * 1024 * 1024;
pub const DEFAULT_LOGS_PATTERN: &str = r"\.log(\.\d+)?$";
pub const DEFAULT_BUNDLE_SIZE: u64 = 10_000;
pub const DEFAULT_LOOKUP_SIZES: [u64; 4] = [1_000_000, 100_000, 10_000, 1_000];

// ─── ReaderMode ───────────────────────────────────────────────────────────────

/// Where marker lines come from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReaderMode {
    /// Lines piped into the process's standard input.
    #[default]
    Stdin,
    /// Standard output of a supervised node subprocess.
    Node,
    /// Rotating log files in a directory.
    Logs,
}

impl FromStr for ReaderMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "stdin" => Ok(Self::Stdin),
            "node" => Ok(Self::Node),
            "logs" => Ok(Self::Logs),
            other => Err(ConfigError::Invalid(format!("invalid mode: {other}"))),
        }
    }
}

impl std::fmt::Display for ReaderMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Stdin => write!(f, "stdin"),
            Self::Node => write!(f, "node"),
            Self::Logs => write!(f, "logs"),
        }
    }
}

// ─── NodeConfig ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    /// Binary path, or a bare name resolved through `PATH`.
    pub path: Option<String>,
    pub args: Vec<String>,
    /// Working directory of the subprocess.
    pub dir: Option<PathBuf>,
    /// Extra variables added on top of the inherited environment.
    pub env: BTreeMap<String, String>,
    /// Forward the node's stderr (filtered) to our own stderr.
    pub forward_stderr: bool,
    /// Regex; matching stderr lines are dropped before forwarding.
    pub logs_filter: Option<String>,
    pub forced_kill_timeout_ms: u64,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            path: None,
            args: vec![],
            dir: None,
            env: BTreeMap::new(),
            forward_stderr: true,
            logs_filter: None,
            forced_kill_timeout_ms: 10_000,
        }
    }
}

impl NodeConfig {
    pub fn forced_kill_timeout(&self) -> Duration {
        Duration::from_millis(self.forced_kill_timeout_ms)
    }
}

// ─── LogsConfig ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogsConfig {
    pub dir: Option<PathBuf>,
    /// Regex matched against file names (not full paths).
    pub pattern: String,
    /// Size poll interval while waiting for a file to grow.
    pub poll_interval_ms: u64,
    /// Give up on a file that has not grown for this long.
    pub max_wait_ms: u64,
    /// Delay between directory scans once the queue is drained.
    pub rescan_interval_ms: u64,
    pub queue_capacity: usize,
}

impl Default for LogsConfig {
    fn default() -> Self {
        Self {
            dir: None,
            pattern: DEFAULT_LOGS_PATTERN.to_string(),
            poll_interval_ms: 100,
            max_wait_ms: 10_000,
            rescan_interval_ms: 10_000,
            queue_capacity: 100,
        }
    }
}

impl LogsConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn max_wait(&self) -> Duration {
        Duration::from_millis(self.max_wait_ms)
    }

    pub fn rescan_interval(&self) -> Duration {
        Duration::from_millis(self.rescan_interval_ms)
    }
}

// ─── IndexConfig ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    /// One file per bundle under `dir`.
    #[default]
    Fs,
    /// A single SQLite database file at `dir/index.db`.
    Sqlite,
}

impl FromStr for StoreBackend {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "fs" => Ok(Self::Fs),
            "sqlite" => Ok(Self::Sqlite),
            other => Err(ConfigError::Invalid(format!("invalid index backend: {other}"))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexConfig {
    pub dir: PathBuf,
    pub backend: StoreBackend,
    pub bundle_size: u64,
    /// Candidate bundle sizes probed, largest first, when resuming.
    pub lookup_sizes: Vec<u64>,
    /// Index short names to build (`eventtype`, `eventorigin`, `messagetype`, `combined`).
    pub kinds: Vec<String>,
    /// Blocks below this number are not indexed.
    pub start_block: Option<u64>,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("./index"),
            backend: StoreBackend::Fs,
            bundle_size: DEFAULT_BUNDLE_SIZE,
            lookup_sizes: DEFAULT_LOOKUP_SIZES.to_vec(),
            kinds: vec!["combined".into()],
            start_block: None,
        }
    }
}

// ─── LogConfig ────────────────────────────────────────────────────────────────

/// Log level per component.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Global default level: "trace" | "debug" | "info" | "warn" | "error"
    pub level: String,
    /// Override per component: crate name → level
    pub components: BTreeMap<String, String>,
    /// Emit JSON structured logs instead of human-readable text
    pub json: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            components: BTreeMap::new(),
            json: false,
        }
    }
}

impl LogConfig {
    /// `EnvFilter` directive string, e.g. `info,chainreader_source=debug`.
    pub fn directives(&self) -> String {
        let mut directives = self.level.clone();
        for (component, level) in &self.components {
            directives.push_str(&format!(",{}={}", component.replace('-', "_"), level));
        }
        directives
    }
}

// ─── ReaderConfig ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReaderConfig {
    pub mode: ReaderMode,
    pub line_prefix: String,
    /// Read buffer capacity of the line sources, in bytes. Longer lines
    /// are still read whole.
    pub line_buffer_size: usize,
    /// Capacity of the line queue between source and parser.
    pub channel_capacity: usize,
    pub first_streamable_block: u64,
    pub node: NodeConfig,
    pub logs: LogsConfig,
    pub index: Option<IndexConfig>,
    pub log: LogConfig,
}

impl Default for ReaderConfig {
    fn default() -> Self {
        Self {
            mode: ReaderMode::Stdin,
            line_prefix: DEFAULT_PREFIX.to_string(),
            line_buffer_size: DEFAULT_LINE_BUFFER_SIZE,
            channel_capacity: 1024,
            first_streamable_block: 1,
            node: NodeConfig::default(),
            logs: LogsConfig::default(),
            index: None,
            log: LogConfig::default(),
        }
    }
}

impl ReaderConfig {
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(json).map_err(|e| ConfigError::Invalid(format!("config: {e}")))
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Invalid(format!("reading {}: {e}", path.display())))?;
        Self::from_json(&raw)
    }

    /// Mode-specific checks run before any source is started.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.line_prefix.is_empty() {
            return Err(ConfigError::Invalid("line prefix must not be empty".into()));
        }
        if self.line_buffer_size == 0 || self.channel_capacity == 0 {
            return Err(ConfigError::Invalid(
                "line buffer size and channel capacity must be positive".into(),
            ));
        }

        match self.mode {
            ReaderMode::Stdin => {}
            ReaderMode::Node => {
                let path = self.node.path.as_deref().ok_or(ConfigError::MissingBinary)?;
                resolve_binary(path)?;
                if let Some(dir) = &self.node.dir {
                    check_directory(dir)?;
                }
            }
            ReaderMode::Logs => {
                let dir = self
                    .logs
                    .dir
                    .as_deref()
                    .ok_or_else(|| ConfigError::Invalid("reader logs dir must be set".into()))?;
                check_directory(dir)?;
            }
        }

        if let Some(index) = &self.index {
            if index.bundle_size == 0 || index.lookup_sizes.iter().any(|s| *s == 0) {
                return Err(ConfigError::InvalidBundleSize);
            }
        }
        Ok(())
    }
}

/// Parse `K=V,K2=V2` into a map. An empty string yields an empty map.
pub fn parse_env_list(raw: &str) -> Result<BTreeMap<String, String>, ConfigError> {
    let mut env = BTreeMap::new();
    if raw.trim().is_empty() {
        return Ok(env);
    }
    for entry in raw.split(',') {
        match entry.split_once('=') {
            Some((key, value)) if !key.trim().is_empty() => {
                env.insert(key.trim().to_string(), value.to_string());
            }
            _ => {
                return Err(ConfigError::InvalidEnv {
                    entry: entry.to_string(),
                })
            }
        }
    }
    Ok(env)
}

/// Split a node argument string on whitespace.
pub fn parse_args(raw: &str) -> Vec<String> {
    raw.split_whitespace().map(str::to_string).collect()
}

/// Resolve a node binary to an executable file.
///
/// Names without a path separator are looked up in `PATH`.
pub fn resolve_binary(path: &str) -> Result<PathBuf, ConfigError> {
    if path.is_empty() {
        return Err(ConfigError::MissingBinary);
    }

    let candidate = if path.contains(std::path::MAIN_SEPARATOR) {
        PathBuf::from(path)
    } else {
        std::env::var_os("PATH")
            .and_then(|paths| {
                std::env::split_paths(&paths)
                    .map(|dir| dir.join(path))
                    .find(|p| p.is_file() && is_executable(p))
            })
            .ok_or_else(|| ConfigError::BinaryNotFound { name: path.into() })?
    };

    let meta = std::fs::metadata(&candidate).map_err(|_| ConfigError::BinaryNotFound {
        name: path.into(),
    })?;
    if meta.is_dir() {
        return Err(ConfigError::BinaryIsDirectory { path: path.into() });
    }
    if !is_executable(&candidate) {
        return Err(ConfigError::NotExecutable { path: path.into() });
    }
    Ok(candidate)
}

/// Fails unless `dir` exists and is a directory.
pub fn check_directory(dir: &Path) -> Result<(), ConfigError> {
    match std::fs::metadata(dir) {
        Ok(meta) if meta.is_dir() => Ok(()),
        Ok(_) => Err(ConfigError::NotADirectory {
            path: dir.display().to_string(),
        }),
        Err(_) => Err(ConfigError::DirectoryMissing {
            path: dir.display().to_string(),
        }),
    }
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    std::fs::metadata(path)
        .map(|m| m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_from_empty_json() {
        let cfg = ReaderConfig::from_json("{}").unwrap();
        assert_eq!(cfg.mode, ReaderMode::Stdin);
        assert_eq!(cfg.line_prefix, "DMLOG ");
        assert_eq!(cfg.line_buffer_size, DEFAULT_LINE_BUFFER_SIZE);
        assert_eq!(cfg.node.forced_kill_timeout(), Duration::from_secs(10));
        assert_eq!(cfg.logs.max_wait(), Duration::from_secs(10));
        assert!(cfg.index.is_none());
        cfg.validate().unwrap();
    }

    #[test]
    fn partial_json_keeps_other_defaults() {
        let cfg = ReaderConfig::from_json(
            r#"{"mode":"logs","logs":{"dir":"/tmp"},"index":{"bundle_size":1000}}"#,
        )
        .unwrap();
        assert_eq!(cfg.mode, ReaderMode::Logs);
        assert_eq!(cfg.logs.pattern, DEFAULT_LOGS_PATTERN);
        let index = cfg.index.unwrap();
        assert_eq!(index.bundle_size, 1000);
        assert_eq!(index.lookup_sizes, DEFAULT_LOOKUP_SIZES.to_vec());
    }

    #[test]
    fn mode_parsing() {
        assert_eq!("node".parse::<ReaderMode>().unwrap(), ReaderMode::Node);
        assert!("grpc".parse::<ReaderMode>().is_err());
        assert_eq!(ReaderMode::Logs.to_string(), "logs");
        assert_eq!("sqlite".parse::<StoreBackend>().unwrap(), StoreBackend::Sqlite);
        assert!("s3".parse::<StoreBackend>().is_err());
    }

    #[test]
    fn env_list() {
        let env = parse_env_list("A=1,B=x=y").unwrap();
        assert_eq!(env.get("A").map(String::as_str), Some("1"));
        assert_eq!(env.get("B").map(String::as_str), Some("x=y"));
        assert!(parse_env_list("").unwrap().is_empty());
        assert!(matches!(
            parse_env_list("A=1,broken"),
            Err(ConfigError::InvalidEnv { .. })
        ));
    }

    #[test]
    fn args_split_on_whitespace() {
        assert_eq!(parse_args(" start  --home /data "), ["start", "--home", "/data"]);
        assert!(parse_args("").is_empty());
    }

    #[test]
    fn node_mode_requires_binary() {
        let mut cfg = ReaderConfig {
            mode: ReaderMode::Node,
            ..Default::default()
        };
        assert!(matches!(cfg.validate(), Err(ConfigError::MissingBinary)));

        cfg.node.path = Some("/".into());
        assert!(matches!(
            cfg.validate(),
            Err(ConfigError::BinaryIsDirectory { .. })
        ));

        cfg.node.path = Some("sh".into());
        cfg.validate().unwrap();

        cfg.node.path = Some("definitely-not-a-real-binary-name".into());
        assert!(matches!(cfg.validate(), Err(ConfigError::BinaryNotFound { .. })));
    }

    #[test]
    fn non_executable_file_is_rejected() {
        let dir = std::env::temp_dir().join(format!("chainreader-cfg-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let file = dir.join("node.txt");
        std::fs::write(&file, "not a program").unwrap();
        let err = resolve_binary(file.to_str().unwrap()).unwrap_err();
        assert!(matches!(err, ConfigError::NotExecutable { .. }));
        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn logs_mode_requires_directory() {
        let mut cfg = ReaderConfig {
            mode: ReaderMode::Logs,
            ..Default::default()
        };
        assert!(cfg.validate().is_err());
        cfg.logs.dir = Some(PathBuf::from("/definitely/missing/dir"));
        assert!(matches!(cfg.validate(), Err(ConfigError::DirectoryMissing { .. })));
        cfg.logs.dir = Some(std::env::temp_dir());
        cfg.validate().unwrap();
    }

    #[test]
    fn zero_bundle_size_is_rejected() {
        let cfg = ReaderConfig {
            index: Some(IndexConfig {
                bundle_size: 0,
                ..Default::default()
            }),
            ..Default::default()
        };
        assert!(matches!(cfg.validate(), Err(ConfigError::InvalidBundleSize)));
    }

    #[test]
    fn log_directives() {
        let mut log = LogConfig::default();
        log.components.insert("chainreader-source".into(), "debug".into());
        assert_eq!(log.directives(), "info,chainreader_source=debug");
    }
}
