//! Configuration settings for the backup engine
//!
//! Defines CLI arguments, the on-disk defaults file, and the merged
//! runtime configuration handed to the orchestrator.

use clap::{Parser, Subcommand, ValueEnum};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// vaultmirror - verified multi-destination backup engine
#[derive(Parser, Debug, Clone)]
#[command(name = "vaultmirror")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Verified multi-destination backup for photo and video libraries")]
#[command(long_about = r#"
vaultmirror copies a source folder to up to four destinations, verifying
every file's content hash at every destination before calling a run
complete. Pre-existing files that would be overwritten are quarantined,
never deleted.

Examples:
  vaultmirror run /photos /Volumes/BackupA /Volumes/BackupB
  vaultmirror run /photos /Volumes/Archive --filter raw-only --org "Smith Wedding"
  vaultmirror history --session <id>
  vaultmirror report --session <id> --format json
"#)]
pub struct CliArgs {
    /// Subcommand; defaults to `run` when one or more positional paths are given
    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Run a backup: mirror source into one to four destinations
    Run {
        /// Source directory to back up
        source: PathBuf,

        /// One to four destination directories
        #[arg(required = true, num_args = 1..=4)]
        destinations: Vec<PathBuf>,

        /// File type filter
        #[arg(long, value_enum, default_value = "all-files")]
        filter: TypeFilter,

        /// Comma-separated custom extensions, used when --filter=custom
        #[arg(long, value_delimiter = ',')]
        extensions: Vec<String>,

        /// Skip well-known cache/preview folders (e.g. .thumbnails, Lightroom Catalog Previews)
        #[arg(long, default_value_t = true)]
        exclude_cache: bool,

        /// Skip dotfiles and dot-directories
        #[arg(long)]
        skip_hidden: bool,

        /// Organize files under this subfolder at every destination
        #[arg(long)]
        organization_name: Option<String>,

        /// Reuse a specific session id instead of generating one
        #[arg(long)]
        session_id: Option<Uuid>,

        /// Report format for the final summary
        #[arg(long, value_enum, default_value = "text")]
        output_format: OutputFormat,

        /// Suppress progress bars (still prints the final summary)
        #[arg(short = 'q', long)]
        quiet: bool,
    },

    /// Mark a folder as a source, refusing it as a future destination
    TagSource {
        /// Folder to tag
        path: PathBuf,
    },

    /// List events for a session (or the most recent session if omitted)
    History {
        /// Session id to inspect
        #[arg(long)]
        session: Option<Uuid>,

        /// Replace user-identifying path segments with placeholders
        #[arg(long)]
        anonymize_paths: bool,
    },

    /// Print a session report
    Report {
        /// Session id to report on
        #[arg(long)]
        session: Option<Uuid>,

        /// Report format
        #[arg(long, value_enum, default_value = "text")]
        format: OutputFormat,

        /// Replace user-identifying path segments with placeholders
        #[arg(long)]
        anonymize_paths: bool,
    },
}

/// File type filter applied by the scanner
#[derive(ValueEnum, Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum TypeFilter {
    /// Every regular file
    #[default]
    AllFiles,
    /// Common photo formats (raw + jpeg/heic family)
    PhotosOnly,
    /// Raw camera formats only
    RawOnly,
    /// Common video formats
    VideosOnly,
    /// Extensions supplied via `--extensions`
    Custom,
}

impl TypeFilter {
    /// Extensions (lowercase, without the leading dot) this filter accepts.
    /// `Custom` returns an empty set; callers must use the user-supplied list.
    pub fn extensions(&self) -> &'static [&'static str] {
        match self {
            Self::AllFiles => &[],
            Self::PhotosOnly => &[
                "jpg", "jpeg", "heic", "heif", "png", "tif", "tiff", "cr2", "cr3", "nef", "arw",
                "raf", "orf", "rw2", "dng",
            ],
            Self::RawOnly => &["cr2", "cr3", "nef", "arw", "raf", "orf", "rw2", "dng"],
            Self::VideosOnly => &["mov", "mp4", "m4v", "avi", "mxf", "braw"],
            Self::Custom => &[],
        }
    }
}

/// Well-known cache/preview directory names skipped when `exclude_cache` is set
pub const CACHE_DIR_NAMES: &[&str] = &[
    "Lightroom Catalog Previews.lrdata",
    "Lightroom Catalog Smart Previews.lrdata",
    ".thumbnails",
    "@eaDir",
    ".Spotlight-V100",
    ".fseventsd",
];

/// Content-hash algorithm used by the hasher
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum HashAlgorithm {
    /// BLAKE3 - fast, cryptographic, 256-bit
    #[default]
    Blake3,
    /// SHA-256 - standard cryptographic hash, 256-bit
    Sha256,
}

impl HashAlgorithm {
    /// Output size in bytes; both supported algorithms are 256-bit
    pub fn output_size(&self) -> usize {
        32
    }

    /// Human-readable name
    pub fn name(&self) -> &'static str {
        match self {
            Self::Blake3 => "BLAKE3",
            Self::Sha256 => "SHA-256",
        }
    }
}

/// Output format for reports and history export
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum OutputFormat {
    /// Human-readable text
    #[default]
    Text,
    /// JSON format
    Json,
}

/// Per-run options derived from CLI flags
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Options {
    /// Skip well-known cache/preview folders
    pub exclude_cache: bool,
    /// Skip dotfiles and dot-directories
    pub skip_hidden: bool,
    /// Optional subfolder every destination mirrors into
    pub organization_name: Option<String>,
    /// Session id; generated if not supplied
    pub session_id: Uuid,
}

/// Engine-wide defaults, optionally overridden by a TOML config file and
/// by environment variables (`VAULTMIRROR_*`), in turn overridden by CLI flags.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineDefaults {
    /// Default organization name applied when none is given on the CLI
    pub organization_name: Option<String>,
    /// Default type filter
    pub default_filter: TypeFilter,
    /// Maximum copy-phase retry attempts per file
    pub max_retries: u8,
    /// Backoff delays (ms) for retry attempts 1, 2, 3
    pub retry_backoff_ms: [u64; 3],
    /// Worker cap applied to destinations flagged as network-mounted
    pub network_worker_cap: usize,
    /// Content hash algorithm
    pub hash_algorithm: HashAlgorithm,
}

impl Default for EngineDefaults {
    fn default() -> Self {
        Self {
            organization_name: None,
            default_filter: TypeFilter::AllFiles,
            max_retries: 3,
            retry_backoff_ms: [100, 500, 2000],
            network_worker_cap: 2,
            hash_algorithm: HashAlgorithm::Blake3,
        }
    }
}

impl EngineDefaults {
    /// Load defaults from a TOML file, falling back to built-in defaults
    /// when the file does not exist. A malformed file is an error.
    pub fn load(path: &Path) -> Result<Self, String> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let text = std::fs::read_to_string(path).map_err(|e| e.to_string())?;
        toml::from_str(&text).map_err(|e| e.to_string())
    }

    /// Apply environment variable overrides (`VAULTMIRROR_ORG`, `VAULTMIRROR_MAX_RETRIES`)
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(org) = std::env::var("VAULTMIRROR_ORG") {
            self.organization_name = Some(org);
        }
        if let Ok(retries) = std::env::var("VAULTMIRROR_MAX_RETRIES") {
            if let Ok(n) = retries.parse() {
                self.max_retries = n;
            }
        }
        self
    }
}

/// Fully-resolved configuration for one backup run
#[derive(Debug, Clone)]
pub struct RunConfig {
    /// Source directory
    pub source: PathBuf,
    /// Destination directories (1..=4)
    pub destinations: Vec<PathBuf>,
    /// File type filter
    pub filter: TypeFilter,
    /// Custom extensions when filter is `Custom`
    pub custom_extensions: Vec<String>,
    /// Per-run options
    pub options: Options,
    /// Engine defaults in effect for this run
    pub defaults: EngineDefaults,
    /// Report output format
    pub output_format: OutputFormat,
    /// Whether to suppress progress bars
    pub quiet: bool,
}

impl RunConfig {
    /// Extensions this run should accept, resolving `Custom` against the CLI list
    pub fn accepted_extensions(&self) -> Vec<String> {
        if self.filter == TypeFilter::Custom {
            self.custom_extensions
                .iter()
                .map(|e| e.trim_start_matches('.').to_lowercase())
                .collect()
        } else {
            self.filter.extensions().iter().map(|s| s.to_string()).collect()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filter_extensions_are_lowercase() {
        for ext in TypeFilter::PhotosOnly.extensions() {
            assert_eq!(*ext, ext.to_lowercase());
        }
    }

    #[test]
    fn defaults_load_missing_file_ok() {
        let defaults = EngineDefaults::load(Path::new("/nonexistent/vaultmirror.toml")).unwrap();
        assert_eq!(defaults.max_retries, 3);
    }

    #[test]
    fn accepted_extensions_custom() {
        let cfg = RunConfig {
            source: PathBuf::from("/s"),
            destinations: vec![PathBuf::from("/d")],
            filter: TypeFilter::Custom,
            custom_extensions: vec![".XMP".into(), "json".into()],
            options: Options {
                exclude_cache: true,
                skip_hidden: false,
                organization_name: None,
                session_id: Uuid::nil(),
            },
            defaults: EngineDefaults::default(),
            output_format: OutputFormat::Text,
            quiet: false,
        };
        assert_eq!(cfg.accepted_extensions(), vec!["xmp".to_string(), "json".to_string()]);
    }
}
