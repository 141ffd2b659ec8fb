//! Pipeline configuration via `tilepress.toml`
//!
//! Every key is optional; a missing key takes its default. The sorter chunk
//! size is auto-tuned from the input size unless pinned in `[sort]`.

use crate::error::{PipelineError, PipelineResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tilepress_archive::config::parse_separator;
use tilepress_archive::{ArchiveFormat, BinaryEncoding, CsvOptions, StreamArchiveConfig};
use tilepress_storage::SorterConfig;

/// Conventional config file name.
pub const CONFIG_FILE_NAME: &str = "tilepress.toml";

/// Smallest auto-tuned chunk (16 MiB).
pub const MIN_AUTO_CHUNK_BYTES: u64 = 16 * 1024 * 1024;

/// Largest auto-tuned chunk (1 GiB).
pub const MAX_AUTO_CHUNK_BYTES: u64 = 1024 * 1024 * 1024;

/// `[sort]` section.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SortSection {
    /// Spill threshold in bytes; auto-tuned when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chunk_bytes: Option<u64>,
    /// Spill threshold in features.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chunk_features: Option<usize>,
    /// zstd-compress spilled chunks.
    #[serde(default)]
    pub compress: bool,
}

/// `[output]` section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OutputSection {
    /// `csv`, `tsv` or `proto`.
    #[serde(default = "default_format")]
    pub format: String,
    /// Number of shards.
    #[serde(default = "default_shards")]
    pub shards: usize,
    /// Append to existing destinations (named pipes).
    #[serde(default)]
    pub append: bool,
    /// Column separator, with `\t`-style escapes; format default when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub column_separator: Option<String>,
    /// Line separator, with `\n`-style escapes; `\n` when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line_separator: Option<String>,
    /// `none`, `base64` or `hex`.
    #[serde(default = "default_binary_encoding")]
    pub binary_encoding: String,
}

fn default_format() -> String {
    "csv".to_string()
}

fn default_shards() -> usize {
    1
}

fn default_binary_encoding() -> String {
    "base64".to_string()
}

impl Default for OutputSection {
    fn default() -> Self {
        OutputSection {
            format: default_format(),
            shards: default_shards(),
            append: false,
            column_separator: None,
            line_separator: None,
            binary_encoding: default_binary_encoding(),
        }
    }
}

/// Pipeline configuration loaded from `tilepress.toml`.
///
/// # Example
///
/// ```toml
/// tmp_dir = "data/tmp"
/// threads = 4
///
/// [sort]
/// compress = true
///
/// [output]
/// format = "tsv"
/// shards = 4
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PipelineConfig {
    /// Parent of the per-run temporary directory.
    #[serde(default = "default_tmp_dir")]
    pub tmp_dir: PathBuf,
    /// Worker threads for sorting and rendering.
    #[serde(default = "default_threads")]
    pub threads: usize,
    /// Replace an existing output instead of failing.
    #[serde(default)]
    pub force_overwrite: bool,
    /// Tiles rendered per parallel batch.
    #[serde(default = "default_render_batch_size")]
    pub render_batch_size: usize,
    /// Write tiles that render to no data.
    #[serde(default)]
    pub emit_empty_tiles: bool,
    /// Feature sort settings.
    #[serde(default)]
    pub sort: SortSection,
    /// Archive output settings.
    #[serde(default)]
    pub output: OutputSection,
}

fn default_tmp_dir() -> PathBuf {
    PathBuf::from("data/tmp")
}

fn default_threads() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

fn default_render_batch_size() -> usize {
    256
}

impl Default for PipelineConfig {
    fn default() -> Self {
        PipelineConfig {
            tmp_dir: default_tmp_dir(),
            threads: default_threads(),
            force_overwrite: false,
            render_batch_size: default_render_batch_size(),
            emit_empty_tiles: false,
            sort: SortSection::default(),
            output: OutputSection::default(),
        }
    }
}

impl PipelineConfig {
    /// Returns the default config file content with comments.
    pub fn default_toml() -> &'static str {
        r#"# tilepress configuration
#
# Parent directory of the per-run temporary directory (spill chunks, node.db)
tmp_dir = "data/tmp"

# Worker threads for chunk sorting and tile rendering (default: all cores)
# threads = 4

# Replace an existing output archive instead of failing
force_overwrite = false

# Tiles rendered per parallel batch
render_batch_size = 256

# Write tiles that render to no data
emit_empty_tiles = false

[sort]
# Spill threshold in bytes. When absent it is derived from the input size:
# input / 8, clamped to 16 MiB ..= 1 GiB.
# chunk_bytes = 268435456
# chunk_features = 1000000
compress = false

[output]
format = "csv"            # csv | tsv | proto
shards = 1
append = false            # for named pipes
# column_separator = ","  # "\t" by default for tsv
# line_separator = "\n"
binary_encoding = "base64" # none | base64 | hex
"#
    }

    /// Parse config from TOML text.
    pub fn from_toml_str(content: &str) -> PipelineResult<Self> {
        let config: PipelineConfig = toml::from_str(content)
            .map_err(|e| PipelineError::config(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Read and parse config from a file path.
    pub fn from_file(path: &Path) -> PipelineResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            PipelineError::config(format!(
                "Failed to read config file '{}': {}",
                path.display(),
                e
            ))
        })?;
        Self::from_toml_str(&content).map_err(|e| match e {
            PipelineError::Config(msg) => {
                PipelineError::Config(format!("{} ({})", msg, path.display()))
            }
            other => other,
        })
    }

    /// Serialize to TOML.
    pub fn to_toml_string(&self) -> PipelineResult<String> {
        toml::to_string_pretty(self)
            .map_err(|e| PipelineError::config(format!("Failed to serialize config: {}", e)))
    }

    /// Serialize this config to TOML and write it to the given path.
    pub fn write_to_file(&self, path: &Path) -> PipelineResult<()> {
        std::fs::write(path, self.to_toml_string()?)?;
        Ok(())
    }

    /// Small settings for tests: tiny spill chunks, two threads.
    pub fn for_testing(tmp_dir: impl Into<PathBuf>) -> Self {
        PipelineConfig {
            tmp_dir: tmp_dir.into(),
            threads: 2,
            render_batch_size: 4,
            sort: SortSection {
                chunk_bytes: Some(4 * 1024),
                ..SortSection::default()
            },
            ..PipelineConfig::default()
        }
    }

    /// Check every value, including the archive options.
    pub fn validate(&self) -> PipelineResult<()> {
        if self.threads == 0 {
            return Err(PipelineError::config("threads must be at least 1"));
        }
        if self.render_batch_size == 0 {
            return Err(PipelineError::config("render_batch_size must be at least 1"));
        }
        self.sorter_config(None)
            .validate()
            .map_err(|e| PipelineError::config(e.to_string()))?;
        self.archive_config()?;
        Ok(())
    }

    /// Sorter settings, auto-tuning the chunk size from `input_size` bytes
    /// when `[sort] chunk_bytes` is absent.
    pub fn sorter_config(&self, input_size: Option<u64>) -> SorterConfig {
        let chunk_bytes = match (self.sort.chunk_bytes, input_size) {
            (Some(pinned), _) => pinned,
            (None, Some(size)) => (size / 8).clamp(MIN_AUTO_CHUNK_BYTES, MAX_AUTO_CHUNK_BYTES),
            (None, None) => SorterConfig::default().chunk_bytes,
        };
        let mut config = SorterConfig::new()
            .with_chunk_bytes(chunk_bytes)
            .with_compression(self.sort.compress)
            .with_threads(self.threads.max(1));
        if let Some(features) = self.sort.chunk_features {
            config = config.with_chunk_features(features);
        }
        config
    }

    /// Archive settings with separators unescaped and encodings parsed.
    pub fn archive_config(&self) -> PipelineResult<StreamArchiveConfig> {
        let output = &self.output;
        let format: ArchiveFormat = output.format.parse().map_err(config_error)?;

        let mut csv = CsvOptions::for_format(format)
            .with_binary_encoding(output.binary_encoding.parse::<BinaryEncoding>().map_err(config_error)?);
        if let Some(sep) = &output.column_separator {
            csv = csv.with_column_separator(parse_separator("column_separator", sep).map_err(config_error)?);
        }
        if let Some(sep) = &output.line_separator {
            csv = csv.with_line_separator(parse_separator("line_separator", sep).map_err(config_error)?);
        }

        let config = StreamArchiveConfig::new(format)
            .with_shards(output.shards)
            .with_append(output.append)
            .with_csv_options(csv);
        config.validate().map_err(config_error)?;
        Ok(config)
    }
}

fn config_error(e: tilepress_archive::ArchiveError) -> PipelineError {
    PipelineError::config(e.to_string())
}
