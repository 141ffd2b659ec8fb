//! Archive format options

use crate::error::{ArchiveError, ArchiveResult};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use std::fmt;
use std::str::FromStr;

/// Output encoding of a stream archive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArchiveFormat {
    /// Comma separated lines
    Csv,
    /// Tab separated lines
    Tsv,
    /// Length-delimited protobuf entries
    Proto,
}

impl ArchiveFormat {
    /// Lowercase name used in configuration files.
    pub fn as_str(&self) -> &'static str {
        match self {
            ArchiveFormat::Csv => "csv",
            ArchiveFormat::Tsv => "tsv",
            ArchiveFormat::Proto => "proto",
        }
    }

    /// Whether the format is line-oriented text.
    pub fn is_text(&self) -> bool {
        matches!(self, ArchiveFormat::Csv | ArchiveFormat::Tsv)
    }
}

impl fmt::Display for ArchiveFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ArchiveFormat {
    type Err = ArchiveError;

    fn from_str(s: &str) -> ArchiveResult<Self> {
        match s.to_ascii_lowercase().as_str() {
            "csv" => Ok(ArchiveFormat::Csv),
            "tsv" => Ok(ArchiveFormat::Tsv),
            "proto" | "pbf" | "protobuf" => Ok(ArchiveFormat::Proto),
            _ => Err(ArchiveError::InvalidOption {
                name: "format",
                value: s.to_string(),
            }),
        }
    }
}

/// Text encoding of tile bytes in CSV/TSV output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum BinaryEncoding {
    /// Raw bytes, interpreted as UTF-8. Unsafe unless tiles are text
    /// without separators.
    None,
    /// Standard base64 with padding
    #[default]
    Base64,
    /// Lowercase hex
    Hex,
}

impl BinaryEncoding {
    /// Encode tile bytes for a text column.
    pub fn encode(&self, data: &[u8]) -> String {
        match self {
            BinaryEncoding::None => String::from_utf8_lossy(data).into_owned(),
            BinaryEncoding::Base64 => BASE64.encode(data),
            BinaryEncoding::Hex => hex::encode(data),
        }
    }

    /// Decode a text column back to tile bytes.
    pub fn decode(&self, text: &str) -> ArchiveResult<Vec<u8>> {
        match self {
            BinaryEncoding::None => Ok(text.as_bytes().to_vec()),
            BinaryEncoding::Base64 => BASE64
                .decode(text)
                .map_err(|e| ArchiveError::decode(format!("base64: {}", e))),
            BinaryEncoding::Hex => {
                hex::decode(text).map_err(|e| ArchiveError::decode(format!("hex: {}", e)))
            }
        }
    }

    /// Lowercase name used in configuration files.
    pub fn as_str(&self) -> &'static str {
        match self {
            BinaryEncoding::None => "none",
            BinaryEncoding::Base64 => "base64",
            BinaryEncoding::Hex => "hex",
        }
    }
}

impl FromStr for BinaryEncoding {
    type Err = ArchiveError;

    fn from_str(s: &str) -> ArchiveResult<Self> {
        match s.to_ascii_lowercase().as_str() {
            "none" => Ok(BinaryEncoding::None),
            "base64" => Ok(BinaryEncoding::Base64),
            "hex" => Ok(BinaryEncoding::Hex),
            _ => Err(ArchiveError::InvalidOption {
                name: "binary_encoding",
                value: s.to_string(),
            }),
        }
    }
}

/// Expand `\t`, `\n`, `\r` and `\\` in a separator option.
pub fn parse_separator(name: &'static str, raw: &str) -> ArchiveResult<String> {
    let invalid = || ArchiveError::InvalidOption {
        name,
        value: raw.to_string(),
    };

    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('t') => out.push('\t'),
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('\\') => out.push('\\'),
            _ => return Err(invalid()),
        }
    }

    if out.is_empty() {
        return Err(invalid());
    }
    Ok(out)
}

/// Separators and tile encoding of CSV/TSV output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CsvOptions {
    /// Between x, y, z and data (default `,`; `\t` for TSV)
    pub column_separator: String,
    /// After each record (default `\n`)
    pub line_separator: String,
    /// Tile bytes encoding (default base64)
    pub binary_encoding: BinaryEncoding,
}

impl Default for CsvOptions {
    fn default() -> Self {
        Self::csv()
    }
}

impl CsvOptions {
    /// Defaults for comma separated output.
    pub fn csv() -> Self {
        CsvOptions {
            column_separator: ",".to_string(),
            line_separator: "\n".to_string(),
            binary_encoding: BinaryEncoding::Base64,
        }
    }

    /// Defaults for tab separated output.
    pub fn tsv() -> Self {
        CsvOptions {
            column_separator: "\t".to_string(),
            ..Self::csv()
        }
    }

    /// Defaults for `format`.
    pub fn for_format(format: ArchiveFormat) -> Self {
        match format {
            ArchiveFormat::Tsv => Self::tsv(),
            _ => Self::csv(),
        }
    }

    /// Set the column separator (builder pattern).
    pub fn with_column_separator(mut self, separator: impl Into<String>) -> Self {
        self.column_separator = separator.into();
        self
    }

    /// Set the line separator (builder pattern).
    pub fn with_line_separator(mut self, separator: impl Into<String>) -> Self {
        self.line_separator = separator.into();
        self
    }

    /// Set the binary encoding (builder pattern).
    pub fn with_binary_encoding(mut self, encoding: BinaryEncoding) -> Self {
        self.binary_encoding = encoding;
        self
    }

    /// Validate separators.
    pub fn validate(&self) -> ArchiveResult<()> {
        if self.column_separator.is_empty() {
            return Err(ArchiveError::InvalidOption {
                name: "column_separator",
                value: String::new(),
            });
        }
        if self.line_separator.is_empty() || self.line_separator == self.column_separator {
            return Err(ArchiveError::InvalidOption {
                name: "line_separator",
                value: self.line_separator.clone(),
            });
        }
        Ok(())
    }
}

/// Configuration of a [`crate::StreamArchiveWriter`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamArchiveConfig {
    /// Output encoding
    pub format: ArchiveFormat,
    /// Number of shards, at least 1 (default: 1)
    pub shards: usize,
    /// Open destinations for appending instead of creating them, for named
    /// pipes (default: false)
    pub append: bool,
    /// Options for text formats, ignored for protobuf
    pub csv: CsvOptions,
}

impl StreamArchiveConfig {
    /// Single-shard configuration with the format's default options.
    pub fn new(format: ArchiveFormat) -> Self {
        StreamArchiveConfig {
            format,
            shards: 1,
            append: false,
            csv: CsvOptions::for_format(format),
        }
    }

    /// Set the shard count (builder pattern).
    pub fn with_shards(mut self, shards: usize) -> Self {
        self.shards = shards;
        self
    }

    /// Enable append mode (builder pattern).
    pub fn with_append(mut self, append: bool) -> Self {
        self.append = append;
        self
    }

    /// Set the text options (builder pattern).
    pub fn with_csv_options(mut self, csv: CsvOptions) -> Self {
        self.csv = csv;
        self
    }

    /// Validate configuration.
    pub fn validate(&self) -> ArchiveResult<()> {
        if self.shards == 0 {
            return Err(ArchiveError::InvalidOption {
                name: "shards",
                value: "0".to_string(),
            });
        }
        if self.format.is_text() {
            self.csv.validate()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_binary_encodings() {
        let data = [1u8, 2, 255];
        assert_eq!(BinaryEncoding::Base64.encode(&data), "AQL/");
        assert_eq!(BinaryEncoding::Hex.encode(&data), "0102ff");
        assert_eq!(BinaryEncoding::None.encode(b"abc"), "abc");

        assert_eq!(BinaryEncoding::Base64.decode("AQL/").unwrap(), data);
        assert_eq!(BinaryEncoding::Hex.decode("0102FF").unwrap(), data);
        assert!(BinaryEncoding::Hex.decode("0g").is_err());
    }

    #[test]
    fn test_binary_encoding_parse_case_insensitive() {
        assert_eq!("HEX".parse::<BinaryEncoding>().unwrap(), BinaryEncoding::Hex);
        assert_eq!("Base64".parse::<BinaryEncoding>().unwrap(), BinaryEncoding::Base64);
        assert_eq!("none".parse::<BinaryEncoding>().unwrap(), BinaryEncoding::None);
        assert!(matches!(
            "base32".parse::<BinaryEncoding>(),
            Err(ArchiveError::InvalidOption { name: "binary_encoding", .. })
        ));
    }

    #[test]
    fn test_format_parse() {
        assert_eq!("csv".parse::<ArchiveFormat>().unwrap(), ArchiveFormat::Csv);
        assert_eq!("TSV".parse::<ArchiveFormat>().unwrap(), ArchiveFormat::Tsv);
        assert_eq!("proto".parse::<ArchiveFormat>().unwrap(), ArchiveFormat::Proto);
        assert!("mbtiles".parse::<ArchiveFormat>().is_err());
    }

    #[test]
    fn test_parse_separator_escapes() {
        assert_eq!(parse_separator("sep", "\\t").unwrap(), "\t");
        assert_eq!(parse_separator("sep", "\\r\\n").unwrap(), "\r\n");
        assert_eq!(parse_separator("sep", "a\\\\b").unwrap(), "a\\b");
        assert_eq!(parse_separator("sep", "|").unwrap(), "|");
        assert!(parse_separator("sep", "\\x").is_err());
        assert!(parse_separator("sep", "\\").is_err());
        assert!(parse_separator("sep", "").is_err());
    }

    #[test]
    fn test_tsv_defaults() {
        let options = CsvOptions::for_format(ArchiveFormat::Tsv);
        assert_eq!(options.column_separator, "\t");
        assert_eq!(options.line_separator, "\n");
        assert_eq!(options.binary_encoding, BinaryEncoding::Base64);
    }

    #[test]
    fn test_config_validation() {
        assert!(StreamArchiveConfig::new(ArchiveFormat::Csv).validate().is_ok());
        assert!(StreamArchiveConfig::new(ArchiveFormat::Csv)
            .with_shards(0)
            .validate()
            .is_err());
        let same = CsvOptions::csv().with_line_separator(",");
        assert!(StreamArchiveConfig::new(ArchiveFormat::Csv)
            .with_csv_options(same.clone())
            .validate()
            .is_err());
        // Text options are irrelevant for protobuf
        assert!(StreamArchiveConfig::new(ArchiveFormat::Proto)
            .with_csv_options(same)
            .validate()
            .is_ok());
    }
}
