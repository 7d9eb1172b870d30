use crate::errors::ReplayError;
use crate::logging::DEFAULT_MAX_PAYLOAD_BYTES;
use crate::replay::recorder::{RecorderOptions, DEFAULT_PRESIZE_LIMIT, MAX_BUFFER_LEN};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const MAX_THREADS: u32 = 256;

#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub config_path: Option<PathBuf>,
    pub input: Option<PathBuf>,
    pub column: Option<usize>,
    pub threads: Option<u32>,
    pub log_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ReplayConfig {
    pub recorder: RecorderConfig,
    pub logging: LoggingConfig,
    pub input: InputConfig,
    pub demo: DemoConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RecorderConfig {
    pub max_buffer_len: u64,
    pub presize_limit: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LoggingConfig {
    pub path: Option<PathBuf>,
    pub max_payload_bytes: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct InputConfig {
    pub path: Option<PathBuf>,
    pub comment_prefix: String,
    /// Data rows (comments excluded) to drop before the first value.
    pub skip_rows: usize,
    pub column: usize,
    pub delimiter: char,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DemoConfig {
    pub threads: u32,
}

impl Default for ReplayConfig {
    fn default() -> Self {
        Self {
            recorder: RecorderConfig {
                max_buffer_len: MAX_BUFFER_LEN,
                presize_limit: DEFAULT_PRESIZE_LIMIT,
            },
            logging: LoggingConfig {
                path: None,
                max_payload_bytes: DEFAULT_MAX_PAYLOAD_BYTES,
            },
            input: InputConfig {
                path: None,
                comment_prefix: "#".to_string(),
                skip_rows: 0,
                column: 0,
                delimiter: ',',
            },
            demo: DemoConfig { threads: 4 },
        }
    }
}

impl ReplayConfig {
    pub fn recorder_options(&self) -> RecorderOptions {
        RecorderOptions {
            max_buffer_len: self.recorder.max_buffer_len,
            presize_limit: self.recorder.presize_limit,
            events: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct PartialReplayConfig {
    recorder: Option<PartialRecorderConfig>,
    logging: Option<PartialLoggingConfig>,
    input: Option<PartialInputConfig>,
    demo: Option<PartialDemoConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct PartialRecorderConfig {
    max_buffer_len: Option<u64>,
    presize_limit: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct PartialLoggingConfig {
    path: Option<PathBuf>,
    max_payload_bytes: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct PartialInputConfig {
    path: Option<PathBuf>,
    comment_prefix: Option<String>,
    skip_rows: Option<usize>,
    column: Option<usize>,
    delimiter: Option<char>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct PartialDemoConfig {
    threads: Option<u32>,
}

pub fn load_config(overrides: &CliOverrides) -> Result<ReplayConfig, ReplayError> {
    let mut cfg = ReplayConfig::default();

    if let Some(path) = &overrides.config_path {
        let file_contents = read_config_file(path)?;
        merge_config_str(&mut cfg, &file_contents)?;
    }

    apply_cli_overrides(&mut cfg, overrides);
    validate_config(&cfg)?;
    Ok(cfg)
}

pub fn parse_config(text: &str) -> Result<ReplayConfig, ReplayError> {
    let mut cfg = ReplayConfig::default();
    merge_config_str(&mut cfg, text)?;
    validate_config(&cfg)?;
    Ok(cfg)
}

fn read_config_file(path: &Path) -> Result<String, ReplayError> {
    std::fs::read_to_string(path)
        .map_err(|e| ReplayError::Io(format!("{}: {e}", path.display())))
}

fn merge_config_str(cfg: &mut ReplayConfig, text: &str) -> Result<(), ReplayError> {
    let partial: PartialReplayConfig =
        toml::from_str(text).map_err(|e| ReplayError::ConfigParse(e.to_string()))?;
    merge_partial_config(cfg, partial);
    Ok(())
}

fn merge_partial_config(cfg: &mut ReplayConfig, partial: PartialReplayConfig) {
    if let Some(recorder) = partial.recorder {
        if let Some(value) = recorder.max_buffer_len {
            cfg.recorder.max_buffer_len = value;
        }
        if let Some(value) = recorder.presize_limit {
            cfg.recorder.presize_limit = value;
        }
    }

    if let Some(logging) = partial.logging {
        if let Some(path) = logging.path {
            cfg.logging.path = Some(path);
        }
        if let Some(value) = logging.max_payload_bytes {
            cfg.logging.max_payload_bytes = value;
        }
    }

    if let Some(input) = partial.input {
        if let Some(path) = input.path {
            cfg.input.path = Some(path);
        }
        if let Some(value) = input.comment_prefix {
            cfg.input.comment_prefix = value;
        }
        if let Some(value) = input.skip_rows {
            cfg.input.skip_rows = value;
        }
        if let Some(value) = input.column {
            cfg.input.column = value;
        }
        if let Some(value) = input.delimiter {
            cfg.input.delimiter = value;
        }
    }

    if let Some(demo) = partial.demo {
        if let Some(threads) = demo.threads {
            cfg.demo.threads = threads;
        }
    }
}

fn apply_cli_overrides(cfg: &mut ReplayConfig, overrides: &CliOverrides) {
    if let Some(input) = &overrides.input {
        cfg.input.path = Some(input.clone());
    }
    if let Some(column) = overrides.column {
        cfg.input.column = column;
    }
    if let Some(threads) = overrides.threads {
        cfg.demo.threads = threads;
    }
    if let Some(log_path) = &overrides.log_path {
        cfg.logging.path = Some(log_path.clone());
    }
}

fn validate_config(cfg: &ReplayConfig) -> Result<(), ReplayError> {
    if cfg.recorder.max_buffer_len == 0 {
        return Err(ReplayError::InvalidConfig(
            "recorder.max_buffer_len must be greater than zero".to_string(),
        ));
    }

    if cfg.demo.threads == 0 || cfg.demo.threads > MAX_THREADS {
        return Err(ReplayError::InvalidConfig(format!(
            "demo.threads must be between 1 and {MAX_THREADS}"
        )));
    }

    if cfg.logging.max_payload_bytes < 16 {
        return Err(ReplayError::InvalidConfig(
            "logging.max_payload_bytes must be at least 16".to_string(),
        ));
    }

    if cfg.input.comment_prefix.is_empty() {
        return Err(ReplayError::InvalidConfig(
            "input.comment_prefix must not be empty".to_string(),
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_config_is_the_default() {
        assert_eq!(parse_config("").expect("parse"), ReplayConfig::default());
    }

    #[test]
    fn partial_sections_override_only_named_fields() {
        let cfg = parse_config(
            r#"
            [recorder]
            max_buffer_len = 1000

            [input]
            column = 2
            delimiter = ";"
            "#,
        )
        .expect("parse");
        assert_eq!(cfg.recorder.max_buffer_len, 1000);
        assert_eq!(cfg.recorder.presize_limit, DEFAULT_PRESIZE_LIMIT);
        assert_eq!(cfg.input.column, 2);
        assert_eq!(cfg.input.delimiter, ';');
        assert_eq!(cfg.input.comment_prefix, "#");
    }

    #[test]
    fn cli_overrides_win_over_file_values() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("replayer.toml");
        std::fs::write(&path, "[demo]\nthreads = 2\n[input]\ncolumn = 1\n").expect("write");

        let cfg = load_config(&CliOverrides {
            config_path: Some(path),
            threads: Some(8),
            ..CliOverrides::default()
        })
        .expect("load");
        assert_eq!(cfg.demo.threads, 8);
        assert_eq!(cfg.input.column, 1);
    }

    #[test]
    fn invalid_values_are_rejected() {
        let err = parse_config("[demo]\nthreads = 0\n").expect_err("zero threads");
        assert!(matches!(err, ReplayError::InvalidConfig(_)));
        let err = parse_config("[recorder]\nmax_buffer_len = 0\n").expect_err("zero limit");
        assert!(matches!(err, ReplayError::InvalidConfig(_)));
        let err = parse_config("[input]\ncomment_prefix = \"\"\n").expect_err("empty prefix");
        assert!(matches!(err, ReplayError::InvalidConfig(_)));
    }

    #[test]
    fn malformed_toml_is_a_parse_error() {
        let err = parse_config("[recorder\n").expect_err("malformed");
        assert!(matches!(err, ReplayError::ConfigParse(_)));
    }

    #[test]
    fn missing_config_file_is_an_io_error() {
        let err = load_config(&CliOverrides {
            config_path: Some(PathBuf::from("/definitely/not/here.toml")),
            ..CliOverrides::default()
        })
        .expect_err("missing");
        assert!(matches!(err, ReplayError::Io(_)));
    }
}
