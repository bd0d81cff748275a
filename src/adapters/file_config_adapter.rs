//! INI file configuration adapter.

use crate::domain::error::SmartExpertError;
use crate::ports::config_port::ConfigPort;
use configparser::ini::Ini;
use std::path::Path;

pub struct FileConfigAdapter {
    config: Ini,
}

impl FileConfigAdapter {
    pub fn from_file<P: AsRef<Path>>(path: P) -> std::io::Result<Self> {
        let mut config = Ini::new();
        config.load(path).map_err(std::io::Error::other)?;
        Ok(Self { config })
    }

    pub fn from_string(content: &str) -> Result<Self, String> {
        let mut config = Ini::new();
        config.read(content.to_string())?;
        Ok(Self { config })
    }
}

impl ConfigPort for FileConfigAdapter {
    /// Blank values read as absent.
    fn get_string(&self, section: &str, key: &str) -> Option<String> {
        self.config
            .get(section, key)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn get_int(&self, section: &str, key: &str, default: i64) -> Result<i64, SmartExpertError> {
        match self.get_string(section, key) {
            None => Ok(default),
            Some(text) => text.parse().map_err(|_| SmartExpertError::ConfigInvalid {
                section: section.to_string(),
                key: key.to_string(),
                reason: format!("expected an integer, got {text:?}"),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn create_temp_config(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "{}", content).unwrap();
        file
    }

    #[test]
    fn from_string_parses_config() {
        let content = r#"
[sqlite]
path = /var/lib/smartexpert/smart_expert.db

[broker]
server = Broker-Demo
login = 5012345
"#;
        let adapter = FileConfigAdapter::from_string(content).unwrap();
        assert_eq!(
            adapter.get_string("sqlite", "path"),
            Some("/var/lib/smartexpert/smart_expert.db".to_string())
        );
        assert_eq!(
            adapter.get_string("broker", "server"),
            Some("Broker-Demo".to_string())
        );
        assert_eq!(adapter.get_int("broker", "login", 0).unwrap(), 5_012_345);
    }

    #[test]
    fn get_string_returns_none_for_missing_or_blank() {
        let adapter = FileConfigAdapter::from_string("[ingest]\nsymbols =\n").unwrap();
        assert_eq!(adapter.get_string("ingest", "symbols"), None);
        assert_eq!(adapter.get_string("ingest", "missing"), None);
        assert_eq!(adapter.get_string("missing_section", "key"), None);
    }

    #[test]
    fn keys_are_case_insensitive() {
        let adapter = FileConfigAdapter::from_string("[candle_counts]\nM15 = 960\n").unwrap();
        assert_eq!(adapter.get_int("candle_counts", "M15", 0).unwrap(), 960);
        assert_eq!(adapter.get_int("candle_counts", "m15", 0).unwrap(), 960);
    }

    #[test]
    fn get_int_returns_default_for_missing() {
        let adapter = FileConfigAdapter::from_string("[sqlite]\n").unwrap();
        assert_eq!(adapter.get_int("sqlite", "pool_size", 4).unwrap(), 4);
    }

    #[test]
    fn get_int_rejects_non_numeric() {
        let adapter = FileConfigAdapter::from_string("[sqlite]\npool_size = many\n").unwrap();
        match adapter.get_int("sqlite", "pool_size", 4) {
            Err(SmartExpertError::ConfigInvalid { section, key, .. }) => {
                assert_eq!(section, "sqlite");
                assert_eq!(key, "pool_size");
            }
            other => panic!("expected ConfigInvalid, got: {other:?}"),
        }
    }

    #[test]
    fn from_file_reads_config() {
        let file = create_temp_config("[broker]\nterminal_dir = /opt/terminal/MQL5/Files\n");
        let adapter = FileConfigAdapter::from_file(file.path()).unwrap();
        assert_eq!(
            adapter.get_string("broker", "terminal_dir"),
            Some("/opt/terminal/MQL5/Files".to_string())
        );
    }

    #[test]
    fn from_file_returns_error_for_missing_file() {
        let result = FileConfigAdapter::from_file("/nonexistent/path/config.ini");
        assert!(result.is_err());
    }
}
