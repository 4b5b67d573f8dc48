//! Configuration loading and parsing.
//!
//! Parses `mech-analyser.toml` (or an override path supplied by the
//! binary), covering the serial link, font set and capture output
//! directory. Unknown fields are ignored (TOML deserialization tolerance)
//! so the file format can evolve without breaking older configs; a missing
//! or unparsable file falls back to defaults rather than failing capture
//! startup.

use anyhow::Result;
use serde::Deserialize;
use std::{fs, path::PathBuf};
use tracing::{info, warn};

#[derive(Debug, Deserialize, Clone)]
pub struct SerialConfig {
    #[serde(default = "SerialConfig::default_port")]
    pub port: String,
    #[serde(default = "SerialConfig::default_baud")]
    pub baud: u32,
}

impl SerialConfig {
    fn default_port() -> String {
        "/dev/ttyUSB0".to_string()
    }
    const fn default_baud() -> u32 {
        230_400
    }
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            port: Self::default_port(),
            baud: Self::default_baud(),
        }
    }
}

#[derive(Debug, Deserialize, Default, Clone)]
pub struct FontsConfig {
    #[serde(default)]
    pub paths: Vec<String>,
    #[serde(default)]
    pub bold: bool,
}

#[derive(Debug, Deserialize, Clone)]
pub struct CaptureConfig {
    #[serde(default = "CaptureConfig::default_output_dir")]
    pub output_dir: String,
}

impl CaptureConfig {
    fn default_output_dir() -> String {
        "captures".to_string()
    }
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            output_dir: Self::default_output_dir(),
        }
    }
}

#[derive(Debug, Deserialize, Default, Clone)]
pub struct ConfigFile {
    #[serde(default)]
    pub serial: SerialConfig,
    #[serde(default)]
    pub fonts: FontsConfig,
    #[serde(default)]
    pub capture: CaptureConfig,
}

#[derive(Debug, Clone, Default)]
pub struct Config {
    pub raw: Option<String>,
    pub file: ConfigFile,
}

/// Best-effort config path: prefer a local working-directory file, then the
/// platform config dir (XDG / AppData Roaming via `dirs`).
pub fn discover() -> PathBuf {
    let local = PathBuf::from("mech-analyser.toml");
    if local.exists() {
        return local;
    }
    if let Some(dir) = dirs::config_dir() {
        return dir.join("mech-analyser").join("mech-analyser.toml");
    }
    PathBuf::from("mech-analyser.toml")
}

pub fn load_from(path: Option<PathBuf>) -> Result<Config> {
    let path = path.unwrap_or_else(discover);
    if let Ok(content) = fs::read_to_string(&path) {
        match toml::from_str::<ConfigFile>(&content) {
            Ok(file) => {
                info!(target: "config", path = %path.display(), "config_loaded");
                Ok(Config {
                    raw: Some(content),
                    file,
                })
            }
            Err(e) => {
                warn!(target: "config", path = %path.display(), error = %e, "config_parse_failed_using_defaults");
                Ok(Config::default())
            }
        }
    } else {
        Ok(Config::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::sync::{Arc, Mutex, MutexGuard};
    use tracing::Level;
    use tracing::subscriber::with_default;
    use tracing_subscriber::fmt::MakeWriter;

    #[derive(Clone)]
    struct BufferWriter {
        inner: Arc<Mutex<Vec<u8>>>,
    }

    impl BufferWriter {
        fn new() -> (Self, Arc<Mutex<Vec<u8>>>) {
            let buf = Arc::new(Mutex::new(Vec::new()));
            (Self { inner: buf.clone() }, buf)
        }
    }

    struct LockedWriter<'a> {
        guard: MutexGuard<'a, Vec<u8>>,
    }

    impl<'a> Write for LockedWriter<'a> {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.guard.extend_from_slice(buf);
            Ok(buf.len())
        }
        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl<'a> MakeWriter<'a> for BufferWriter {
        type Writer = LockedWriter<'a>;
        fn make_writer(&'a self) -> Self::Writer {
            LockedWriter {
                guard: self.inner.lock().expect("log buffer poisoned"),
            }
        }
    }

    #[test]
    fn default_config_when_missing_file() {
        let cfg = load_from(Some(PathBuf::from("__nonexistent_hopefully__.toml"))).unwrap();
        assert_eq!(cfg.file.serial.port, "/dev/ttyUSB0");
        assert_eq!(cfg.file.serial.baud, 230_400);
        assert_eq!(cfg.file.capture.output_dir, "captures");
    }

    #[test]
    fn parses_serial_and_fonts_sections() {
        let tmp = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(
            tmp.path(),
            r#"
            [serial]
            port = "/dev/ttyACM3"
            baud = 9600

            [fonts]
            paths = ["fonts/a.json", "fonts/b.json"]
            bold = true
            "#,
        )
        .unwrap();
        let cfg = load_from(Some(tmp.path().to_path_buf())).unwrap();
        assert_eq!(cfg.file.serial.port, "/dev/ttyACM3");
        assert_eq!(cfg.file.serial.baud, 9600);
        assert_eq!(cfg.file.fonts.paths, vec!["fonts/a.json", "fonts/b.json"]);
        assert!(cfg.file.fonts.bold);
    }

    #[test]
    fn malformed_file_falls_back_to_defaults_and_warns() {
        let tmp = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(tmp.path(), "not valid toml [[[").unwrap();

        let (writer, buffer) = BufferWriter::new();
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(Level::INFO)
            .with_target(true)
            .with_ansi(false)
            .without_time()
            .with_writer(writer)
            .finish();

        let cfg = with_default(subscriber, || load_from(Some(tmp.path().to_path_buf())).unwrap());

        assert_eq!(cfg.file.serial.baud, 230_400);
        let log_output = String::from_utf8(buffer.lock().unwrap().clone()).unwrap();
        assert!(log_output.contains("config_parse_failed_using_defaults"));
    }
}
