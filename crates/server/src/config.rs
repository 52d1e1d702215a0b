//! Command-line and environment configuration

use anyhow::Result;
use clap::{Args, Parser, ValueEnum};
use core_pipeline::{OcrEngine, TesseractCli, TesseractConfig};
use std::net::SocketAddr;
use std::path::PathBuf;

/// Which OCR backend to run
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum EngineKind {
    /// Spawn the tesseract executable per pass
    Cli,
    /// In-process libtesseract (needs the `leptess` feature)
    Leptess,
}

/// OCR engine settings
#[derive(Debug, Clone, Args)]
pub struct EngineArgs {
    /// OCR backend
    #[arg(long, env = "PANTRYPAL_OCR_ENGINE", value_enum, default_value = "cli")]
    pub engine: EngineKind,

    /// Tesseract executable
    #[arg(long, env = "PANTRYPAL_TESSERACT_BIN", default_value = "tesseract")]
    pub tesseract_bin: PathBuf,

    /// Tesseract language pack
    #[arg(long, env = "PANTRYPAL_OCR_LANG", default_value = "eng")]
    pub ocr_lang: String,

    /// Tesseract page segmentation mode
    #[arg(long, env = "PANTRYPAL_OCR_PSM", default_value = "3")]
    pub psm: u32,

    /// Tessdata directory for the in-process backend
    #[arg(long, env = "TESSDATA_PREFIX")]
    pub tessdata: Option<String>,
}

impl Default for EngineArgs {
    fn default() -> Self {
        let defaults = TesseractConfig::default();
        Self {
            engine: EngineKind::Cli,
            tesseract_bin: defaults.binary,
            ocr_lang: defaults.lang,
            psm: defaults.psm,
            tessdata: None,
        }
    }
}

impl EngineArgs {
    pub fn tesseract_config(&self) -> TesseractConfig {
        TesseractConfig {
            binary: self.tesseract_bin.clone(),
            lang: self.ocr_lang.clone(),
            psm: self.psm,
        }
    }

    /// Build the configured engine
    pub fn build_engine(&self) -> Result<Box<dyn OcrEngine>> {
        match self.engine {
            EngineKind::Cli => Ok(Box::new(TesseractCli::new(self.tesseract_config()))),
            #[cfg(feature = "leptess")]
            EngineKind::Leptess => Ok(Box::new(core_pipeline::LepTessEngine::new(
                self.tessdata.clone(),
                &self.ocr_lang,
            ))),
            #[cfg(not(feature = "leptess"))]
            EngineKind::Leptess => {
                anyhow::bail!("the leptess engine requires building with the `leptess` feature")
            }
        }
    }
}

/// Logging settings
#[derive(Debug, Clone, Args)]
pub struct LogArgs {
    /// Default level when RUST_LOG is not set
    #[arg(long, env = "PANTRYPAL_LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// File that receives a plain-text copy of the log
    #[arg(long, env = "PANTRYPAL_LOG_FILE", default_value = "logs/pantrypal.log")]
    pub log_file: PathBuf,

    /// Log to the console only
    #[arg(long)]
    pub no_log_file: bool,
}

impl Default for LogArgs {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_file: PathBuf::from("logs/pantrypal.log"),
            no_log_file: false,
        }
    }
}

impl LogArgs {
    /// Log file path, unless file logging is disabled
    pub fn file(&self) -> Option<&PathBuf> {
        (!self.no_log_file).then_some(&self.log_file)
    }
}

/// PantryPal receipt OCR API server
#[derive(Debug, Clone, Parser)]
#[command(name = "pantrypal-server")]
#[command(about = "HTTP API that extracts line items from receipt photos", long_about = None)]
pub struct ServerConfig {
    /// Address to bind
    #[arg(long, env = "PANTRYPAL_HOST", default_value = "127.0.0.1")]
    pub host: String,

    /// Port to listen on
    #[arg(short, long, env = "PANTRYPAL_PORT", default_value = "8000")]
    pub port: u16,

    /// Largest accepted request body, in bytes
    #[arg(long, env = "PANTRYPAL_MAX_UPLOAD_BYTES", default_value_t = DEFAULT_MAX_UPLOAD_BYTES)]
    pub max_upload_bytes: usize,

    #[command(flatten)]
    pub engine: EngineArgs,

    #[command(flatten)]
    pub log: LogArgs,
}

/// 20 MiB, enough for full-resolution phone photos
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 20 * 1024 * 1024;

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8000,
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            engine: EngineArgs::default(),
            log: LogArgs::default(),
        }
    }
}

impl ServerConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr> {
        Ok(format!("{}:{}", self.host, self.port).parse()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_config_defaults() {
        let config = ServerConfig::parse_from(["pantrypal-server"]);
        assert_eq!(config.port, 8000);
        assert_eq!(config.max_upload_bytes, DEFAULT_MAX_UPLOAD_BYTES);
        assert_eq!(config.engine.engine, EngineKind::Cli);
        assert_eq!(config.engine.ocr_lang, "eng");
        assert_eq!(config.log.file(), Some(&PathBuf::from("logs/pantrypal.log")));
    }

    #[test]
    fn test_server_config_flags() {
        let config = ServerConfig::parse_from([
            "pantrypal-server",
            "--host",
            "0.0.0.0",
            "--port",
            "9100",
            "--ocr-lang",
            "deu",
            "--psm",
            "6",
            "--no-log-file",
        ]);
        assert_eq!(config.socket_addr().unwrap().to_string(), "0.0.0.0:9100");
        assert_eq!(config.engine.tesseract_config().lang, "deu");
        assert_eq!(config.engine.tesseract_config().psm, 6);
        assert!(config.log.file().is_none());
    }

    #[test]
    fn test_invalid_host_is_error() {
        let config = ServerConfig {
            host: "not an address".to_string(),
            ..ServerConfig::default()
        };
        assert!(config.socket_addr().is_err());
    }

    #[test]
    fn test_build_cli_engine() {
        assert!(EngineArgs::default().build_engine().is_ok());
    }

    #[cfg(not(feature = "leptess"))]
    #[test]
    fn test_leptess_engine_needs_feature() {
        let args = EngineArgs {
            engine: EngineKind::Leptess,
            ..EngineArgs::default()
        };
        assert!(args.build_engine().is_err());
    }
}
