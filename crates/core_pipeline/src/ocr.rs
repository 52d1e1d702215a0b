//! OCR module
//!
//! Wraps a Tesseract-style engine behind [`OcrEngine`] and turns its
//! per-token structured output into [`RecognizedFragment`]s.
//!
//! Engines return [`RawToken`]s exactly as reported; [`recognize`] applies
//! the parsing rule (trim, integer confidence, drop empty or zero-confidence
//! tokens, scale to 0.0-1.0).

use crate::types::{RawToken, RecognizedFragment};
use image::{DynamicImage, GrayImage, ImageFormat};
use std::io::{Cursor, Write};
use std::path::PathBuf;
use std::process::{Command, Stdio};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RecognitionError {
    #[error("failed to encode image for the OCR engine: {0}")]
    Encode(#[from] image::ImageError),
    #[error("OCR engine unavailable: {0}")]
    Unavailable(String),
    #[error("OCR engine error: {0}")]
    Engine(String),
}

/// An image handed to the engine: either pass's input
#[derive(Debug, Clone, Copy)]
pub enum OcrImage<'a> {
    /// The general decoded upload (pass A)
    Decoded(&'a DynamicImage),
    /// The binarized matrix (pass B)
    Binarized(&'a GrayImage),
}

impl OcrImage<'_> {
    /// Encode as PNG, the interchange format every backend accepts
    pub fn to_png(&self) -> Result<Vec<u8>, image::ImageError> {
        let mut png_bytes = Vec::new();
        let mut cursor = Cursor::new(&mut png_bytes);
        match self {
            OcrImage::Decoded(image) => image.write_to(&mut cursor, ImageFormat::Png)?,
            OcrImage::Binarized(image) => image.write_to(&mut cursor, ImageFormat::Png)?,
        }
        Ok(png_bytes)
    }

    pub fn dimensions(&self) -> (u32, u32) {
        match self {
            OcrImage::Decoded(image) => (image.width(), image.height()),
            OcrImage::Binarized(image) => image.dimensions(),
        }
    }
}

/// Abstraction over an OCR backend producing per-token structured output.
///
/// Implementations must be deterministic for identical input and hold no
/// per-call state, so one engine can serve concurrent pipeline runs.
pub trait OcrEngine: Send + Sync {
    fn recognize(&self, image: OcrImage<'_>) -> Result<Vec<RawToken>, RecognitionError>;
}

impl<T: OcrEngine + ?Sized> OcrEngine for Box<T> {
    fn recognize(&self, image: OcrImage<'_>) -> Result<Vec<RawToken>, RecognitionError> {
        (**self).recognize(image)
    }
}

impl<T: OcrEngine + ?Sized> OcrEngine for std::sync::Arc<T> {
    fn recognize(&self, image: OcrImage<'_>) -> Result<Vec<RawToken>, RecognitionError> {
        (**self).recognize(image)
    }
}

/// Run the engine and keep the tokens worth reporting, in engine order
pub fn recognize<E: OcrEngine + ?Sized>(
    engine: &E,
    image: OcrImage<'_>,
) -> Result<Vec<RecognizedFragment>, RecognitionError> {
    let tokens = engine.recognize(image)?;
    let total = tokens.len();
    let fragments: Vec<RecognizedFragment> = tokens.into_iter().filter_map(to_fragment).collect();

    tracing::debug!(tokens = total, kept = fragments.len(), "parsed OCR tokens");
    Ok(fragments)
}

/// Apply the per-token rule to one engine row
pub fn to_fragment(token: RawToken) -> Option<RecognizedFragment> {
    let text = token.text.trim();
    let confidence = parse_confidence(&token.confidence);
    if text.is_empty() || confidence <= 0 {
        return None;
    }

    Some(RecognizedFragment {
        text: text.to_string(),
        confidence: confidence as f32 / 100.0,
        left: token.left,
        top: token.top,
        width: token.width,
        height: token.height,
    })
}

/// Highest confidence the engine can report
pub const MAX_CONFIDENCE: i32 = 100;

/// Integer confidence on the engine's 0-100 scale.
///
/// Tesseract 4+ reports decimals ("96.41"), which truncate toward zero.
/// Anything else that fails to parse counts as 0. Values above 100 clamp.
pub fn parse_confidence(raw: &str) -> i32 {
    let raw = raw.trim();
    let value = match raw.parse::<i32>() {
        Ok(value) => value,
        Err(_) => match raw.parse::<f64>() {
            Ok(value) if value.is_finite() => value.trunc() as i32,
            _ => 0,
        },
    };
    value.min(MAX_CONFIDENCE)
}

/// Parse Tesseract TSV output into raw tokens.
///
/// Columns: level, page_num, block_num, par_num, line_num, word_num,
/// left, top, width, height, conf, text. Structural rows (page, block,
/// line) come through with empty text and are dropped later by the
/// recognizer.
pub fn parse_tsv(tsv: &str) -> Vec<RawToken> {
    let mut tokens = Vec::new();

    for (idx, row) in tsv.lines().enumerate() {
        if idx == 0 && row.starts_with("level") {
            continue;
        }
        let cols: Vec<&str> = row.split('\t').collect();
        if cols.len() < 11 {
            continue;
        }

        tokens.push(RawToken {
            text: cols.get(11).copied().unwrap_or_default().to_string(),
            confidence: cols[10].to_string(),
            left: parse_coordinate(cols[6]),
            top: parse_coordinate(cols[7]),
            width: parse_coordinate(cols[8]),
            height: parse_coordinate(cols[9]),
        });
    }

    tokens
}

fn parse_coordinate(raw: &str) -> u32 {
    raw.trim().parse::<i64>().unwrap_or(0).clamp(0, u32::MAX as i64) as u32
}

/// Settings for the command-line Tesseract backend
#[derive(Debug, Clone)]
pub struct TesseractConfig {
    /// Path or name of the `tesseract` executable (default: tesseract)
    pub binary: PathBuf,
    /// Language pack passed to `-l` (default: eng)
    pub lang: String,
    /// Page segmentation mode passed to `--psm` (default: 3)
    pub psm: u32,
}

impl Default for TesseractConfig {
    fn default() -> Self {
        Self {
            binary: PathBuf::from("tesseract"),
            lang: "eng".to_string(),
            psm: 3,
        }
    }
}

/// Tesseract driven through its executable, image on stdin, TSV on stdout
#[derive(Debug, Clone, Default)]
pub struct TesseractCli {
    config: TesseractConfig,
}

impl TesseractCli {
    pub fn new(config: TesseractConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &TesseractConfig {
        &self.config
    }

    fn run(&self, png_bytes: &[u8]) -> Result<String, RecognitionError> {
        let mut child = Command::new(&self.config.binary)
            .arg("stdin")
            .arg("stdout")
            .arg("-l")
            .arg(&self.config.lang)
            .arg("--psm")
            .arg(self.config.psm.to_string())
            .arg("tsv")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| {
                RecognitionError::Unavailable(format!(
                    "failed to start {} (is Tesseract installed?): {e}",
                    self.config.binary.display()
                ))
            })?;

        // Tesseract reads all of stdin before writing, so a full write cannot deadlock.
        // The pipe closes when `stdin` drops at the end of this block.
        let sent = match child.stdin.take() {
            Some(mut stdin) => stdin.write_all(png_bytes),
            None => Ok(()),
        };

        // Always reap the child, even when it hung up on us mid-write
        let output = child
            .wait_with_output()
            .map_err(|e| RecognitionError::Engine(format!("failed to read output: {e}")))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(RecognitionError::Engine(format!(
                "tesseract exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }
        sent.map_err(|e| RecognitionError::Engine(format!("failed to send image: {e}")))?;

        String::from_utf8(output.stdout)
            .map_err(|e| RecognitionError::Engine(format!("tesseract output is not UTF-8: {e}")))
    }
}

impl OcrEngine for TesseractCli {
    fn recognize(&self, image: OcrImage<'_>) -> Result<Vec<RawToken>, RecognitionError> {
        let png_bytes = image.to_png()?;
        let tsv = self.run(&png_bytes)?;
        Ok(parse_tsv(&tsv))
    }
}

/// In-process Tesseract backend (requires the `leptess` feature)
#[cfg(feature = "leptess")]
pub mod leptess_backend {
    use super::{parse_tsv, OcrEngine, OcrImage, RawToken, RecognitionError};
    use leptess::LepTess;

    pub struct LepTessEngine {
        data_path: Option<String>,
        lang: String,
    }

    impl LepTessEngine {
        pub fn new(data_path: Option<String>, lang: &str) -> Self {
            Self {
                data_path,
                lang: lang.to_string(),
            }
        }
    }

    impl OcrEngine for LepTessEngine {
        fn recognize(&self, image: OcrImage<'_>) -> Result<Vec<RawToken>, RecognitionError> {
            // LepTess is not Sync, so each call gets its own instance
            let mut tesseract = LepTess::new(self.data_path.as_deref(), &self.lang)
                .map_err(|e| RecognitionError::Unavailable(e.to_string()))?;

            let png_bytes = image.to_png()?;
            tesseract
                .set_image_from_mem(&png_bytes)
                .map_err(|e| RecognitionError::Engine(e.to_string()))?;

            let tsv = tesseract
                .get_tsv_text(0)
                .map_err(|e| RecognitionError::Engine(e.to_string()))?;
            Ok(parse_tsv(&tsv))
        }
    }
}

/// Scripted engine for tests: fixed tokens (or a failure) per pass
#[derive(Debug, Clone)]
pub struct MockEngine {
    decoded: Result<Vec<RawToken>, String>,
    binarized: Result<Vec<RawToken>, String>,
}

impl MockEngine {
    /// Return `decoded` for pass A and `binarized` for pass B
    pub fn new(decoded: Vec<RawToken>, binarized: Vec<RawToken>) -> Self {
        Self {
            decoded: Ok(decoded),
            binarized: Ok(binarized),
        }
    }

    /// Return the same tokens for both passes
    pub fn uniform(tokens: Vec<RawToken>) -> Self {
        Self::new(tokens.clone(), tokens)
    }

    pub fn fail_decoded(mut self, message: impl Into<String>) -> Self {
        self.decoded = Err(message.into());
        self
    }

    pub fn fail_binarized(mut self, message: impl Into<String>) -> Self {
        self.binarized = Err(message.into());
        self
    }
}

impl OcrEngine for MockEngine {
    fn recognize(&self, image: OcrImage<'_>) -> Result<Vec<RawToken>, RecognitionError> {
        let scripted = match image {
            OcrImage::Decoded(_) => &self.decoded,
            OcrImage::Binarized(_) => &self.binarized,
        };
        scripted.clone().map_err(RecognitionError::Engine)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageBuffer, Luma, Rgb};

    fn blank_gray() -> GrayImage {
        ImageBuffer::from_pixel(8, 8, Luma([255u8]))
    }

    #[test]
    fn test_parse_confidence_integer() {
        assert_eq!(parse_confidence("96"), 96);
        assert_eq!(parse_confidence(" 42 "), 42);
        assert_eq!(parse_confidence("-1"), -1);
    }

    #[test]
    fn test_parse_confidence_decimal_truncates() {
        assert_eq!(parse_confidence("96.58"), 96);
        assert_eq!(parse_confidence("0.9"), 0);
    }

    #[test]
    fn test_parse_confidence_clamps_to_scale() {
        assert_eq!(parse_confidence("100"), 100);
        assert_eq!(parse_confidence("250"), MAX_CONFIDENCE);
        assert_eq!(parse_confidence("1e3"), MAX_CONFIDENCE);
        assert_eq!(parse_confidence("100.7"), MAX_CONFIDENCE);

        let fragment = to_fragment(RawToken::new("MILK", "1e3", 0, 0, 1, 1)).unwrap();
        assert_eq!(fragment.confidence, 1.0);
    }

    #[test]
    fn test_parse_confidence_garbage_is_zero() {
        assert_eq!(parse_confidence(""), 0);
        assert_eq!(parse_confidence("high"), 0);
        assert_eq!(parse_confidence("NaN"), 0);
    }

    #[test]
    fn test_to_fragment_trims_and_scales() {
        let fragment = to_fragment(RawToken::new("  EGGS\n", "91", 3, 4, 50, 14)).unwrap();
        assert_eq!(fragment.text, "EGGS");
        assert!((fragment.confidence - 0.91).abs() < 1e-6);
        assert_eq!((fragment.left, fragment.top, fragment.width, fragment.height), (3, 4, 50, 14));
    }

    #[test]
    fn test_to_fragment_drops_empty_and_unconfident() {
        assert!(to_fragment(RawToken::new("   ", "95", 0, 0, 1, 1)).is_none());
        assert!(to_fragment(RawToken::new("MILK", "0", 0, 0, 1, 1)).is_none());
        assert!(to_fragment(RawToken::new("MILK", "-1", 0, 0, 1, 1)).is_none());
        assert!(to_fragment(RawToken::new("MILK", "n/a", 0, 0, 1, 1)).is_none());
        assert!(to_fragment(RawToken::new("MILK", "1", 0, 0, 1, 1)).is_some());
    }

    #[test]
    fn test_parse_tsv_rows() {
        let tsv = "level\tpage_num\tblock_num\tpar_num\tline_num\tword_num\tleft\ttop\twidth\theight\tconf\ttext\n\
                   1\t1\t0\t0\t0\t0\t0\t0\t640\t480\t-1\t\n\
                   5\t1\t1\t1\t1\t1\t36\t92\t60\t18\t95.12\tMILK\n\
                   5\t1\t1\t1\t1\t2\t120\t92\t44\t18\t88\t2.99\n";

        let tokens = parse_tsv(tsv);
        assert_eq!(tokens.len(), 3);
        assert_eq!(tokens[0], RawToken::new("", "-1", 0, 0, 640, 480));
        assert_eq!(tokens[1], RawToken::new("MILK", "95.12", 36, 92, 60, 18));
        assert_eq!(tokens[2].text, "2.99");
    }

    #[test]
    fn test_parse_tsv_tolerates_short_and_bad_rows() {
        let tsv = "level\tpage_num\n\
                   5\t1\t1\n\
                   5\t1\t1\t1\t1\t1\t-4\tx\t10\t10\t90\n";
        let tokens = parse_tsv(tsv);
        assert_eq!(tokens.len(), 1);
        assert_eq!(tokens[0], RawToken::new("", "90", 0, 0, 10, 10));
    }

    #[test]
    fn test_recognize_keeps_engine_order() {
        let engine = MockEngine::uniform(vec![
            RawToken::new("TOTAL", "97", 10, 300, 60, 16),
            RawToken::new("", "-1", 0, 0, 100, 100),
            RawToken::new("BREAD", "90", 10, 100, 60, 16),
        ]);
        let image = blank_gray();

        let fragments = recognize(&engine, OcrImage::Binarized(&image)).unwrap();
        let texts: Vec<&str> = fragments.iter().map(|f| f.text.as_str()).collect();
        assert_eq!(texts, vec!["TOTAL", "BREAD"]);
    }

    #[test]
    fn test_recognize_propagates_engine_failure() {
        let engine = MockEngine::uniform(Vec::new()).fail_binarized("boom");
        let image = blank_gray();
        let result = recognize(&engine, OcrImage::Binarized(&image));
        assert!(matches!(result, Err(RecognitionError::Engine(msg)) if msg == "boom"));
    }

    #[test]
    fn test_mock_engine_scripts_each_pass() {
        let engine = MockEngine::new(
            vec![RawToken::new("A", "90", 0, 0, 1, 1)],
            vec![RawToken::new("B", "90", 0, 0, 1, 1)],
        );
        let gray = blank_gray();
        let decoded = DynamicImage::ImageLuma8(gray.clone());

        assert_eq!(engine.recognize(OcrImage::Decoded(&decoded)).unwrap()[0].text, "A");
        assert_eq!(engine.recognize(OcrImage::Binarized(&gray)).unwrap()[0].text, "B");
    }

    #[test]
    fn test_boxed_engine_delegates() {
        let engine: Box<dyn OcrEngine> =
            Box::new(MockEngine::uniform(vec![RawToken::new("X", "99", 0, 0, 1, 1)]));
        let gray = blank_gray();
        assert_eq!(recognize(&engine, OcrImage::Binarized(&gray)).unwrap().len(), 1);
    }

    #[test]
    fn test_ocr_image_to_png() {
        let rgb = DynamicImage::ImageRgb8(ImageBuffer::from_pixel(5, 3, Rgb([1u8, 2, 3])));
        let png = OcrImage::Decoded(&rgb).to_png().unwrap();
        assert_eq!(&png[..4], b"\x89PNG");
        assert_eq!(OcrImage::Decoded(&rgb).dimensions(), (5, 3));
    }

    #[test]
    fn test_tesseract_cli_missing_binary_is_unavailable() {
        let engine = TesseractCli::new(TesseractConfig {
            binary: PathBuf::from("/nonexistent/tesseract-binary"),
            ..TesseractConfig::default()
        });
        let gray = blank_gray();
        let result = engine.recognize(OcrImage::Binarized(&gray));
        assert!(matches!(result, Err(RecognitionError::Unavailable(_))));
    }

    #[cfg(unix)]
    fn fake_tesseract(dir: &std::path::Path, script: &str) -> PathBuf {
        use std::os::unix::fs::PermissionsExt;

        let path = dir.join("fake-tesseract");
        std::fs::write(&path, format!("#!/bin/sh\n{script}")).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    /// Large enough that its PNG overflows a pipe buffer
    #[cfg(unix)]
    fn noisy_gray(side: u32) -> GrayImage {
        let mut state = 0x2545_f491_u32;
        ImageBuffer::from_fn(side, side, |_, _| {
            state ^= state << 13;
            state ^= state >> 17;
            state ^= state << 5;
            Luma([(state & 0xff) as u8])
        })
    }

    #[cfg(unix)]
    #[test]
    fn test_tesseract_cli_early_exit_reports_stderr() {
        let dir = tempfile::tempdir().unwrap();
        let binary = fake_tesseract(
            dir.path(),
            "echo \"Failed loading language 'xyz'\" >&2\nexit 1\n",
        );
        let engine = TesseractCli::new(TesseractConfig {
            binary,
            lang: "xyz".to_string(),
            ..TesseractConfig::default()
        });
        let image = noisy_gray(800);

        for _ in 0..3 {
            match engine.recognize(OcrImage::Binarized(&image)) {
                Err(RecognitionError::Engine(msg)) => {
                    assert!(msg.contains("Failed loading language 'xyz'"), "{msg}");
                }
                other => panic!("expected engine error, got {other:?}"),
            }
        }
    }

    #[cfg(unix)]
    #[test]
    fn test_tesseract_cli_parses_stdout() {
        let dir = tempfile::tempdir().unwrap();
        let binary = fake_tesseract(
            dir.path(),
            "cat > /dev/null\n\
             printf 'level\\tpage_num\\tblock_num\\tpar_num\\tline_num\\tword_num\\tleft\\ttop\\twidth\\theight\\tconf\\ttext\\n'\n\
             printf '5\\t1\\t1\\t1\\t1\\t1\\t36\\t92\\t60\\t18\\t95.12\\tMILK\\n'\n",
        );
        let engine = TesseractCli::new(TesseractConfig {
            binary,
            ..TesseractConfig::default()
        });
        let image = noisy_gray(200);

        let fragments = recognize(&engine, OcrImage::Binarized(&image)).unwrap();
        assert_eq!(fragments.len(), 1);
        assert_eq!(fragments[0].text, "MILK");
        assert_eq!(fragments[0].confidence, 0.95);
        assert_eq!((fragments[0].left, fragments[0].top), (36, 92));
    }

    #[test]
    fn test_tesseract_config_default() {
        let config = TesseractConfig::default();
        assert_eq!(config.binary, PathBuf::from("tesseract"));
        assert_eq!(config.lang, "eng");
        assert_eq!(config.psm, 3);
    }
}
