//! Core pipeline for PantryPal receipt scanning
//!
//! This crate turns a photographed receipt into a list of recognized text
//! fragments with confidence scores and bounding boxes. It runs OCR twice,
//! once on the decoded photo and once on a binarized copy, then merges the
//! two passes and drops low-confidence and duplicate fragments.

pub mod decoder;
pub mod merge;
pub mod ocr;
pub mod pipeline;
pub mod preprocess;
pub mod types;

pub use decoder::{DecodeError, DecodedReceipt};
pub use merge::{is_duplicate, merge_passes};
pub use ocr::{MockEngine, OcrEngine, OcrImage, RecognitionError, TesseractCli, TesseractConfig};
pub use pipeline::{PipelineError, PipelineStage, ReceiptPipeline};
pub use preprocess::PreprocessError;
pub use types::*;

#[cfg(feature = "leptess")]
pub use ocr::leptess_backend::LepTessEngine;
