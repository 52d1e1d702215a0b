//! Hybrid two-pass OCR pipeline
//!
//! decode -> pass A (OCR on the decoded upload) -> pass B (binarize, OCR)
//! -> merge. Decode and pass A failures end the run; pass B failures only
//! cost the second opinion. [`ReceiptPipeline::run`] never fails: callers
//! always get a (possibly empty) fragment list.

use std::fmt;
use std::panic::{self, AssertUnwindSafe};

use image::RgbImage;
use thiserror::Error;
use tracing::{error, info, warn};

use crate::decoder::{self, DecodeError, DecodedReceipt};
use crate::merge;
use crate::ocr::{self, OcrEngine, OcrImage, RecognitionError};
use crate::preprocess::{self, PreprocessError};
use crate::types::{PipelineResult, RecognizedFragment};

/// Step of a pipeline run, used to label failures
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineStage {
    Decode,
    PassA,
    PassB,
    Merge,
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineStage::Decode => write!(f, "decode"),
            PipelineStage::PassA => write!(f, "pass_a"),
            PipelineStage::PassB => write!(f, "pass_b"),
            PipelineStage::Merge => write!(f, "merge"),
        }
    }
}

/// Failures that end a pipeline run
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("image decoding failed: {0}")]
    Decode(#[from] DecodeError),
    #[error("primary OCR pass failed: {0}")]
    PassA(#[source] RecognitionError),
    #[error("unexpected failure: {0}")]
    Unexpected(String),
}

impl PipelineError {
    /// Stage the run was in, when known
    pub fn stage(&self) -> Option<PipelineStage> {
        match self {
            PipelineError::Decode(_) => Some(PipelineStage::Decode),
            PipelineError::PassA(_) => Some(PipelineStage::PassA),
            PipelineError::Unexpected(_) => None,
        }
    }
}

#[derive(Debug, Error)]
enum SecondPassError {
    #[error("preprocessing failed: {0}")]
    Preprocess(#[from] PreprocessError),
    #[error("recognition failed: {0}")]
    Recognition(#[from] RecognitionError),
}

/// Orchestrates: decode -> pass A -> pass B -> merge.
///
/// Holds only the engine; every run allocates its own buffers, so one
/// pipeline can be shared across threads.
pub struct ReceiptPipeline<E: OcrEngine> {
    engine: E,
}

impl<E: OcrEngine> ReceiptPipeline<E> {
    pub fn new(engine: E) -> Self {
        Self { engine }
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    /// Process raw upload bytes. Every failure, including a panic inside the
    /// engine or filters, is logged and turned into an empty result.
    pub fn run(&self, data: &[u8]) -> PipelineResult {
        let digest = decoder::content_digest(data);
        let span = tracing::info_span!("receipt_pipeline", bytes = data.len(), digest = &digest[..12]);
        let _enter = span.enter();

        let outcome = match panic::catch_unwind(AssertUnwindSafe(|| self.try_run(data))) {
            Ok(outcome) => outcome,
            Err(payload) => Err(PipelineError::Unexpected(panic_message(payload.as_ref()))),
        };

        match outcome {
            Ok(fragments) => {
                info!(items = fragments.len(), "receipt processed");
                fragments
            }
            Err(err) => {
                let stage = err
                    .stage()
                    .map_or_else(|| "unknown".to_string(), |s| s.to_string());
                error!(%stage, error = %err, "receipt processing failed, returning no items");
                Vec::new()
            }
        }
    }

    /// Process raw upload bytes, reporting fatal failures to the caller
    pub fn try_run(&self, data: &[u8]) -> Result<PipelineResult, PipelineError> {
        let decoded = decoder::decode(data)?;
        info!(
            width = decoded.image.width(),
            height = decoded.image.height(),
            color = ?decoded.image.color(),
            matrix = decoded.matrix.is_some(),
            "decoded receipt image"
        );
        self.run_decoded(decoded)
    }

    /// Run both OCR passes and merge over an already decoded upload
    pub fn run_decoded(&self, decoded: DecodedReceipt) -> Result<PipelineResult, PipelineError> {
        let DecodedReceipt { image, matrix } = decoded;

        let pass_a = ocr::recognize(&self.engine, OcrImage::Decoded(&image))
            .map_err(PipelineError::PassA)?;
        info!(fragments = pass_a.len(), "pass A complete");
        drop(image);

        let Some(matrix) = matrix else {
            warn!("pixel matrix unavailable, using pass A alone");
            return Ok(merge::merge_passes(pass_a, Vec::new()));
        };

        let pass_b = match self.second_pass(&matrix) {
            Ok(fragments) => {
                info!(fragments = fragments.len(), "pass B complete");
                fragments
            }
            Err(err) => {
                warn!(stage = %PipelineStage::PassB, error = %err, "pass B failed, continuing without it");
                Vec::new()
            }
        };

        Ok(merge::merge_passes(pass_a, pass_b))
    }

    fn second_pass(&self, matrix: &RgbImage) -> Result<Vec<RecognizedFragment>, SecondPassError> {
        let binarized = preprocess::binarize(matrix)?;
        Ok(ocr::recognize(&self.engine, OcrImage::Binarized(&binarized))?)
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "panic with non-string payload".to_string()
    }
}
