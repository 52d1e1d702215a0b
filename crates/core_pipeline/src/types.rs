//! Core types for the receipt OCR pipeline
//!
//! Fragments are what the recognizer produces and the merger consumes.
//! The wire records at the bottom are what the HTTP layer and CLI emit.

use serde::{Deserialize, Serialize};

/// One OCR-detected text token with its confidence and bounding box
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecognizedFragment {
    /// Trimmed, non-empty token text
    pub text: String,
    /// Engine confidence normalized to 0.0-1.0
    pub confidence: f32,
    pub left: u32,
    pub top: u32,
    pub width: u32,
    pub height: u32,
}

impl RecognizedFragment {
    pub fn new(
        text: impl Into<String>,
        confidence: f32,
        left: u32,
        top: u32,
        width: u32,
        height: u32,
    ) -> Self {
        Self {
            text: text.into(),
            confidence,
            left,
            top,
            width,
            height,
        }
    }
}

/// Ordered output of one pipeline run, pass A discoveries first
pub type PipelineResult = Vec<RecognizedFragment>;

/// One row of structured engine output, before any filtering.
///
/// Confidence is kept exactly as the engine reported it; turning it into a
/// number is the recognizer's job.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RawToken {
    pub text: String,
    pub confidence: String,
    pub left: u32,
    pub top: u32,
    pub width: u32,
    pub height: u32,
}

impl RawToken {
    pub fn new(
        text: impl Into<String>,
        confidence: impl Into<String>,
        left: u32,
        top: u32,
        width: u32,
        height: u32,
    ) -> Self {
        Self {
            text: text.into(),
            confidence: confidence.into(),
            left,
            top,
            width,
            height,
        }
    }
}

/// A receipt line item as returned to API clients
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractedItem {
    pub item_name: String,
    pub confidence: f32,
    pub left: u32,
    pub top: u32,
    pub width: u32,
    pub height: u32,
}

impl From<RecognizedFragment> for ExtractedItem {
    fn from(fragment: RecognizedFragment) -> Self {
        Self {
            item_name: fragment.text,
            confidence: fragment.confidence,
            left: fragment.left,
            top: fragment.top,
            width: fragment.width,
            height: fragment.height,
        }
    }
}

/// Response body for a processed receipt upload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReceiptUploadResponse {
    pub filename: String,
    pub content_type: String,
    pub extracted_items: Vec<ExtractedItem>,
    pub message: String,
}

impl ReceiptUploadResponse {
    pub const SUCCESS_MESSAGE: &'static str = "Receipt processed successfully.";

    /// Build the standard success response from a pipeline result
    pub fn processed(
        filename: impl Into<String>,
        content_type: impl Into<String>,
        fragments: PipelineResult,
    ) -> Self {
        Self {
            filename: filename.into(),
            content_type: content_type.into(),
            extracted_items: fragments.into_iter().map(ExtractedItem::from).collect(),
            message: Self::SUCCESS_MESSAGE.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extracted_item_from_fragment() {
        let item = ExtractedItem::from(RecognizedFragment::new("MILK", 0.9, 10, 20, 40, 12));
        assert_eq!(item.item_name, "MILK");
        assert_eq!(item.confidence, 0.9);
        assert_eq!((item.left, item.top, item.width, item.height), (10, 20, 40, 12));
    }

    #[test]
    fn test_upload_response_serialization() {
        let response = ReceiptUploadResponse::processed(
            "receipt.png",
            "image/png",
            vec![RecognizedFragment::new("BREAD", 0.95, 1, 2, 3, 4)],
        );

        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["filename"], "receipt.png");
        assert_eq!(json["content_type"], "image/png");
        assert_eq!(json["message"], "Receipt processed successfully.");
        assert_eq!(json["extracted_items"][0]["item_name"], "BREAD");
        assert_eq!(json["extracted_items"][0]["top"], 2);
    }

    #[test]
    fn test_upload_response_empty_items_is_array() {
        let response = ReceiptUploadResponse::processed("x.jpg", "image/jpeg", Vec::new());
        let json = serde_json::to_string(&response).unwrap();
        assert!(json.contains("\"extracted_items\":[]"));
    }
}
