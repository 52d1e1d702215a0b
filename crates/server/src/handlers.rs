//! HTTP handlers for the receipt OCR API

use axum::{
    body::Bytes,
    extract::{multipart::MultipartError, Multipart, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use core_pipeline::ReceiptUploadResponse;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tracing::{error, info, warn, Span};

use crate::AppState;

/// Upload content types the OCR endpoint accepts
pub const ACCEPTED_CONTENT_TYPES: &[&str] = &["image/jpeg", "image/png"];

/// Multipart field carrying the receipt image
pub const FILE_FIELD: &str = "file";

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Field required: file")]
    MissingFile,
    #[error("Invalid file type. Only JPEG and PNG are supported.")]
    UnsupportedMediaType(String),
    #[error("Malformed upload: {0}")]
    Multipart(#[from] MultipartError),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::MissingFile => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::UnsupportedMediaType(_) => StatusCode::BAD_REQUEST,
            ApiError::Multipart(err) => err.status(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorResponse {
            detail: self.to_string(),
        };
        (self.status(), Json(body)).into_response()
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub detail: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    fn new(message: &str) -> Json<Self> {
        Json(Self {
            message: message.to_string(),
        })
    }
}

struct Upload {
    filename: String,
    content_type: String,
    data: Bytes,
}

pub fn is_accepted_content_type(content_type: &str) -> bool {
    ACCEPTED_CONTENT_TYPES.contains(&content_type)
}

pub async fn root() -> Json<MessageResponse> {
    MessageResponse::new("Welcome to the PantryPal API!")
}

pub async fn ping() -> Json<MessageResponse> {
    info!("ping endpoint accessed");
    MessageResponse::new("Pong! PantryPal backend is live!")
}

pub async fn health_check() -> &'static str {
    "OK"
}

/// POST /ocr/parse-receipt - extract line items from a receipt photo
///
/// Accepts a multipart upload with a JPEG or PNG `file` field. The OCR
/// pipeline runs on the blocking pool; pipeline failures produce an empty
/// item list rather than an error status.
#[tracing::instrument(skip_all, fields(request_id = %uuid::Uuid::new_v4()))]
pub async fn parse_receipt(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<ReceiptUploadResponse>, ApiError> {
    let upload = read_upload(&mut multipart).await.map_err(|err| {
        warn!(error = %err, "rejected receipt upload");
        err
    })?;
    info!(
        filename = %upload.filename,
        content_type = %upload.content_type,
        bytes = upload.data.len(),
        "received receipt"
    );

    let pipeline = Arc::clone(&state.pipeline);
    let data = upload.data;
    let span = Span::current();
    let fragments =
        match tokio::task::spawn_blocking(move || span.in_scope(|| pipeline.run(&data))).await {
            Ok(fragments) => fragments,
            Err(err) => {
                error!(error = %err, "receipt worker did not complete");
                Vec::new()
            }
        };

    info!(
        filename = %upload.filename,
        items = fragments.len(),
        "OCR completed"
    );
    Ok(Json(ReceiptUploadResponse::processed(
        upload.filename,
        upload.content_type,
        fragments,
    )))
}

/// Find the `file` field, checking its content type before reading the body
async fn read_upload(multipart: &mut Multipart) -> Result<Upload, ApiError> {
    while let Some(field) = multipart.next_field().await? {
        if field.name() != Some(FILE_FIELD) {
            continue;
        }

        let filename = field.file_name().unwrap_or_default().to_string();
        let content_type = field.content_type().unwrap_or_default().to_string();
        if !is_accepted_content_type(&content_type) {
            return Err(ApiError::UnsupportedMediaType(content_type));
        }

        let data = field.bytes().await?;
        return Ok(Upload {
            filename,
            content_type,
            data,
        });
    }

    Err(ApiError::MissingFile)
}
