use super::normalize::normalize_detections;
use super::table::ResultTable;
use crate::auth::messages::failure_message;
use crate::decode::{DecodeError, decode_reply};
use crate::transport::{ImageUpload, Transport, TransportError};
use serde_json::Value;
use shared::{DetectionRecord, SortKey, SortState};
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

pub const DETECT_PATH: &str = "/api/detect/";
pub const IMAGE_FIELD: &str = "image";

#[derive(Debug, Error)]
pub enum DetectError {
    #[error("Please upload an image before running detection.")]
    NoImageSelected,
    #[error("Skipped non-image file: {file_name} ({mime_type})")]
    NotAnImage { file_name: String, mime_type: String },
    #[error("Detection is already running for the selected image.")]
    AlreadyDetecting,
    #[error(transparent)]
    Decode(#[from] DecodeError),
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("{message}")]
    Application { status: u16, message: String },
}

#[derive(Debug, Clone)]
pub struct SelectedImage {
    pub id: Uuid,
    pub file_name: String,
    pub mime_type: String,
    pub bytes: Arc<Vec<u8>>,
}

/// Proof that a detect call was started for a particular selection.
#[derive(Debug, Clone)]
pub struct DetectTicket {
    generation: u64,
    image: SelectedImage,
}

impl DetectTicket {
    pub fn image(&self) -> &SelectedImage {
        &self.image
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DetectReply {
    pub detections: Option<Vec<DetectionRecord>>,
    pub annotated_image: Option<String>,
    pub output_image: Option<String>,
    pub detector_log: Option<String>,
}

impl DetectReply {
    pub fn from_body(body: &Value) -> Self {
        let text = |field: &str| body.get(field).and_then(Value::as_str).map(str::to_owned);

        Self {
            detections: body
                .get("detections")
                .and_then(Value::as_array)
                .map(|entries| normalize_detections(entries)),
            annotated_image: text("annotated_image").map(|raw| annotated_image_source(&raw)),
            output_image: text("output_image"),
            detector_log: text("yolo_log"),
        }
    }
}

/// Data URIs and absolute URLs pass through, anything else is bare base64 PNG.
pub fn annotated_image_source(raw: &str) -> String {
    if raw.starts_with("data:") || raw.starts_with("http") {
        raw.to_string()
    } else {
        format!("data:image/png;base64,{}", raw)
    }
}

pub async fn request_detection<T: Transport>(
    transport: &T,
    ticket: &DetectTicket,
) -> Result<DetectReply, DetectError> {
    let image = ticket.image();
    let upload = ImageUpload {
        field: IMAGE_FIELD,
        file_name: image.file_name.clone(),
        mime_type: image.mime_type.clone(),
        bytes: image.bytes.as_ref().clone(),
    };

    let reply = transport.post_image(DETECT_PATH, upload).await?;
    let body = decode_reply(&reply)?;

    if !reply.is_success() {
        return Err(DetectError::Application {
            status: reply.status,
            message: failure_message(&body, "Failed to run detection. Please try again."),
        });
    }

    Ok(DetectReply::from_body(&body))
}

#[derive(Debug, Default)]
pub struct DetectionSession {
    image: Option<SelectedImage>,
    generation: u64,
    in_flight: Option<u64>,
    table: ResultTable,
    annotated_image: Option<String>,
    annotated_failed: bool,
    output_image: Option<String>,
    detector_log: Option<String>,
    error: Option<String>,
}

impl DetectionSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn select_image(
        &mut self,
        file_name: impl Into<String>,
        mime_type: impl Into<String>,
        bytes: Vec<u8>,
    ) -> Result<&SelectedImage, DetectError> {
        let file_name = file_name.into();
        let mime_type = mime_type.into();

        if !mime_type.starts_with("image/") {
            log::warn!("Skipping non-image file: {}", file_name);
            return Err(DetectError::NotAnImage {
                file_name,
                mime_type,
            });
        }

        self.generation += 1;
        self.reset_results();
        let image = self.image.insert(SelectedImage {
            id: Uuid::new_v4(),
            file_name,
            mime_type,
            bytes: Arc::new(bytes),
        });
        log::info!(
            "Selected image {} ({}, {} bytes)",
            image.file_name,
            image.id,
            image.bytes.len()
        );
        Ok(image)
    }

    pub fn remove_image(&mut self) {
        if let Some(image) = self.image.take() {
            log::info!("Removed image {}", image.file_name);
        }
        self.generation += 1;
        self.reset_results();
    }

    pub fn begin_detect(&mut self) -> Result<DetectTicket, DetectError> {
        let Some(image) = self.image.clone() else {
            self.error = Some(DetectError::NoImageSelected.to_string());
            return Err(DetectError::NoImageSelected);
        };
        if self.is_detecting() {
            return Err(DetectError::AlreadyDetecting);
        }

        self.error = None;
        self.in_flight = Some(self.generation);
        Ok(DetectTicket {
            generation: self.generation,
            image,
        })
    }

    /// Applies a finished detect call. Returns false, changing nothing, when
    /// the image it was started for has since been replaced or removed.
    pub fn apply_reply(
        &mut self,
        ticket: &DetectTicket,
        result: Result<DetectReply, DetectError>,
    ) -> bool {
        if !self.is_current(ticket) {
            log::info!(
                "Discarding detection result for {} (selection changed)",
                ticket.image.file_name
            );
            return false;
        }
        self.in_flight = None;

        match result {
            Ok(reply) => {
                if let Some(records) = reply.detections {
                    log::info!("Received {} detections", records.len());
                    self.table.replace(records);
                }
                if let Some(annotated) = reply.annotated_image {
                    self.annotated_image = Some(annotated);
                    self.annotated_failed = false;
                }
                if let Some(output) = reply.output_image {
                    self.output_image = Some(output);
                }
                if let Some(log_output) = reply.detector_log {
                    self.detector_log = Some(log_output);
                }
            }
            Err(err) => {
                log::error!("Detection failed: {}", err);
                self.error = Some(err.to_string());
            }
        }
        true
    }

    pub fn is_current(&self, ticket: &DetectTicket) -> bool {
        ticket.generation == self.generation && self.image.is_some()
    }

    pub fn is_detecting(&self) -> bool {
        self.in_flight == Some(self.generation)
    }

    pub fn image(&self) -> Option<&SelectedImage> {
        self.image.as_ref()
    }

    pub fn table(&self) -> &ResultTable {
        &self.table
    }

    pub fn select_sort(&mut self, key: SortKey) -> SortState {
        self.table.select_sort(key)
    }

    pub fn set_sort(&mut self, sort: SortState) {
        self.table.set_sort(sort);
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn detector_log(&self) -> Option<&str> {
        self.detector_log.as_deref()
    }

    pub fn mark_annotated_failed(&mut self) {
        log::warn!("Annotated image failed to load, falling back to output image");
        self.annotated_failed = true;
    }

    pub fn image_source(&self) -> Option<&str> {
        match (&self.annotated_image, self.annotated_failed) {
            (Some(annotated), false) => Some(annotated),
            _ => self.output_image.as_deref(),
        }
    }

    fn reset_results(&mut self) {
        self.in_flight = None;
        self.table.clear();
        self.annotated_image = None;
        self.annotated_failed = false;
        self.output_image = None;
        self.detector_log = None;
        self.error = None;
    }
}

/// Runs one detect call for the current selection and applies it.
pub async fn detect_selected<T: Transport>(
    session: &mut DetectionSession,
    transport: &T,
) -> Result<bool, DetectError> {
    let ticket = session.begin_detect()?;
    let result = request_detection(transport, &ticket).await;
    Ok(session.apply_reply(&ticket, result))
}
