pub mod normalize;
pub mod pipeline;
pub mod table;

pub use normalize::{confidence_percent, normalize_detections};
pub use pipeline::{
    DetectError, DetectReply, DetectTicket, DetectionSession, SelectedImage, detect_selected,
    request_detection,
};
pub use table::{Aggregates, CONFIDENT_THRESHOLD, ResultTable};
