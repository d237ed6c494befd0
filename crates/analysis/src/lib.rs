//! Video-analysis view: turns the analysis progress stream into scheduled steps and
//! renders them onto a board.

pub mod board;
mod error;
pub mod feed;
pub mod message;
pub mod visualizer;

pub use board::{AnalysisBoard, BoardSummary, LabelTally, Overlay, Rect, RelatedImage};
pub use error::AnalysisError;
pub use feed::{Feed, StepRequest};
pub use message::{AnalysisMessage, AnalysisResult, Annotation, DataType};
pub use visualizer::{frame_source, AnalysisVisualizer, WEB_IMAGES_TIMEOUT};

pub mod actions {
    pub const DISPLAY_FRAME: &str = "display_frame";
    pub const DISPLAY_ANNOTATION_RAW: &str = "display_annotation_raw";
    pub const DISPLAY_ANNOTATION_PP: &str = "display_annotation_pp";
    pub const DISPLAY_RESULT: &str = "display_result";
}
