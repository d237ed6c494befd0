use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::AnalysisError;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataType {
    Init,
    Frame,
    AnnotationRaw,
    /// Post-processed annotation.
    Annotation,
    Aggregation,
    #[default]
    #[serde(other)]
    Other,
}

/// Progress message pushed by the analysis socket.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisMessage {
    pub error: Option<String>,
    pub data_type: DataType,
    pub frame_number: u64,
    pub data: Value,
    /// Frames extracted so far.
    pub nb_frames: u64,
    /// True once every frame has been extracted.
    pub generation_complete: bool,
    pub file: Option<String>,
    pub step: Option<String>,
    pub duration: Option<f64>,
    pub finished: bool,
}

impl AnalysisMessage {
    pub fn parse(line: &str) -> Result<Self, AnalysisError> { Ok(serde_json::from_str(line)?) }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Vertex {
    pub x: f64,
    pub y: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Landmark {
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub position: Vertex,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Face {
    pub landmarks: Vec<Landmark>,
    pub bounding_poly: Vec<Vertex>,
    pub detection_confidence: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Crop {
    pub bounding_poly: Vec<Vertex>,
    pub confidence: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Label {
    pub description: String,
    pub score: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WebLink {
    pub url: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WebData {
    pub full_matching_images: Vec<WebLink>,
    pub pages_with_matching_images: Vec<WebLink>,
}

/// Per-frame annotation. Raw and post-processed annotations share this shape;
/// only post-processed ones carry `faceRatio`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Annotation {
    pub name: String,
    #[serde(alias = "faces")]
    pub face: Option<Vec<Face>>,
    pub crop: Option<Vec<Crop>>,
    pub labels: Option<Vec<Label>>,
    pub web: Option<WebData>,
    #[serde(rename = "faceRatio")]
    pub face_ratio: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AnalysisResult {
    pub average_face_ratio: f64,
    /// Number of frames holding a face.
    pub face_time: f64,
    /// Percentage of frames holding a face.
    pub face_time_prop: f64,
    pub nb_frames: Option<u64>,
    pub duration: Option<f64>,
}
