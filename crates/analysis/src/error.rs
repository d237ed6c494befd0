use thiserror::Error;

#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("malformed message: {0}")]
    Json(#[from] serde_json::Error),
    #[error("analysis failed on the server: {0}")]
    Remote(String),
}
