use scheduler::PlayerHandle;
use serde_json::{json, Value};

use crate::message::{AnalysisMessage, DataType};
use crate::{actions, AnalysisError};

/// One `schedule_next_step` call worth of arguments.
#[derive(Debug, Clone, PartialEq)]
pub struct StepRequest {
    pub id: String,
    pub action: &'static str,
    pub data: Value,
}

impl StepRequest {
    pub fn send_to(self, player: &PlayerHandle) { player.schedule(self.id, self.action, self.data); }
}

/// Turns analysis progress messages into steps, in playback order.
///
/// Frames are scheduled as soon as they are extracted. Annotations and the final result
/// are only scheduled once extraction is complete, so they always play after every frame.
#[derive(Debug, Default)]
pub struct Feed {
    next_frame: u64,
    finished: bool,
}

impl Feed {
    pub fn new() -> Self { Self::default() }

    /// First frame that has not been scheduled yet.
    pub fn next_frame(&self) -> u64 { self.next_frame }

    /// Whether the server reported the end of the analysis.
    pub fn finished(&self) -> bool { self.finished }

    pub fn plan(&mut self, msg: AnalysisMessage) -> Result<Vec<StepRequest>, AnalysisError> {
        if let Some(error) = msg.error {
            tracing::error!("[analysis] server error: {error}");
            return Err(AnalysisError::Remote(error));
        }
        self.finished |= msg.finished;

        let mut steps = Vec::new();
        if self.next_frame < msg.nb_frames {
            for frame in self.next_frame..=msg.nb_frames {
                steps.push(StepRequest {
                    id: format!("display-frame-{frame}"),
                    action: actions::DISPLAY_FRAME,
                    data: json!({ "frame": frame }),
                });
            }
            self.next_frame = msg.nb_frames + 1;
        }
        if !msg.generation_complete {
            // More frames may still be extracted.
            return Ok(steps);
        }

        let frame = msg.frame_number;
        match msg.data_type {
            DataType::AnnotationRaw => steps.push(StepRequest {
                id: format!("display-annotation-{frame}"),
                action: actions::DISPLAY_ANNOTATION_RAW,
                data: json!({ "frame": frame, "annotation": msg.data }),
            }),
            DataType::Annotation => steps.push(StepRequest {
                id: format!("display-annotation-pp-{frame}"),
                action: actions::DISPLAY_ANNOTATION_PP,
                data: json!({ "frame": frame, "annotation": msg.data }),
            }),
            DataType::Aggregation => steps.push(StepRequest {
                id: "display-result".to_string(),
                action: actions::DISPLAY_RESULT,
                data: msg.data,
            }),
            DataType::Init | DataType::Frame | DataType::Other => {}
        }
        Ok(steps)
    }
}
