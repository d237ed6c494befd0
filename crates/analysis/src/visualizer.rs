use std::time::{Duration, Instant};

use jobs::{JobSpec, JobsHandle, Preloaded};
use scheduler::{PrepareDone, Visualizer};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::actions::{DISPLAY_ANNOTATION_PP, DISPLAY_ANNOTATION_RAW, DISPLAY_FRAME, DISPLAY_RESULT};
use crate::board::{AnalysisBoard, RelatedImage};
use crate::message::{AnalysisResult, Annotation, WebData};

/// Bounded wait on the web matching images before giving up with an empty list.
pub const WEB_IMAGES_TIMEOUT: Duration = Duration::from_secs(10);

/// Frame pictures are stored base 1: frame 0 is `minivid0001.png`.
pub fn frame_source(video_id: &str, frame: u64) -> String { format!("{video_id}/minivid{:04}.png", frame + 1) }

/// Payload handed from a preparator to its executor.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
struct Prepared {
    frame: u64,
    picture: String,
    picture_loaded: bool,
    preload_ms: u64,
    annotation: Option<Annotation>,
    related: Vec<RelatedImage>,
    result: Option<AnalysisResult>,
}

impl Prepared {
    fn finish(self, done: PrepareDone) {
        match serde_json::to_value(&self) {
            Ok(value) => done.done(value),
            Err(e) => {
                tracing::warn!("[analysis] unable to encode {}: {e}", done.step_id());
                done.done(Value::Null);
            }
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct StepData {
    frame: u64,
    annotation: Option<Annotation>,
}

fn related_images(web: &WebData) -> Vec<RelatedImage> {
    web.full_matching_images
        .iter()
        .enumerate()
        .map(|(i, img)| RelatedImage {
            img_url: img.url.clone(),
            page_url: web.pages_with_matching_images.get(i).map(|p| p.url.clone()),
        })
        .collect()
}

/// Capability table of the analysis view: preloads pictures through the jobs runtime
/// and renders executed steps onto an [`AnalysisBoard`].
pub struct AnalysisVisualizer {
    video_id: String,
    jobs: JobsHandle,
    web_timeout: Duration,
    board: AnalysisBoard,
}

impl AnalysisVisualizer {
    pub fn new(video_id: impl Into<String>, jobs: JobsHandle, board: AnalysisBoard) -> Self {
        Self { video_id: video_id.into(), jobs, web_timeout: WEB_IMAGES_TIMEOUT, board }
    }

    pub fn with_web_timeout(mut self, timeout: Duration) -> Self {
        self.web_timeout = timeout;
        self
    }

    pub fn board(&self) -> &AnalysisBoard { &self.board }

    pub fn into_board(self) -> AnalysisBoard { self.board }

    fn parse_step(data: Value, id: &str) -> StepData {
        serde_json::from_value(data).unwrap_or_else(|e| {
            tracing::warn!("[analysis] bad step data for {id}: {e}");
            StepData::default()
        })
    }

    // Preloads the frame picture, then hands over to `then`.
    fn preload_frame<F>(&self, frame: u64, annotation: Option<Annotation>, then: F)
    where
        F: FnOnce(Prepared) + Send + 'static,
    {
        let picture = frame_source(&self.video_id, frame);
        let started = Instant::now();
        let source = picture.clone();
        self.jobs.enqueue(JobSpec::frame(picture), move |res| {
            let picture_loaded = match res {
                Ok(Preloaded { loaded, .. }) => !loaded.is_empty(),
                Err(e) => {
                    tracing::debug!("[analysis] preload of {source} failed: {e}");
                    false
                }
            };
            then(Prepared {
                frame,
                picture: source,
                picture_loaded,
                preload_ms: started.elapsed().as_millis() as u64,
                annotation,
                ..Prepared::default()
            });
        });
    }
}

impl Visualizer for AnalysisVisualizer {
    fn supports(&self, action: &str) -> bool {
        matches!(action, DISPLAY_FRAME | DISPLAY_ANNOTATION_RAW | DISPLAY_ANNOTATION_PP | DISPLAY_RESULT)
    }

    fn prepare(&mut self, action: &str, data: Value, done: PrepareDone) {
        match action {
            DISPLAY_FRAME | DISPLAY_ANNOTATION_PP => {
                let step = Self::parse_step(data, done.step_id());
                self.preload_frame(step.frame, step.annotation, move |prepared| prepared.finish(done));
            }
            DISPLAY_ANNOTATION_RAW => {
                let step = Self::parse_step(data, done.step_id());
                let web = step.annotation.as_ref().and_then(|a| a.web.clone()).unwrap_or_default();
                let jobs = self.jobs.clone();
                let timeout = self.web_timeout;
                self.preload_frame(step.frame, step.annotation, move |mut prepared| {
                    let related = related_images(&web);
                    if related.is_empty() {
                        return prepared.finish(done);
                    }
                    let sources = related.iter().map(|r| r.img_url.clone()).collect();
                    jobs.enqueue(JobSpec::web_images(sources, timeout), move |res| {
                        // Unreachable pictures still count; only a timeout drops the list.
                        match res {
                            Ok(_) => prepared.related = related,
                            Err(e) => tracing::debug!("[analysis] web images for frame {} skipped: {e}", prepared.frame),
                        }
                        prepared.finish(done);
                    });
                });
            }
            DISPLAY_RESULT => {
                let result = serde_json::from_value(data).unwrap_or_else(|e| {
                    tracing::warn!("[analysis] bad aggregation payload: {e}");
                    AnalysisResult::default()
                });
                Prepared { result: Some(result), ..Prepared::default() }.finish(done);
            }
            other => {
                tracing::error!("[analysis] no preparator for {other}");
                done.done(Value::Null);
            }
        }
    }

    fn execute(&mut self, action: &str, prepared: &Value, id: &str) {
        let prepared: Prepared = match Prepared::deserialize(prepared) {
            Ok(p) => p,
            Err(e) => {
                tracing::warn!("[analysis] unable to render {id}: {e}");
                return;
            }
        };
        tracing::debug!("[analysis] executing {action} for {id}");
        let annotation = prepared.annotation.unwrap_or_default();
        match action {
            DISPLAY_FRAME => self.board.show_frame(prepared.frame, &prepared.picture),
            DISPLAY_ANNOTATION_RAW => {
                self.board.show_annotation_raw(prepared.frame, &prepared.picture, &annotation, &prepared.related)
            }
            DISPLAY_ANNOTATION_PP => self.board.show_annotation_pp(prepared.frame, &prepared.picture, &annotation),
            DISPLAY_RESULT => self.board.show_result(prepared.result.unwrap_or_default()),
            _ => {}
        }
    }

    fn notify_overtime(&mut self, overtime: Option<Duration>) { self.board.set_overtime(overtime); }

    fn on_reset(&mut self) { self.board.reset(); }
}
