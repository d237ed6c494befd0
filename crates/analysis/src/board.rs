use std::collections::{HashMap, HashSet};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::message::{AnalysisResult, Annotation, Crop, Face, Label, Vertex};

pub const CANVAS_WIDTH: f64 = 800.0;
pub const CANVAS_HEIGHT: f64 = 450.0;
pub const FACE_MARGIN: f64 = 3.0;
/// Crops closer than this to every canvas edge cover the whole frame and are not drawn.
pub const CROP_TOLERANCE: f64 = 30.0;
pub const RELATED_PER_STEP: usize = 3;
pub const MAX_RELATED: usize = 200;
pub const DEFAULT_TAGS_LIMIT: usize = 30;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub w: f64,
    pub h: f64,
}

impl Rect {
    fn between(a: Vertex, b: Vertex, margin: f64) -> Self {
        Self { x: a.x - margin, y: a.y - margin, w: b.x - a.x + 2.0 * margin, h: b.y - a.y + 2.0 * margin }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Overlay {
    Landmark(Vertex),
    /// Box around every landmark of a face.
    LandmarkBounds(Rect),
    FaceBounds(Rect),
    Crop(Rect),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct LabelTally {
    pub count: u32,
    /// Sum of the scores of every occurrence.
    pub confidence: f64,
}

impl LabelTally {
    pub fn average(&self) -> f64 {
        if self.count == 0 { 0.0 } else { self.confidence / self.count as f64 }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelatedImage {
    pub img_url: String,
    pub page_url: Option<String>,
}

/// Serializable snapshot printed at the end of a replay.
#[derive(Debug, Clone, Serialize)]
pub struct BoardSummary {
    pub executed: usize,
    pub last_picture: Option<String>,
    pub tags: Vec<(String, LabelTally)>,
    pub face_ratios: Vec<f64>,
    pub detection_confidence: Vec<f64>,
    pub related: Vec<RelatedImage>,
    pub result: Option<AnalysisResult>,
    pub overtime_ms: Option<u64>,
}

/// State of the analysis view, updated by the step executors.
#[derive(Debug, Clone)]
pub struct AnalysisBoard {
    picture: Option<String>,
    details: String,
    overlays: Vec<Overlay>,
    labels: HashMap<String, LabelTally>,
    tags_limit: usize,
    face_ratios: Vec<f64>,
    detection_confidence: Vec<f64>,
    related: Vec<RelatedImage>,
    referenced_pages: HashSet<String>,
    result: Option<AnalysisResult>,
    overtime: Option<Duration>,
    executed: usize,
}

impl Default for AnalysisBoard {
    fn default() -> Self { Self::new(DEFAULT_TAGS_LIMIT) }
}

fn truncate4(value: f64) -> f64 { (value * 10_000.0).trunc() / 10_000.0 }

impl AnalysisBoard {
    pub fn new(tags_limit: usize) -> Self {
        Self {
            picture: None,
            details: String::new(),
            overlays: Vec::new(),
            labels: HashMap::new(),
            tags_limit,
            face_ratios: Vec::new(),
            detection_confidence: Vec::new(),
            related: Vec::new(),
            referenced_pages: HashSet::new(),
            result: None,
            overtime: None,
            executed: 0,
        }
    }

    /// Clears every accumulated series. The tags limit is kept.
    pub fn reset(&mut self) { *self = Self::new(self.tags_limit); }

    pub fn show_frame(&mut self, frame: u64, picture: &str) {
        self.begin(picture);
        self.details = format!("Executing action: displayFrame, frame#{frame}");
    }

    pub fn show_annotation_raw(&mut self, frame: u64, picture: &str, annotation: &Annotation, related: &[RelatedImage]) {
        self.begin(picture);
        self.details = format!("Executing action: displayAnnotationRaw, frame#{frame} for file:{}", annotation.name);
        if let Some(faces) = &annotation.face {
            faces.iter().for_each(|f| self.draw_face(f));
            let confidence = if faces.is_empty() {
                0.0
            } else {
                faces.iter().map(|f| f.detection_confidence).sum::<f64>() / faces.len() as f64
            };
            self.detection_confidence.push(truncate4(confidence));
        }
        if let Some(crops) = &annotation.crop {
            crops.iter().for_each(|c| self.draw_crop(c));
        }
        if let Some(labels) = &annotation.labels {
            self.tally(labels);
        }
        self.add_related(related);
    }

    pub fn show_annotation_pp(&mut self, frame: u64, picture: &str, annotation: &Annotation) {
        self.begin(picture);
        self.details = format!("Executing action: displayAnnotationPP, frame#{frame}, file:{}", annotation.name);
        if let Some(faces) = &annotation.face {
            faces.iter().for_each(|f| self.draw_face(f));
        }
        if let Some(crops) = &annotation.crop {
            crops.iter().for_each(|c| self.draw_crop(c));
        }
        self.face_ratios.push(truncate4(annotation.face_ratio.unwrap_or(0.0)));
    }

    pub fn show_result(&mut self, result: AnalysisResult) {
        self.executed += 1;
        self.details = "Executing action: displayResult".to_string();
        self.result = Some(result);
    }

    pub fn set_overtime(&mut self, overtime: Option<Duration>) { self.overtime = overtime; }

    fn begin(&mut self, picture: &str) {
        self.executed += 1;
        self.overlays.clear();
        self.picture = Some(picture.to_string());
    }

    fn draw_face(&mut self, face: &Face) {
        let mut bounds: Option<(Vertex, Vertex)> = None;
        for landmark in &face.landmarks {
            let p = landmark.position;
            self.overlays.push(Overlay::Landmark(p));
            bounds = Some(match bounds {
                None => (p, p),
                Some((lo, hi)) => (Vertex { x: lo.x.min(p.x), y: lo.y.min(p.y) }, Vertex { x: hi.x.max(p.x), y: hi.y.max(p.y) }),
            });
        }
        if let Some((lo, hi)) = bounds {
            self.overlays.push(Overlay::LandmarkBounds(Rect::between(lo, hi, FACE_MARGIN)));
        }
        if let (Some(a), Some(b)) = (face.bounding_poly.first(), face.bounding_poly.get(2)) {
            self.overlays.push(Overlay::FaceBounds(Rect::between(*a, *b, FACE_MARGIN)));
        }
    }

    fn draw_crop(&mut self, crop: &Crop) {
        let (Some(a), Some(b)) = (crop.bounding_poly.first(), crop.bounding_poly.get(2)) else { return };
        let whole_canvas = a.x <= CROP_TOLERANCE
            && a.y <= CROP_TOLERANCE
            && b.x >= CANVAS_WIDTH - CROP_TOLERANCE
            && b.y >= CANVAS_HEIGHT - CROP_TOLERANCE;
        if !whole_canvas {
            self.overlays.push(Overlay::Crop(Rect::between(*a, *b, 0.0)));
        }
    }

    fn tally(&mut self, labels: &[Label]) {
        for label in labels {
            let entry = self.labels.entry(label.description.clone()).or_default();
            entry.count += 1;
            entry.confidence += label.score;
        }
    }

    fn add_related(&mut self, related: &[RelatedImage]) {
        if self.related.len() >= MAX_RELATED {
            return;
        }
        for image in related.iter().take(RELATED_PER_STEP) {
            let Some(page) = &image.page_url else { continue };
            if self.referenced_pages.insert(page.clone()) {
                self.related.push(image.clone());
            }
        }
    }

    pub fn picture(&self) -> Option<&str> { self.picture.as_deref() }
    pub fn details(&self) -> &str { &self.details }
    pub fn overlays(&self) -> &[Overlay] { &self.overlays }
    pub fn face_ratios(&self) -> &[f64] { &self.face_ratios }
    pub fn detection_confidence(&self) -> &[f64] { &self.detection_confidence }
    pub fn related(&self) -> &[RelatedImage] { &self.related }
    pub fn result(&self) -> Option<&AnalysisResult> { self.result.as_ref() }
    pub fn overtime(&self) -> Option<Duration> { self.overtime }
    pub fn executed(&self) -> usize { self.executed }

    /// Labels ranked by summed confidence, at most `tags_limit` of them.
    pub fn tags(&self) -> Vec<(String, LabelTally)> {
        let mut tags: Vec<(String, LabelTally)> = self.labels.iter().map(|(k, v)| (k.clone(), *v)).collect();
        tags.sort_by(|a, b| b.1.confidence.total_cmp(&a.1.confidence).then_with(|| a.0.cmp(&b.0)));
        tags.truncate(self.tags_limit);
        tags
    }

    pub fn summary(&self) -> BoardSummary {
        BoardSummary {
            executed: self.executed,
            last_picture: self.picture.clone(),
            tags: self.tags(),
            face_ratios: self.face_ratios.clone(),
            detection_confidence: self.detection_confidence.clone(),
            related: self.related.clone(),
            result: self.result.clone(),
            overtime_ms: self.overtime.map(|d| d.as_millis() as u64),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::Landmark;

    fn v(x: f64, y: f64) -> Vertex { Vertex { x, y } }

    fn label(description: &str, score: f64) -> Label { Label { description: description.into(), score } }

    #[test]
    fn test_face_overlays() {
        let mut board = AnalysisBoard::default();
        let face = Face {
            landmarks: vec![
                Landmark { kind: None, position: v(10.0, 20.0) },
                Landmark { kind: None, position: v(30.0, 5.0) },
            ],
            bounding_poly: vec![v(0.0, 0.0), v(50.0, 0.0), v(50.0, 60.0), v(0.0, 60.0)],
            detection_confidence: 0.87654,
        };
        let annotation = Annotation { face: Some(vec![face]), ..Annotation::default() };
        board.show_annotation_raw(0, "v/minivid0001.png", &annotation, &[]);
        let overlays = board.overlays();
        assert_eq!(overlays.len(), 4);
        assert_eq!(overlays[2], Overlay::LandmarkBounds(Rect { x: 7.0, y: 2.0, w: 26.0, h: 21.0 }));
        assert_eq!(overlays[3], Overlay::FaceBounds(Rect { x: -3.0, y: -3.0, w: 56.0, h: 66.0 }));
        assert_eq!(board.detection_confidence(), [0.8765]);
    }

    #[test]
    fn test_full_canvas_crop_is_skipped() {
        let mut board = AnalysisBoard::default();
        let full = Crop { bounding_poly: vec![v(0.0, 0.0), v(800.0, 0.0), v(799.0, 449.0), v(0.0, 450.0)], confidence: None };
        let partial = Crop { bounding_poly: vec![v(100.0, 0.0), v(700.0, 0.0), v(700.0, 450.0), v(100.0, 450.0)], confidence: None };
        let annotation = Annotation { crop: Some(vec![full, partial]), ..Annotation::default() };
        board.show_annotation_pp(3, "p", &annotation);
        assert_eq!(board.overlays(), [Overlay::Crop(Rect { x: 100.0, y: 0.0, w: 600.0, h: 450.0 })]);
        assert_eq!(board.face_ratios(), [0.0]);
    }

    #[test]
    fn test_tags_ranked_and_limited() {
        let mut board = AnalysisBoard::new(2);
        let first = Annotation { labels: Some(vec![label("person", 0.9), label("car", 0.5), label("tree", 0.4)]), ..Annotation::default() };
        let second = Annotation { labels: Some(vec![label("car", 0.6), label("tree", 0.3)]), ..Annotation::default() };
        board.show_annotation_raw(0, "p", &first, &[]);
        board.show_annotation_raw(1, "p", &second, &[]);
        let tags = board.tags();
        assert_eq!(tags.len(), 2);
        assert_eq!(tags[0].0, "car");
        assert_eq!(tags[0].1.count, 2);
        assert!((tags[0].1.average() - 0.55).abs() < 1e-9);
        assert_eq!(tags[1].0, "person");
        // no faces key: no confidence sample
        assert!(board.detection_confidence().is_empty());
    }

    #[test]
    fn test_related_images_unique_and_capped_per_step() {
        let mut board = AnalysisBoard::default();
        let img = |i: usize, page: Option<&str>| RelatedImage { img_url: format!("img{i}"), page_url: page.map(str::to_string) };
        let related = vec![img(0, Some("a")), img(1, None), img(2, Some("a")), img(3, Some("b"))];
        board.show_annotation_raw(0, "p", &Annotation::default(), &related);
        assert_eq!(board.related().len(), 1);
        board.show_annotation_raw(1, "p", &Annotation::default(), &[img(4, Some("b")), img(5, Some("a"))]);
        let pages: Vec<_> = board.related().iter().filter_map(|r| r.page_url.as_deref()).collect();
        assert_eq!(pages, ["a", "b"]);
    }

    #[test]
    fn test_reset_keeps_tags_limit() {
        let mut board = AnalysisBoard::new(5);
        board.show_frame(1, "p");
        board.set_overtime(Some(Duration::from_millis(20)));
        board.reset();
        assert_eq!(board.executed(), 0);
        assert_eq!(board.overtime(), None);
        assert_eq!(board.summary().tags.len(), 0);
        assert_eq!(board.tags_limit, 5);
    }
}
