//! # Facial Feature Extraction
//!
//! Derives a few geometric ratios from a face mesh and maps them to a discrete
//! emotion label. Everything here is a pure function of one landmark set.
//!
//! ## Landmarks Used (468-point face mesh indices):
//! - **Cheeks** `234` / `454`: face width
//! - **Forehead** `10`, **chin** `152`: face height
//! - **Mouth corners** `61` / `291`: mouth width and corner height
//! - **Upper / lower lip** `13` / `14`: mouth opening and mouth-center height
//!
//! ## Ratios:
//! - `mouth_open_ratio = mouth_height / max(face_height, EPS)`
//! - `smile_width_ratio = mouth_width / max(face_width, EPS)`
//! - `corner_delta = corner_avg_y - mouth_center_y`
//!
//! Image y grows downward, so a negative `corner_delta` means the corners sit
//! above the mouth center (upturned).
//!
//! ## Decision Order (first match wins):
//! 1. `mouth_open_ratio > open` → Surprised
//! 2. `corner_delta < smile_corner && smile_width_ratio > smile_width` → Smiling
//! 3. `corner_delta > sad` → Sad
//! 4. otherwise → Neutral

use serde::{Deserialize, Serialize};

use crate::inference::Landmark;

pub const CHEEK_LEFT: usize = 234;
pub const CHEEK_RIGHT: usize = 454;
pub const FOREHEAD: usize = 10;
pub const CHIN: usize = 152;
pub const MOUTH_LEFT: usize = 61;
pub const MOUTH_RIGHT: usize = 291;
pub const UPPER_LIP: usize = 13;
pub const LOWER_LIP: usize = 14;

const EPS: f32 = 1e-6;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EmotionThresholds {
    pub open_threshold: f32,
    pub smile_corner_threshold: f32,
    pub smile_width_threshold: f32,
    pub sad_threshold: f32,
}

impl Default for EmotionThresholds {
    fn default() -> Self {
        Self {
            open_threshold: 0.12,
            smile_corner_threshold: -0.005,
            smile_width_threshold: 0.43,
            sad_threshold: 0.01,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EmotionLabel {
    Surprised,
    Smiling,
    Sad,
    Neutral,
    NoFace,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FaceMetrics {
    pub mouth_open_ratio: f32,
    pub smile_width_ratio: f32,
    pub corner_delta: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl From<&Landmark> for Point {
    fn from(lm: &Landmark) -> Self {
        Self { x: lm.x, y: lm.y }
    }
}

/// Line segments the browser draws over the video to show what was measured.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Guides {
    pub face_width: [Point; 2],
    pub face_height: [Point; 2],
    pub mouth_width: [Point; 2],
    pub mouth_height: [Point; 2],
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FaceAnalysis {
    pub metrics: FaceMetrics,
    pub guides: Guides,
    pub label: EmotionLabel,
}

/// Measure one face mesh.
///
/// Returns `None` when the set is too short to contain every index used above
/// (a partial mesh is treated as no face).
pub fn extract(landmarks: &[Landmark]) -> Option<(FaceMetrics, Guides)> {
    let point = |i: usize| landmarks.get(i).map(Point::from);

    let cheek_l = point(CHEEK_LEFT)?;
    let cheek_r = point(CHEEK_RIGHT)?;
    let forehead = point(FOREHEAD)?;
    let chin = point(CHIN)?;
    let mouth_l = point(MOUTH_LEFT)?;
    let mouth_r = point(MOUTH_RIGHT)?;
    let upper = point(UPPER_LIP)?;
    let lower = point(LOWER_LIP)?;

    let face_width = distance(cheek_l, cheek_r);
    let face_height = distance(forehead, chin);
    let mouth_width = distance(mouth_l, mouth_r);
    let mouth_height = distance(upper, lower);

    let mouth_center_y = (upper.y + lower.y) / 2.0;
    let corner_avg_y = (mouth_l.y + mouth_r.y) / 2.0;

    let metrics = FaceMetrics {
        mouth_open_ratio: mouth_height / face_height.max(EPS),
        smile_width_ratio: mouth_width / face_width.max(EPS),
        corner_delta: corner_avg_y - mouth_center_y,
    };

    let guides = Guides {
        face_width: [cheek_l, cheek_r],
        face_height: [forehead, chin],
        mouth_width: [mouth_l, mouth_r],
        mouth_height: [upper, lower],
    };

    Some((metrics, guides))
}

pub fn classify(metrics: &FaceMetrics, thresholds: &EmotionThresholds) -> EmotionLabel {
    if metrics.mouth_open_ratio > thresholds.open_threshold {
        EmotionLabel::Surprised
    } else if metrics.corner_delta < thresholds.smile_corner_threshold
        && metrics.smile_width_ratio > thresholds.smile_width_threshold
    {
        EmotionLabel::Smiling
    } else if metrics.corner_delta > thresholds.sad_threshold {
        EmotionLabel::Sad
    } else {
        EmotionLabel::Neutral
    }
}

pub fn analyze(landmarks: &[Landmark], thresholds: &EmotionThresholds) -> Option<FaceAnalysis> {
    let (metrics, guides) = extract(landmarks)?;
    Some(FaceAnalysis {
        label: classify(&metrics, thresholds),
        metrics,
        guides,
    })
}

fn distance(a: Point, b: Point) -> f32 {
    ((a.x - b.x).powi(2) + (a.y - b.y).powi(2)).sqrt()
}
