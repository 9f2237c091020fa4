//! OCR word model and multi-engine merging.
//!
//! Words come from external OCR engines as JSON records; this module only
//! reconciles and renders them.

mod merger;

pub use merger::{boxes_overlap, MergeResult, MergeStrategy, OcrMerger, OVERLAP_THRESHOLD};

use serde::{Deserialize, Deserializer, Serialize};

/// Axis-aligned bounding box in pixel coordinates (x1, y1, x2, y2).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "[f32; 4]", into = "[f32; 4]")]
pub struct BoundingBox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
}

impl BoundingBox {
    pub fn new(x1: f32, y1: f32, x2: f32, y2: f32) -> Self {
        Self { x1, y1, x2, y2 }
    }

    /// Area of the box; non-positive for degenerate boxes.
    pub fn area(&self) -> f32 {
        (self.x2 - self.x1) * (self.y2 - self.y1)
    }

    /// Vertical midpoint.
    pub fn y_mid(&self) -> f32 {
        (self.y1 + self.y2) / 2.0
    }

    /// Area shared with `other`, or `None` when the boxes do not intersect.
    pub fn intersection_area(&self, other: &BoundingBox) -> Option<f32> {
        let x_left = self.x1.max(other.x1);
        let y_top = self.y1.max(other.y1);
        let x_right = self.x2.min(other.x2);
        let y_bottom = self.y2.min(other.y2);

        if x_right < x_left || y_bottom < y_top {
            return None;
        }

        Some((x_right - x_left) * (y_bottom - y_top))
    }

    /// Intersection area divided by the smaller of the two box areas.
    ///
    /// Returns 0.0 when the boxes do not intersect or either box has a
    /// non-positive area.
    pub fn overlap_ratio(&self, other: &BoundingBox) -> f32 {
        let Some(intersection) = self.intersection_area(other) else {
            return 0.0;
        };

        let (area1, area2) = (self.area(), other.area());
        if area1 <= 0.0 || area2 <= 0.0 {
            return 0.0;
        }

        intersection / area1.min(area2)
    }
}

impl From<[f32; 4]> for BoundingBox {
    fn from(c: [f32; 4]) -> Self {
        Self::new(c[0], c[1], c[2], c[3])
    }
}

impl From<BoundingBox> for [f32; 4] {
    fn from(b: BoundingBox) -> Self {
        [b.x1, b.y1, b.x2, b.y2]
    }
}

/// A single OCR-recognized token.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OcrWord {
    /// Recognized text.
    pub text: String,

    /// Recognition confidence (0.0 - 1.0).
    #[serde(
        rename = "conf",
        alias = "confidence",
        default,
        deserialize_with = "clamped_confidence"
    )]
    pub confidence: f32,

    /// Bounding box; `None` when the engine reported fewer than 4 coordinates.
    #[serde(
        rename = "box",
        default,
        deserialize_with = "lenient_box",
        skip_serializing_if = "Option::is_none"
    )]
    pub bbox: Option<BoundingBox>,

    /// Zero-based page index.
    #[serde(default)]
    pub page: u32,
}

impl OcrWord {
    /// Create a word with a bounding box. Confidence is clamped to [0, 1].
    pub fn new(text: impl Into<String>, confidence: f32, bbox: [f32; 4], page: u32) -> Self {
        Self {
            text: text.into(),
            confidence: clamp_confidence(confidence),
            bbox: Some(bbox.into()),
            page,
        }
    }

    /// Create a word whose position is unknown.
    pub fn without_box(text: impl Into<String>, confidence: f32, page: u32) -> Self {
        Self {
            text: text.into(),
            confidence: clamp_confidence(confidence),
            bbox: None,
            page,
        }
    }
}

fn clamp_confidence(confidence: f32) -> f32 {
    if confidence.is_nan() {
        0.0
    } else {
        confidence.clamp(0.0, 1.0)
    }
}

fn clamped_confidence<'de, D>(deserializer: D) -> Result<f32, D::Error>
where
    D: Deserializer<'de>,
{
    let confidence = f32::deserialize(deserializer)?;
    Ok(clamp_confidence(confidence))
}

fn lenient_box<'de, D>(deserializer: D) -> Result<Option<BoundingBox>, D::Error>
where
    D: Deserializer<'de>,
{
    let coords: Option<Vec<f32>> = Option::deserialize(deserializer)?;
    Ok(coords
        .filter(|c| c.len() >= 4)
        .map(|c| BoundingBox::new(c[0], c[1], c[2], c[3])))
}

/// Mean confidence of a word list, 0.0 when empty.
pub fn mean_confidence(words: &[OcrWord]) -> f32 {
    if words.is_empty() {
        return 0.0;
    }
    words.iter().map(|w| w.confidence).sum::<f32>() / words.len() as f32
}

/// Render a word list as a plain-text transcript.
///
/// Pages are separated by newlines. Within a page a new text line starts
/// whenever a word's vertical midpoint moves at least `line_tolerance`
/// pixels away from the midpoint of the current line; words without a box
/// stay on the current line.
pub fn words_to_text(words: &[OcrWord], line_tolerance: f32) -> String {
    let mut text = String::new();
    let mut current_page: Option<u32> = None;
    let mut current_y: Option<f32> = None;

    for word in words {
        let token = word.text.trim();
        if token.is_empty() {
            continue;
        }
        let y = word.bbox.map(|b| b.y_mid());

        match current_page {
            None => current_y = y,
            Some(page) if page != word.page => {
                text.push('\n');
                current_y = y;
            }
            Some(_) => match (current_y, y) {
                (Some(line_y), Some(y)) if (y - line_y).abs() >= line_tolerance => {
                    text.push('\n');
                    current_y = Some(y);
                }
                (None, Some(y)) => {
                    text.push(' ');
                    current_y = Some(y);
                }
                _ => text.push(' '),
            },
        }

        current_page = Some(word.page);
        text.push_str(token);
    }

    text
}
