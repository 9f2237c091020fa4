//! Confidence-based merging of a primary and a fallback OCR pass.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::{mean_confidence, BoundingBox, OcrWord};

/// Minimum overlap ratio for two word boxes to be treated as the same word.
pub const OVERLAP_THRESHOLD: f32 = 0.3;

/// Height of the vertical buckets used to group words into lines.
const LINE_BUCKET_PX: f32 = 10.0;

/// Policy used to reconcile two OCR passes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergeStrategy {
    /// Keep whichever full pass has the higher mean confidence.
    #[default]
    HighestConfidence,
    /// Pick the better pass per visual line.
    LineByLine,
    /// Replace individual words by overlapping fallback words.
    WordByWord,
}

impl MergeStrategy {
    /// Parse a configured strategy name.
    ///
    /// Unknown names fall back to [`MergeStrategy::HighestConfidence`].
    pub fn from_name(name: &str) -> Self {
        match name.trim().to_lowercase().as_str() {
            "highest_confidence" => MergeStrategy::HighestConfidence,
            "line_by_line" => MergeStrategy::LineByLine,
            "word_by_word" => MergeStrategy::WordByWord,
            other => {
                warn!("Unknown merge strategy '{}', using highest_confidence", other);
                MergeStrategy::HighestConfidence
            }
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MergeStrategy::HighestConfidence => "highest_confidence",
            MergeStrategy::LineByLine => "line_by_line",
            MergeStrategy::WordByWord => "word_by_word",
        }
    }
}

/// Merged word list together with its recorded confidence.
#[derive(Debug, Clone, PartialEq)]
pub struct MergeResult {
    pub words: Vec<OcrWord>,
    pub confidence: f32,
}

/// Merges the output of two OCR engines.
///
/// The merger remembers the confidence of its most recent merge; it needs
/// `&mut self` to merge, so callers wanting concurrent merges use one
/// instance per worker.
#[derive(Debug, Clone)]
pub struct OcrMerger {
    strategy: MergeStrategy,
    last_confidence: f32,
}

impl OcrMerger {
    pub fn new(strategy: MergeStrategy) -> Self {
        info!("Initialized OCR merger with strategy: {}", strategy.as_str());
        Self {
            strategy,
            last_confidence: 0.0,
        }
    }

    pub fn strategy(&self) -> MergeStrategy {
        self.strategy
    }

    /// Confidence recorded by the most recent call to [`OcrMerger::merge`].
    pub fn last_confidence(&self) -> f32 {
        self.last_confidence
    }

    /// Merge a primary pass with an optional fallback pass.
    pub fn merge(&mut self, primary: Vec<OcrWord>, fallback: Option<Vec<OcrWord>>) -> MergeResult {
        let fallback = match fallback {
            Some(words) if !words.is_empty() => words,
            _ => {
                let confidence = mean_confidence(&primary);
                debug!(
                    "No fallback results provided. Using primary results with avg confidence: {:.2}",
                    confidence
                );
                return self.record(primary, confidence);
            }
        };

        if primary.is_empty() {
            let confidence = mean_confidence(&fallback);
            debug!(
                "No primary results provided. Using fallback results with avg confidence: {:.2}",
                confidence
            );
            return self.record(fallback, confidence);
        }

        debug!(
            "Primary OCR confidence: {:.2}, fallback OCR confidence: {:.2}",
            mean_confidence(&primary),
            mean_confidence(&fallback)
        );

        let result = match self.strategy {
            MergeStrategy::HighestConfidence => merge_highest_confidence(primary, fallback),
            MergeStrategy::LineByLine => merge_line_by_line(&primary, &fallback),
            MergeStrategy::WordByWord => merge_word_by_word(primary, fallback),
        };

        self.last_confidence = result.confidence;
        result
    }

    fn record(&mut self, words: Vec<OcrWord>, confidence: f32) -> MergeResult {
        self.last_confidence = confidence;
        MergeResult { words, confidence }
    }
}

impl Default for OcrMerger {
    fn default() -> Self {
        Self::new(MergeStrategy::default())
    }
}

/// Whether two optional boxes overlap by at least [`OVERLAP_THRESHOLD`].
///
/// A missing box never overlaps.
pub fn boxes_overlap(a: Option<&BoundingBox>, b: Option<&BoundingBox>) -> bool {
    match (a, b) {
        (Some(a), Some(b)) => a.overlap_ratio(b) >= OVERLAP_THRESHOLD,
        _ => false,
    }
}

fn merge_highest_confidence(primary: Vec<OcrWord>, fallback: Vec<OcrWord>) -> MergeResult {
    let primary_conf = mean_confidence(&primary);
    let fallback_conf = mean_confidence(&fallback);

    if primary_conf >= fallback_conf {
        info!(
            "Using primary OCR results (conf: {:.2} >= {:.2})",
            primary_conf, fallback_conf
        );
        MergeResult {
            words: primary,
            confidence: primary_conf,
        }
    } else {
        info!(
            "Using fallback OCR results (conf: {:.2} > {:.2})",
            fallback_conf, primary_conf
        );
        MergeResult {
            words: fallback,
            confidence: fallback_conf,
        }
    }
}

/// Words sharing one vertical bucket, in first-seen order.
struct Line<'a> {
    key: i64,
    words: Vec<&'a OcrWord>,
}

impl Line<'_> {
    fn confidence(&self) -> f32 {
        self.words.iter().map(|w| w.confidence).sum::<f32>() / self.words.len() as f32
    }
}

fn line_key(bbox: &BoundingBox) -> i64 {
    (bbox.y_mid() / LINE_BUCKET_PX).floor() as i64 * LINE_BUCKET_PX as i64
}

/// Group words into lines by quantized vertical midpoint. Words without a
/// box cannot be placed and are left out.
fn group_by_lines(words: &[OcrWord]) -> Vec<Line<'_>> {
    let mut lines: Vec<Line<'_>> = Vec::new();

    for word in words {
        let Some(bbox) = &word.bbox else {
            debug!("Skipping word without box in line grouping: {:?}", word.text);
            continue;
        };
        let key = line_key(bbox);

        match lines.iter_mut().find(|l| l.key == key) {
            Some(line) => line.words.push(word),
            None => lines.push(Line {
                key,
                words: vec![word],
            }),
        }
    }

    lines
}

/// Index of the line whose key is numerically closest to `target`; the
/// earliest line wins ties.
fn closest_line(lines: &[Line<'_>], target: i64) -> Option<usize> {
    lines
        .iter()
        .enumerate()
        .min_by_key(|(_, line)| (line.key - target).abs())
        .map(|(i, _)| i)
}

fn merge_line_by_line(primary: &[OcrWord], fallback: &[OcrWord]) -> MergeResult {
    let primary_lines = group_by_lines(primary);
    let fallback_lines = group_by_lines(fallback);

    let keys: BTreeSet<i64> = primary_lines
        .iter()
        .chain(fallback_lines.iter())
        .map(|l| l.key)
        .collect();

    let mut primary_used = vec![false; primary_lines.len()];
    let mut fallback_used = vec![false; fallback_lines.len()];
    let mut words = Vec::new();
    let mut total_confidence = 0.0f32;
    let mut line_count = 0usize;

    for key in keys {
        // A line already emitted for an earlier key counts as absent.
        let p = closest_line(&primary_lines, key).filter(|&i| !primary_used[i]);
        let f = closest_line(&fallback_lines, key).filter(|&i| !fallback_used[i]);

        let p_conf = p.map_or(0.0, |i| primary_lines[i].confidence());
        let f_conf = f.map_or(0.0, |i| fallback_lines[i].confidence());

        let chosen = match (p, f) {
            (Some(i), _) if p_conf >= f_conf => {
                primary_used[i] = true;
                Some((&primary_lines[i], p_conf))
            }
            (_, Some(i)) => {
                fallback_used[i] = true;
                Some((&fallback_lines[i], f_conf))
            }
            _ => None,
        };

        if let Some((line, confidence)) = chosen {
            words.extend(line.words.iter().map(|w| (*w).clone()));
            total_confidence += confidence;
            line_count += 1;
        }
    }

    let confidence = total_confidence / line_count.max(1) as f32;
    info!(
        "Line-by-line merge completed with {} lines, avg confidence: {:.2}",
        line_count, confidence
    );

    MergeResult { words, confidence }
}

fn merge_word_by_word(primary: Vec<OcrWord>, fallback: Vec<OcrWord>) -> MergeResult {
    let mut consumed = vec![false; fallback.len()];
    let mut words = Vec::with_capacity(primary.len() + fallback.len());

    for word in primary {
        // First candidate with the highest confidence wins.
        let mut best: Option<usize> = None;
        for (i, candidate) in fallback.iter().enumerate() {
            if consumed[i] || !boxes_overlap(word.bbox.as_ref(), candidate.bbox.as_ref()) {
                continue;
            }
            if best.is_none_or(|b| candidate.confidence > fallback[b].confidence) {
                best = Some(i);
            }
        }

        match best {
            Some(i) if fallback[i].confidence > word.confidence => {
                consumed[i] = true;
                words.push(fallback[i].clone());
            }
            _ => words.push(word),
        }
    }

    words.extend(
        fallback
            .into_iter()
            .zip(consumed)
            .filter(|(_, used)| !used)
            .map(|(word, _)| word),
    );

    let confidence =
        words.iter().map(|w| w.confidence).sum::<f32>() / words.len().max(1) as f32;
    info!(
        "Word-by-word merge completed with {} words, avg confidence: {:.2}",
        words.len(),
        confidence
    );

    MergeResult { words, confidence }
}
