//! End-to-end processing: merge OCR passes, locate fields, validate.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::invoice::FieldLocator;
use crate::models::config::InvexConfig;
use crate::models::invoice::InvoiceRecord;
use crate::ocr::{words_to_text, OcrMerger, OcrWord};
use crate::validation::{SchemaDescriptor, SchemaValidator};

/// Engine label for records built from a single OCR pass.
pub const ENGINE_PRIMARY: &str = "primary";
/// Engine label for records built from merged primary and fallback passes.
pub const ENGINE_HYBRID: &str = "hybrid";

/// Wires the merger, locator and validator together.
///
/// Each pipeline owns its merger, so concurrent processing needs one
/// pipeline per worker.
#[derive(Debug, Clone)]
pub struct InvoicePipeline {
    merger: OcrMerger,
    locator: FieldLocator,
    validator: SchemaValidator,
    line_tolerance: f32,
    confidence_threshold: f32,
}

impl InvoicePipeline {
    /// Create a pipeline from its components.
    pub fn new(merger: OcrMerger, locator: FieldLocator, validator: SchemaValidator) -> Self {
        let defaults = InvexConfig::default();
        Self {
            merger,
            locator,
            validator,
            line_tolerance: defaults.ocr.line_tolerance,
            confidence_threshold: defaults.ocr.confidence_threshold,
        }
    }

    /// Build a pipeline from configuration, loading the schema file if set.
    pub fn from_config(config: &InvexConfig) -> Result<Self> {
        let schema = match &config.validation.schema {
            Some(path) => {
                info!("Loading schema from {}", path.display());
                SchemaDescriptor::from_file(path)?
            }
            None => SchemaDescriptor::default_invoice(),
        };

        let pipeline = Self::new(
            OcrMerger::new(config.ocr.strategy()),
            FieldLocator::new().with_line_items(config.extraction.detect_line_items),
            SchemaValidator::new(schema).with_strict_mode(config.validation.strict_mode),
        )
        .with_line_tolerance(config.ocr.line_tolerance)
        .with_confidence_threshold(config.ocr.confidence_threshold);

        Ok(pipeline)
    }

    /// Set the vertical tolerance used to split merged words into lines.
    pub fn with_line_tolerance(mut self, tolerance: f32) -> Self {
        self.line_tolerance = tolerance;
        self
    }

    /// Set the merge confidence below which a warning is logged.
    pub fn with_confidence_threshold(mut self, threshold: f32) -> Self {
        self.confidence_threshold = threshold;
        self
    }

    pub fn merger(&self) -> &OcrMerger {
        &self.merger
    }

    /// Process OCR word lists, stamping the current time.
    pub fn process_words(
        &mut self,
        primary: Vec<OcrWord>,
        fallback: Option<Vec<OcrWord>>,
    ) -> Result<InvoiceRecord> {
        self.process_words_at(primary, fallback, Utc::now())
    }

    /// Process OCR word lists with an explicit extraction timestamp.
    ///
    /// Both passes are merged page by page; the recorded confidence is the
    /// mean of the per-page merge confidences.
    pub fn process_words_at(
        &mut self,
        primary: Vec<OcrWord>,
        fallback: Option<Vec<OcrWord>>,
        timestamp: DateTime<Utc>,
    ) -> Result<InvoiceRecord> {
        let hybrid = fallback.as_ref().is_some_and(|words| !words.is_empty());
        let pages = group_by_page(primary, fallback);
        info!("Merging OCR results for {} page(s)", pages.len());

        let mut merged = Vec::new();
        let mut confidences = Vec::with_capacity(pages.len());
        for (page, (primary_words, fallback_words)) in pages {
            debug!("Merging page {}", page + 1);
            let fallback_words = hybrid.then_some(fallback_words);
            let result = self.merger.merge(primary_words, fallback_words);
            confidences.push(result.confidence);
            merged.extend(result.words);
        }

        let confidence = if confidences.is_empty() {
            0.0
        } else {
            confidences.iter().sum::<f32>() / confidences.len() as f32
        };
        if confidence < self.confidence_threshold {
            warn!(
                "Merged OCR confidence {:.2} is below threshold {:.2}",
                confidence, self.confidence_threshold
            );
        }

        let text = words_to_text(&merged, self.line_tolerance);
        let mut record = self.process_text_at(&text, timestamp)?;
        record.metadata.confidence_score = Some(confidence);
        let engine = if hybrid { ENGINE_HYBRID } else { ENGINE_PRIMARY };
        record.metadata.ocr_engine = Some(engine.to_string());
        Ok(record)
    }

    /// Locate and validate fields in an already merged transcript.
    pub fn process_text(&self, text: &str) -> Result<InvoiceRecord> {
        self.process_text_at(text, Utc::now())
    }

    /// [`InvoicePipeline::process_text`] with an explicit timestamp.
    pub fn process_text_at(&self, text: &str, timestamp: DateTime<Utc>) -> Result<InvoiceRecord> {
        let record = self.locator.extract_fields_at(text, timestamp);
        self.validator.validate(&record)
    }
}

impl Default for InvoicePipeline {
    fn default() -> Self {
        Self::new(
            OcrMerger::default(),
            FieldLocator::default(),
            SchemaValidator::default(),
        )
    }
}

type PagePasses = (Vec<OcrWord>, Vec<OcrWord>);

fn group_by_page(
    primary: Vec<OcrWord>,
    fallback: Option<Vec<OcrWord>>,
) -> BTreeMap<u32, PagePasses> {
    let mut pages: BTreeMap<u32, PagePasses> = BTreeMap::new();
    for word in primary {
        pages.entry(word.page).or_default().0.push(word);
    }
    for word in fallback.into_iter().flatten() {
        pages.entry(word.page).or_default().1.push(word);
    }
    pages
}
