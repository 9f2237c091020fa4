//! Reading OCR word files and plain-text transcripts.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::Deserialize;
use tracing::{debug, warn};

use invex_core::models::invoice::InvoiceRecord;
use invex_core::{InvoicePipeline, OcrWord};

/// Suffix of word files holding a fallback OCR pass for a sibling file.
pub const FALLBACK_SUFFIX: &str = ".fallback.json";

/// Word file layouts: a bare list (primary pass only) or both passes.
#[derive(Deserialize)]
#[serde(untagged)]
enum WordFile {
    Passes {
        primary: Vec<OcrWord>,
        #[serde(default)]
        fallback: Option<Vec<OcrWord>>,
    },
    Words(Vec<OcrWord>),
}

/// Input to the pipeline, as read from disk.
#[derive(Debug)]
pub enum InvoiceInput {
    /// OCR word lists still to be merged.
    Words {
        primary: Vec<OcrWord>,
        fallback: Option<Vec<OcrWord>>,
    },
    /// Already merged transcript.
    Transcript(String),
}

impl InvoiceInput {
    /// Read `path`, optionally replacing its fallback pass with the words
    /// in `fallback`.
    ///
    /// `.txt` files are read as transcripts; everything else is parsed as
    /// a JSON word file.
    pub fn read(path: &Path, fallback: Option<&Path>) -> anyhow::Result<Self> {
        if is_transcript(path) {
            if let Some(fallback) = fallback {
                warn!(
                    "Ignoring fallback pass {} for transcript {}",
                    fallback.display(),
                    path.display()
                );
            }
            let text = fs::read_to_string(path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            return Ok(Self::Transcript(text));
        }

        let (primary, mut extra) = read_word_file(path)?;
        if let Some(fallback) = fallback {
            debug!("Reading fallback pass from {}", fallback.display());
            let (words, _) = read_word_file(fallback)?;
            extra = Some(words);
        }

        Ok(Self::Words {
            primary,
            fallback: extra,
        })
    }

    /// Run the input through `pipeline`, recording `source` as the
    /// record's source file.
    pub fn process(
        self,
        pipeline: &mut InvoicePipeline,
        source: &Path,
    ) -> invex_core::Result<InvoiceRecord> {
        let mut record = match self {
            Self::Words { primary, fallback } => pipeline.process_words(primary, fallback)?,
            Self::Transcript(text) => pipeline.process_text(&text)?,
        };
        record.metadata.source_file = source
            .file_name()
            .map(|name| name.to_string_lossy().into_owned());
        Ok(record)
    }
}

fn is_transcript(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("txt"))
}

fn read_word_file(path: &Path) -> anyhow::Result<(Vec<OcrWord>, Option<Vec<OcrWord>>)> {
    let content =
        fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?;
    let file: WordFile = serde_json::from_str(&content)
        .with_context(|| format!("Invalid OCR word file: {}", path.display()))?;

    Ok(match file {
        WordFile::Passes { primary, fallback } => (primary, fallback),
        WordFile::Words(words) => (words, None),
    })
}

/// Whether `path` is a fallback pass belonging to another file.
pub fn is_fallback_file(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| n.to_lowercase().ends_with(FALLBACK_SUFFIX))
}

/// Existing `<stem>.fallback.json` next to `path`, if any.
pub fn fallback_sibling(path: &Path) -> Option<PathBuf> {
    let stem = path.file_stem()?.to_str()?;
    let sibling = path.with_file_name(format!("{}{}", stem, FALLBACK_SUFFIX));
    sibling.exists().then_some(sibling)
}
