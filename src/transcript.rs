//! Extraction transcript for diagnosing model behavior.
//!
//! Each extraction attempt appends one JSON line to a caller-chosen file:
//!
//! ```jsonl
//! {"schemaVersion":1,"ts":1707900000000,"imageReference":"gs://b/o.jpg","durationMs":4200,"outcome":"success",...}
//! {"schemaVersion":1,"ts":1707900060000,"imageReference":"gs://b/p.jpg","durationMs":3100,"outcome":"failed","errorKind":"MalformedOutput",...}
//! ```
//!
//! The raw model response is kept here, not in caller-facing errors.
use crate::pipeline::ErrorKind;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Current schema version for transcript entries.
pub const TRANSCRIPT_SCHEMA_VERSION: u32 = 1;

const PROMPT_PREVIEW_CHARS: usize = 500;

/// Outcome of an extraction attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TranscriptOutcome {
    Success,
    Failed,
}

/// A single extraction attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TranscriptEntry {
    pub schema_version: u32,

    /// Unix timestamp in milliseconds when the attempt started.
    pub ts: u64,

    pub image_reference: String,

    pub duration_ms: u64,

    pub outcome: TranscriptOutcome,

    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub error_kind: Option<ErrorKind>,

    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub error: Option<String>,

    /// First ~500 chars of the prompt.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub prompt_preview: Option<String>,

    /// Full model text, when the model answered at all.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub raw_response: Option<String>,
}

/// Builder for constructing entries with timing.
pub struct TranscriptBuilder {
    start: Instant,
    ts: u64,
    image_reference: String,
    prompt_preview: Option<String>,
    raw_response: Option<String>,
}

impl TranscriptBuilder {
    pub fn new(image_reference: &str) -> Self {
        Self {
            start: Instant::now(),
            ts: now_epoch_ms(),
            image_reference: image_reference.to_string(),
            prompt_preview: None,
            raw_response: None,
        }
    }

    /// Set a preview of the prompt (truncated to 500 chars).
    pub fn set_prompt_preview(&mut self, prompt: &str) {
        let preview = if prompt.chars().count() > PROMPT_PREVIEW_CHARS {
            let head: String = prompt.chars().take(PROMPT_PREVIEW_CHARS).collect();
            format!("{head}...")
        } else {
            prompt.to_string()
        };
        self.prompt_preview = Some(preview);
    }

    pub fn set_raw_response(&mut self, raw: &str) {
        self.raw_response = Some(raw.to_string());
    }

    pub fn success(self) -> TranscriptEntry {
        self.build(TranscriptOutcome::Success, None, None)
    }

    pub fn failed(self, kind: ErrorKind, error: impl Into<String>) -> TranscriptEntry {
        self.build(TranscriptOutcome::Failed, Some(kind), Some(error.into()))
    }

    fn build(
        self,
        outcome: TranscriptOutcome,
        error_kind: Option<ErrorKind>,
        error: Option<String>,
    ) -> TranscriptEntry {
        TranscriptEntry {
            schema_version: TRANSCRIPT_SCHEMA_VERSION,
            ts: self.ts,
            image_reference: self.image_reference,
            duration_ms: self.start.elapsed().as_millis() as u64,
            outcome,
            error_kind,
            error,
            prompt_preview: self.prompt_preview,
            raw_response: self.raw_response,
        }
    }
}

/// Append-only JSONL sink shared by concurrent requests.
#[derive(Debug)]
pub struct Transcript {
    path: PathBuf,
    lock: Mutex<()>,
}

impl Transcript {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one entry as a JSON line.
    pub fn append(&self, entry: &TranscriptEntry) -> Result<()> {
        let line = serde_json::to_string(entry).context("serialize transcript entry")?;
        let _guard = self.lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner());

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).context("create transcript directory")?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("open transcript for append: {}", self.path.display()))?;
        writeln!(file, "{line}").context("write transcript entry")?;
        Ok(())
    }

    /// Append, downgrading failures to a warning; transcripts never fail a request.
    pub fn record(&self, entry: &TranscriptEntry) {
        if let Err(err) = self.append(entry) {
            tracing::warn!(path = %self.path.display(), error = %err, "transcript write failed");
        }
    }
}

/// Load all entries, skipping corrupt lines.
pub fn load_transcript(path: &Path) -> Result<Vec<TranscriptEntry>> {
    if !path.exists() {
        return Ok(Vec::new());
    }

    let file = File::open(path).with_context(|| format!("open transcript: {}", path.display()))?;
    let reader = BufReader::new(file);
    let mut entries = Vec::new();

    for (line_num, line) in reader.lines().enumerate() {
        let line = line.with_context(|| format!("read line {} of transcript", line_num + 1))?;
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<TranscriptEntry>(&line) {
            Ok(entry) => entries.push(entry),
            Err(err) => {
                tracing::warn!(line = line_num + 1, error = %err, "skip corrupt transcript entry");
            }
        }
    }

    Ok(entries)
}

fn now_epoch_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or(Duration::ZERO)
        .as_millis() as u64
}
