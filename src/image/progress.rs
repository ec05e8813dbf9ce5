//! Build progress interpretation
//!
//! The engine reports a build as a sequence of JSON objects. Records are
//! folded into one map where later fields overwrite earlier ones, and the
//! merged map decides the outcome: an `errorDetail` (or `error`) field fails
//! the build no matter what came before it.

use crate::engine::EngineError;
use crate::error::{DockyardError, Result};
use futures::{Stream, StreamExt};
use serde_json::{Map, Value};
use tracing::debug;

/// One structured message emitted by the engine during a build
pub type ProgressRecord = Map<String, Value>;

/// Terminal state of a build
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildOutcome {
    Success,
    Failure { message: String },
}

impl BuildOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, BuildOutcome::Success)
    }

    /// Convert a failed outcome into a `Build` error
    pub fn into_result(self) -> Result<()> {
        match self {
            BuildOutcome::Success => Ok(()),
            BuildOutcome::Failure { message } => Err(DockyardError::Build(message)),
        }
    }
}

/// Accumulator for progress records
#[derive(Debug, Default, Clone)]
pub struct BuildProgress {
    merged: ProgressRecord,
    records: usize,
}

impl BuildProgress {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge one record, last write wins per field
    pub fn absorb(&mut self, record: ProgressRecord) {
        if let Some(Value::String(line)) = record.get("stream") {
            let line = line.trim_end();
            if !line.is_empty() {
                debug!("build: {}", line);
            }
        }
        self.merged.extend(record);
        self.records += 1;
    }

    /// Number of records absorbed so far
    pub fn records(&self) -> usize {
        self.records
    }

    /// The merged view of every record absorbed so far
    pub fn merged(&self) -> &ProgressRecord {
        &self.merged
    }

    /// Decide the outcome from the merged fields
    pub fn outcome(&self) -> BuildOutcome {
        let detail = present(self.merged.get("errorDetail"));
        let error = present(self.merged.get("error"));

        if detail.is_none() && error.is_none() {
            return BuildOutcome::Success;
        }

        let message = detail
            .and_then(|d| d.get("message"))
            .and_then(Value::as_str)
            .or_else(|| error.and_then(Value::as_str))
            .map(str::to_string)
            .unwrap_or_else(|| "build failed".to_string());

        BuildOutcome::Failure { message }
    }
}

fn present(value: Option<&Value>) -> Option<&Value> {
    value.filter(|v| !v.is_null())
}

/// Fold a stream of progress records into a build outcome
///
/// A record the engine could not decode aborts interpretation with
/// `StreamDecode`; any other stream failure aborts it with `Build`.
pub async fn interpret<S>(mut records: S) -> Result<BuildOutcome>
where
    S: Stream<Item = std::result::Result<ProgressRecord, EngineError>> + Unpin,
{
    let mut progress = BuildProgress::new();

    while let Some(record) = records.next().await {
        match record {
            Ok(record) => progress.absorb(record),
            Err(EngineError::Decode(message)) => return Err(DockyardError::StreamDecode(message)),
            Err(other) => return Err(DockyardError::Build(other.to_string())),
        }
    }

    debug!("Build produced {} progress records", progress.records());
    Ok(progress.outcome())
}

/// Split raw engine output into records
///
/// Objects may be separated by newlines or simply concatenated. Anything that
/// is not a JSON object yields an error and ends the sequence.
pub fn decode_records(
    raw: &[u8],
) -> impl Iterator<Item = std::result::Result<ProgressRecord, serde_json::Error>> + '_ {
    let mut failed = false;
    serde_json::Deserializer::from_slice(raw)
        .into_iter::<ProgressRecord>()
        .take_while(move |item| {
            let keep = !failed;
            failed = item.is_err();
            keep
        })
}
