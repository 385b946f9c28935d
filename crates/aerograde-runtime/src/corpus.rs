//! Corpus, reference-data, and confidence-prior loading.
//!
//! Layout under the corpus base directory:
//!
//! ```text
//! replies/<task>/<model>.jsonl   one reply row per sample, in sample order
//! reference/<source>.jsonl      gold records aligned by zero-based index
//! ```
//!
//! Reference files are read lazily, one parse per file per run; the parsed
//! rows are shared behind a mutex so concurrent readers stay serialized per
//! file handle.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

use aerograde_core::config::TaskSpec;
use aerograde_core::{
    FieldMap, ModelConfidence, ModelReply, Sample, SampleContext, TaskId,
};

#[derive(Error, Debug)]
pub enum CorpusError {
    #[error("I/O error reading {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("malformed JSON in {path} line {line}: {source}")]
    Json {
        path: PathBuf,
        line: usize,
        source: serde_json::Error,
    },

    #[error("no reply corpus for task {task} at {path}")]
    MissingTaskDir { task: TaskId, path: PathBuf },
}

/// One raw reply row as stored in the corpus JSONL.
#[derive(Debug, Clone, Deserialize)]
pub struct ReplyRow {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub question: String,
    pub response: String,
    #[serde(default)]
    pub timestamp: String,
}

/// Reply corpus rooted at a base directory.
pub struct Corpus {
    base_dir: PathBuf,
}

impl Corpus {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    fn task_dir(&self, task: TaskId) -> PathBuf {
        self.base_dir.join("replies").join(task.to_string())
    }

    /// Model names that have a reply file for this task, sorted.
    pub fn list_models(&self, task: TaskId) -> Result<Vec<String>, CorpusError> {
        let dir = self.task_dir(task);
        let entries = std::fs::read_dir(&dir).map_err(|_| CorpusError::MissingTaskDir {
            task,
            path: dir.clone(),
        })?;

        let mut models: Vec<String> = entries
            .filter_map(|e| e.ok())
            .filter_map(|e| {
                let path = e.path();
                if path.extension().is_some_and(|ext| ext == "jsonl") {
                    path.file_stem().map(|s| s.to_string_lossy().into_owned())
                } else {
                    None
                }
            })
            .collect();
        models.sort();
        Ok(models)
    }

    /// Load one model's replies for a task, preserving file order (which is
    /// sample-index order by contract).
    pub fn load_replies(
        &self,
        task: TaskId,
        model: &str,
    ) -> Result<Vec<ReplyRow>, CorpusError> {
        let path = self.task_dir(task).join(format!("{}.jsonl", model));
        read_jsonl(&path)
    }
}

/// Lazily loaded, per-file-cached reference data.
pub struct ReferenceStore {
    base_dir: PathBuf,
    cache: Mutex<BTreeMap<String, Arc<Vec<Value>>>>,
}

impl ReferenceStore {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
            cache: Mutex::new(BTreeMap::new()),
        }
    }

    fn rows(&self, source: &str) -> Result<Arc<Vec<Value>>, CorpusError> {
        let mut cache = self.cache.lock().expect("reference cache poisoned");
        if let Some(rows) = cache.get(source) {
            return Ok(rows.clone());
        }
        let path = self.base_dir.join("reference").join(source);
        let rows: Arc<Vec<Value>> = Arc::new(read_jsonl(&path)?);
        cache.insert(source.to_string(), rows.clone());
        Ok(rows)
    }

    /// Gold record for a sample index, honouring the task's configured
    /// index offset. Missing files or out-of-range indices yield `None`:
    /// gold is optional by contract.
    pub fn gold_for(
        &self,
        task: TaskId,
        spec: &TaskSpec,
        sample_idx: usize,
    ) -> Option<FieldMap> {
        let rows = match self.rows(&spec.reference_source) {
            Ok(rows) => rows,
            Err(err) => {
                tracing::warn!(task = %task, error = %err, "reference data unavailable");
                return None;
            }
        };
        let row = rows.get(spec.gold_index_offset + sample_idx)?;
        extract_gold(task, row)
    }
}

/// Pull the gold field map out of one reference row.
///
/// S1 rows carry a `next_second` object of scalars; M1/M3 rows carry a
/// `T+1` object of arrays. M1 predicts a single second, so its gold is the
/// first element of each array.
fn extract_gold(task: TaskId, row: &Value) -> Option<FieldMap> {
    match task {
        TaskId::S1 => row
            .get("next_second")
            .and_then(Value::as_object)
            .map(|map| FieldMap::from(map.clone())),
        TaskId::M3 => row
            .get("T+1")
            .and_then(Value::as_object)
            .map(|map| FieldMap::from(map.clone())),
        TaskId::M1 => {
            let map = row.get("T+1").and_then(Value::as_object)?;
            let mut first = serde_json::Map::new();
            for (field, value) in map {
                match value {
                    Value::Array(values) => {
                        if let Some(head) = values.first() {
                            first.insert(field.clone(), head.clone());
                        }
                    }
                    other => {
                        first.insert(field.clone(), other.clone());
                    }
                }
            }
            Some(FieldMap::from(first))
        }
    }
}

/// Build the (sample, reply) pairs for one model's corpus rows.
pub fn build_samples(
    task: TaskId,
    spec: &TaskSpec,
    model: &str,
    rows: &[ReplyRow],
    reference: &ReferenceStore,
) -> Vec<(Sample, ModelReply)> {
    rows.iter()
        .enumerate()
        .map(|(idx, row)| {
            let sample_id = row
                .id
                .clone()
                .unwrap_or_else(|| format!("{}_{:03}", task, idx));
            let current_state = aerograde_core::parse_reply(&row.question)
                .field_map()
                .and_then(|m| serde_json::to_value(m).ok());
            let sample = Sample {
                sample_id: sample_id.clone(),
                task,
                context: SampleContext {
                    question: row.question.clone(),
                    current_state,
                    record_idx: idx,
                },
                gold: reference.gold_for(task, spec, idx),
            };
            let reply = ModelReply {
                model_name: model.to_string(),
                sample_id,
                task,
                response: row.response.clone(),
                timestamp: row.timestamp.clone(),
            };
            (sample, reply)
        })
        .collect()
}

/// Load the per-model confidence prior map.
///
/// The file is one JSON object: model name → `{S1_score, M1_score,
/// M3_score, calculation_source, version, metadata}`.
pub fn load_confidence(path: &Path) -> Result<BTreeMap<String, ModelConfidence>, CorpusError> {
    let text = std::fs::read_to_string(path).map_err(|source| CorpusError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let mut map: BTreeMap<String, ModelConfidence> =
        serde_json::from_str(&text).map_err(|source| CorpusError::Json {
            path: path.to_path_buf(),
            line: 0,
            source,
        })?;
    for (name, confidence) in map.iter_mut() {
        if confidence.model_name.is_empty() {
            confidence.model_name = name.clone();
        }
    }
    Ok(map)
}

fn read_jsonl<T: serde::de::DeserializeOwned>(path: &Path) -> Result<Vec<T>, CorpusError> {
    let text = std::fs::read_to_string(path).map_err(|source| CorpusError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    text.lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(i, line)| {
            serde_json::from_str::<T>(line).map_err(|source| CorpusError::Json {
                path: path.to_path_buf(),
                line: i + 1,
                source,
            })
        })
        .collect()
}
