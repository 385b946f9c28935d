//! The run driver: corpus in, records and reports out.
//!
//! Samples for one model are evaluated strictly in sample-index order on a
//! single worker, which is the ordering contract jump-dynamics needs.
//! Per-sample evaluation errors are absorbed into records; only
//! configuration and I/O problems fail the run.

use std::collections::BTreeSet;
use std::io::Write;
use std::path::PathBuf;

use thiserror::Error;

use aerograde_core::config::ConfigError;
use aerograde_core::{
    EvalConfig, ModelConfidence, ModelProfile, Pipeline, Record, TaskId, TaskSummary, Trace,
};

use crate::corpus::{build_samples, Corpus, CorpusError, ReferenceStore};
use crate::judge::{apply_to_record, LlmJudge};

#[derive(Error, Debug)]
pub enum RunError {
    #[error(transparent)]
    Corpus(#[from] CorpusError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("no task spec configured for {0}")]
    MissingTaskSpec(TaskId),

    #[error("failed writing output {path}: {source}")]
    Output {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed serializing output: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Which adjudicator grades the rubric.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdjudicatorKind {
    Rule,
    Llm,
}

/// One run's parameters.
pub struct RunOptions {
    pub tasks: Vec<TaskId>,
    pub output_dir: PathBuf,
    /// Restrict to these models; `None` evaluates every model in the corpus.
    pub models: Option<Vec<String>>,
    /// Cap on samples per (task, model).
    pub samples_per_model: Option<usize>,
    /// Confidence-prior file, passed through into model profiles.
    pub confidence_path: Option<PathBuf>,
}

/// What a completed run produced.
#[derive(Debug)]
pub struct RunReport {
    pub total_records: usize,
    pub models: Vec<String>,
    pub output_dir: PathBuf,
}

pub struct Runner {
    config: EvalConfig,
    corpus: Corpus,
    reference: ReferenceStore,
    judge: Option<LlmJudge>,
    options: RunOptions,
}

impl Runner {
    pub fn new(
        config: EvalConfig,
        corpus_dir: PathBuf,
        judge: Option<LlmJudge>,
        options: RunOptions,
    ) -> Result<Self, RunError> {
        config.validate()?;
        Ok(Self {
            config,
            corpus: Corpus::new(&corpus_dir),
            reference: ReferenceStore::new(&corpus_dir),
            judge,
            options,
        })
    }

    pub async fn run(&self) -> Result<RunReport, RunError> {
        std::fs::create_dir_all(&self.options.output_dir).map_err(|source| RunError::Output {
            path: self.options.output_dir.clone(),
            source,
        })?;

        let mut all_records: Vec<Record> = Vec::new();

        for &task in &self.options.tasks {
            let spec = self
                .config
                .task_spec(task)
                .ok_or(RunError::MissingTaskSpec(task))?
                .clone();
            let task_spec_value = serde_json::to_value(&spec)?;

            let models = match &self.options.models {
                Some(models) => models.clone(),
                None => self.corpus.list_models(task)?,
            };

            for model in &models {
                let mut rows = self.corpus.load_replies(task, model)?;
                if let Some(cap) = self.options.samples_per_model {
                    rows.truncate(cap);
                }
                let pairs = build_samples(task, &spec, model, &rows, &self.reference);

                tracing::info!(task = %task, model = %model, samples = pairs.len(), "evaluating");

                // Fresh pipeline per (task, model): jump-dynamics history
                // never leaks across tasks or models.
                let mut pipeline = Pipeline::new(self.config.clone());
                if let Some(judge) = &self.judge {
                    pipeline.set_judge_model(judge.model().to_string());
                }

                let mut records = Vec::with_capacity(pairs.len());
                for (sample, reply) in &pairs {
                    let mut record = pipeline.evaluate(sample, reply);

                    // Terminal records keep their fixed shape; the judge
                    // only adjudicates samples that produced evidence.
                    if record.protocol_result.parsing.success {
                        if let Some(judge) = &self.judge {
                            let output = judge
                                .judge(
                                    &record.evidence,
                                    &record.protocol_result,
                                    &task_spec_value,
                                    record.scores.conditional_error.as_ref(),
                                )
                                .await;
                            apply_to_record(&mut record, &output);
                        }
                    }
                    records.push(record);
                }

                self.write_records(task, model, &records)?;
                all_records.extend(records);
            }
        }

        // Downstream aggregation sorts by (task, model, sample_id); the
        // compute functions do their own filtering and ordering.
        let record_refs: Vec<&Record> = all_records.iter().collect();

        for &task in &self.options.tasks {
            let summary = TaskSummary::compute(&record_refs, task);
            self.write_json(&format!("summary_{}.json", task), &summary)?;
        }

        let confidence = match &self.options.confidence_path {
            Some(path) => crate::corpus::load_confidence(path)?,
            None => Default::default(),
        };

        let model_names: BTreeSet<String> = all_records
            .iter()
            .map(|r| r.model_name.clone())
            .collect();
        for model in &model_names {
            let prior: Option<ModelConfidence> = confidence.get(model).cloned();
            let profile = ModelProfile::compute(&record_refs, model, prior);
            self.write_json(&format!("profile_{}.json", sanitize(model)), &profile)?;
        }

        let version_info = Trace::stamp(
            &self.config,
            self.judge.as_ref().map(|j| j.model().to_string()),
        );
        self.write_json("version_info.json", &version_info)?;

        Ok(RunReport {
            total_records: all_records.len(),
            models: model_names.into_iter().collect(),
            output_dir: self.options.output_dir.clone(),
        })
    }

    fn write_records(
        &self,
        task: TaskId,
        model: &str,
        records: &[Record],
    ) -> Result<(), RunError> {
        let path = self
            .options
            .output_dir
            .join(format!("records_{}_{}.jsonl", task, sanitize(model)));
        let mut file = std::fs::File::create(&path).map_err(|source| RunError::Output {
            path: path.clone(),
            source,
        })?;
        for record in records {
            let line = serde_json::to_string(record)?;
            writeln!(file, "{}", line).map_err(|source| RunError::Output {
                path: path.clone(),
                source,
            })?;
        }
        Ok(())
    }

    fn write_json<T: serde::Serialize>(&self, name: &str, value: &T) -> Result<(), RunError> {
        let path = self.options.output_dir.join(name);
        let text = serde_json::to_string_pretty(value)?;
        std::fs::write(&path, text).map_err(|source| RunError::Output {
            path,
            source,
        })
    }
}

/// File-system-safe model names for output file stems.
fn sanitize(model: &str) -> String {
    model
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.' {
                c
            } else {
                '_'
            }
        })
        .collect()
}
