//! # aerograde-runtime
//!
//! The run driver around [`aerograde_core`]: corpus and reference-data
//! loading, the LLM adjudicator with its provider abstraction and judge
//! cache, report writing, and the `aerograde` CLI.
//!
//! The deterministic engine lives in the core crate; everything here is
//! I/O, orchestration, and the one optional network dependency (the judge).

pub mod corpus;
pub mod judge;
pub mod providers;
pub mod runner;

pub use corpus::{Corpus, CorpusError, ReferenceStore};
pub use judge::{EvidenceSummary, JudgeConfig, JudgeOutput, LlmJudge};
pub use providers::{LlmProvider, OpenAiProvider, ProviderError};
pub use runner::{AdjudicatorKind, RunError, RunOptions, RunReport, Runner};
