#![forbid(unsafe_code)]

use serde::{Deserialize, Serialize};

pub const MAX_SAMPLES: usize = 3;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "ids", rename_all = "snake_case")]
pub enum MaterializeScope {
    /// Every node at depth 0–4 that is not a leaf and already has children.
    All,
    Parents(Vec<i64>),
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MaterializeRequest {
    pub scope: MaterializeScope,
    pub enforce_five: bool,
    pub prune_safe: bool,
    pub actor: String,
}

impl MaterializeRequest {
    pub fn new(scope: MaterializeScope, actor: impl Into<String>) -> Self {
        Self {
            scope,
            enforce_five: true,
            prune_safe: true,
            actor: actor.into(),
        }
    }

    pub fn enforce_five(mut self, value: bool) -> Self {
        self.enforce_five = value;
        self
    }

    pub fn prune_safe(mut self, value: bool) -> Self {
        self.prune_safe = value;
        self
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct MaterializeSample {
    pub parent_id: i64,
    pub slot: Option<i64>,
    pub node_id: Option<i64>,
    pub label: Option<String>,
}

#[derive(Clone, Debug, Default, Serialize)]
pub struct MaterializeSamples {
    pub added: Vec<MaterializeSample>,
    pub filled: Vec<MaterializeSample>,
    pub pruned: Vec<MaterializeSample>,
    pub kept: Vec<MaterializeSample>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SampleCategory {
    Added,
    Filled,
    Pruned,
    Kept,
}

#[derive(Clone, Debug, Serialize)]
pub struct MaterializeReport {
    pub run_id: String,
    pub started_at_ms: i64,
    pub finished_at_ms: i64,
    pub added: u64,
    pub filled: u64,
    pub pruned: u64,
    pub kept: u64,
    pub pruned_rows: u64,
    pub skipped: u64,
    pub samples: MaterializeSamples,
    pub audit_id: Option<i64>,
}

impl MaterializeReport {
    pub fn start(run_id: impl Into<String>, started_at_ms: i64) -> Self {
        Self {
            run_id: run_id.into(),
            started_at_ms,
            finished_at_ms: started_at_ms,
            added: 0,
            filled: 0,
            pruned: 0,
            kept: 0,
            pruned_rows: 0,
            skipped: 0,
            samples: MaterializeSamples::default(),
            audit_id: None,
        }
    }

    pub fn record(&mut self, category: SampleCategory, sample: MaterializeSample) {
        let (counter, samples) = match category {
            SampleCategory::Added => (&mut self.added, &mut self.samples.added),
            SampleCategory::Filled => (&mut self.filled, &mut self.samples.filled),
            SampleCategory::Pruned => (&mut self.pruned, &mut self.samples.pruned),
            SampleCategory::Kept => (&mut self.kept, &mut self.samples.kept),
        };
        *counter += 1;
        if samples.len() < MAX_SAMPLES {
            samples.push(sample);
        }
    }

    pub fn is_noop(&self) -> bool {
        self.added == 0 && self.pruned == 0
    }
}
