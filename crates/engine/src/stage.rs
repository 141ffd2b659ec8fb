//! Ingestion stages
//!
//! A stage is a named unit of work that feeds features into the sorter.
//! Stages run once, in registration order.

use crate::config::PipelineConfig;
use crate::node_store::NodeLocationStore;
use crate::profile::Profile;
use tilepress_core::EncodedFeature;
use tilepress_storage::{FeatureSorter, SortResult};

/// Work done by a stage.
pub type StageTask = Box<dyn FnOnce(&StageContext<'_>) -> anyhow::Result<()> + Send>;

/// Whether a stage always runs or only when the profile uses its source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageKind {
    /// Always runs
    Stage,
    /// Skipped when the profile does not care about the source
    Source,
}

/// A registered stage.
pub struct Stage {
    pub(crate) name: String,
    pub(crate) description: String,
    pub(crate) kind: StageKind,
    pub(crate) substages: Vec<(String, String)>,
    /// Taken when the stage runs.
    pub(crate) task: Option<StageTask>,
}

impl std::fmt::Debug for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Stage")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("substages", &self.substages)
            .finish()
    }
}

impl Stage {
    pub(crate) fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        kind: StageKind,
        task: StageTask,
    ) -> Self {
        Stage {
            name: name.into(),
            description: description.into(),
            kind,
            substages: Vec::new(),
            task: Some(task),
        }
    }

    /// Stage name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Stage description.
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Stage kind.
    pub fn kind(&self) -> StageKind {
        self.kind
    }

    /// Named sub-passes, for the phase plan.
    pub fn substages(&self) -> &[(String, String)] {
        &self.substages
    }
}

/// Everything a running stage may use.
pub struct StageContext<'a> {
    pub(crate) stage: &'a str,
    pub(crate) sorter: &'a FeatureSorter,
    pub(crate) node_store: &'a NodeLocationStore,
    pub(crate) config: &'a PipelineConfig,
    pub(crate) profile: &'a dyn Profile,
}

impl<'a> StageContext<'a> {
    /// Name of the running stage.
    pub fn stage_name(&self) -> &str {
        self.stage
    }

    /// Shared feature sorter; `add` may be called from many threads.
    pub fn sorter(&self) -> &'a FeatureSorter {
        self.sorter
    }

    /// Add one feature to the sorter.
    pub fn emit(&self, feature: EncodedFeature) -> SortResult<()> {
        self.sorter.add(feature)
    }

    /// Node location table of this run.
    pub fn node_store(&self) -> &'a NodeLocationStore {
        self.node_store
    }

    /// Run configuration.
    pub fn config(&self) -> &'a PipelineConfig {
        self.config
    }

    /// Profile of this run.
    pub fn profile(&self) -> &'a dyn Profile {
        self.profile
    }
}
