//! Pipeline runner
//!
//! Coordinates a run from registered stages to a finished archive:
//!
//! ```text
//! checks → overwrite policy → phase plan → temp dir (node.db, feature.db/)
//!        → stages → release profile, delete node.db
//!        → sort → group → render → write
//! ```
//!
//! Every precondition is checked before any file is touched. Any failure
//! aborts the run; temporary files are removed by their owners on drop.

use crate::config::PipelineConfig;
use crate::error::{PipelineError, PipelineResult};
use crate::node_store::NodeLocationStore;
use crate::profile::Profile;
use crate::stage::{Stage, StageContext, StageKind, StageTask};
use crate::tile_writer::{write_tiles, TileWriteOptions};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tilepress_archive::{open_archive, shard_path, StreamArchiveConfig};
use tilepress_storage::{FeatureSorter, TileGrouper};
use tracing::{debug, info};

/// Node location table file in the run's temporary directory.
pub const NODE_DB_NAME: &str = "node.db";

/// Spill directory in the run's temporary directory.
pub const FEATURE_DB_NAME: &str = "feature.db";

/// Outcome of a successful run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
    /// Stages that ran
    pub stages_run: usize,
    /// Source stages skipped because the profile does not use them
    pub stages_skipped: usize,
    /// Features added to the sorter
    pub features_processed: u64,
    /// Chunks spilled by the sorter
    pub chunks_spilled: u64,
    /// Tiles written to the archive
    pub tiles_written: u64,
    /// Tiles dropped for rendering to no data
    pub tiles_skipped: u64,
    /// Wall time of the run
    pub elapsed: Duration,
}

/// Top-level coordinator of a tile archive build.
pub struct PipelineRunner {
    config: PipelineConfig,
    stages: Vec<Stage>,
    profile: Option<Arc<dyn Profile>>,
    output: Option<PathBuf>,
    overwrite: bool,
    input_file: Option<PathBuf>,
    ran: bool,
}

impl std::fmt::Debug for PipelineRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineRunner")
            .field("stages", &self.stages)
            .field("output", &self.output)
            .field("ran", &self.ran)
            .finish()
    }
}

impl PipelineRunner {
    /// Create a runner with `config`.
    pub fn new(config: PipelineConfig) -> Self {
        PipelineRunner {
            config,
            stages: Vec::new(),
            profile: None,
            output: None,
            overwrite: false,
            input_file: None,
            ran: false,
        }
    }

    /// Run configuration.
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Registered stages, in run order.
    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    fn register(&mut self, stage: Stage) -> PipelineResult<&mut Self> {
        if self.stages.iter().any(|s| s.name == stage.name) {
            return Err(PipelineError::DuplicateStage(stage.name));
        }
        self.stages.push(stage);
        Ok(self)
    }

    /// Register a stage that always runs.
    pub fn add_stage<F>(
        &mut self,
        name: impl Into<String>,
        description: impl Into<String>,
        task: F,
    ) -> PipelineResult<&mut Self>
    where
        F: FnOnce(&StageContext<'_>) -> anyhow::Result<()> + Send + 'static,
    {
        let task: StageTask = Box::new(task);
        self.register(Stage::new(name, description, StageKind::Stage, task))
    }

    /// Register a stage reading source `name`. It is skipped when the
    /// profile does not care about the source.
    pub fn add_source<F>(
        &mut self,
        name: impl Into<String>,
        description: impl Into<String>,
        task: F,
    ) -> PipelineResult<&mut Self>
    where
        F: FnOnce(&StageContext<'_>) -> anyhow::Result<()> + Send + 'static,
    {
        let task: StageTask = Box::new(task);
        self.register(Stage::new(name, description, StageKind::Source, task))
    }

    /// Describe the sub-passes of a registered multi-pass stage.
    pub fn add_substage_descriptions(
        &mut self,
        name: &str,
        substages: &[(&str, &str)],
    ) -> PipelineResult<&mut Self> {
        let stage = self
            .stages
            .iter_mut()
            .find(|s| s.name == name)
            .ok_or_else(|| PipelineError::config(format!("No stage named {}", name)))?;
        stage.substages.extend(
            substages
                .iter()
                .map(|(sub, description)| (sub.to_string(), description.to_string())),
        );
        Ok(self)
    }

    /// Set the rendering profile.
    pub fn set_profile(&mut self, profile: impl Profile + 'static) -> &mut Self {
        self.profile = Some(Arc::new(profile));
        self
    }

    /// Set a shared rendering profile.
    pub fn set_shared_profile(&mut self, profile: Arc<dyn Profile>) -> &mut Self {
        self.profile = Some(profile);
        self
    }

    /// Write the archive to `path`; an existing output is an error unless
    /// `force_overwrite` is configured.
    pub fn set_output(&mut self, path: impl Into<PathBuf>) -> &mut Self {
        self.output = Some(path.into());
        self.overwrite = false;
        self
    }

    /// Write the archive to `path`, replacing any existing output.
    pub fn overwrite_output(&mut self, path: impl Into<PathBuf>) -> &mut Self {
        self.output = Some(path.into());
        self.overwrite = true;
        self
    }

    /// Main input, probed for its size to tune the sorter.
    pub fn set_input_file(&mut self, path: impl Into<PathBuf>) -> &mut Self {
        self.input_file = Some(path.into());
        self
    }

    /// Run every stage, sort, render and write the archive. May be called
    /// once.
    pub fn run(&mut self) -> PipelineResult<RunSummary> {
        let start = Instant::now();

        if self.ran {
            return Err(PipelineError::illegal_state("Pipeline already ran"));
        }
        let profile = self
            .profile
            .clone()
            .ok_or_else(|| PipelineError::config("No profile set"))?;
        let output = self
            .output
            .clone()
            .ok_or_else(|| PipelineError::config("No output set"))?;
        if self.stages.is_empty() {
            return Err(PipelineError::config("No stages registered"));
        }
        self.ran = true;

        self.config.validate()?;
        let input_size = self.probe_input()?;
        let sorter_config = self.config.sorter_config(input_size);
        let archive_config = self.config.archive_config()?;

        self.apply_overwrite_policy(&output, &archive_config)?;
        self.log_phase_plan(profile.as_ref(), &output, &archive_config);

        fs::create_dir_all(&self.config.tmp_dir)?;
        let work_dir = tempfile::Builder::new()
            .prefix("tilepress-")
            .tempdir_in(&self.config.tmp_dir)?;
        debug!(target: "tilepress::run", dir = %work_dir.path().display(), "Working directory created");

        let node_store = NodeLocationStore::create(work_dir.path().join(NODE_DB_NAME))?;
        let sorter = FeatureSorter::new(work_dir.path().join(FEATURE_DB_NAME), sorter_config)?;

        let mut stages_run = 0;
        let mut stages_skipped = 0;
        for stage in self.stages.iter_mut() {
            let Some(task) = stage.task.take() else {
                continue;
            };
            if stage.kind == StageKind::Source && !profile.cares_about_source(&stage.name) {
                info!(target: "tilepress::run", stage = %stage.name, "Skipping source not used by profile");
                stages_skipped += 1;
                continue;
            }

            let stage_start = Instant::now();
            info!(target: "tilepress::run", stage = %stage.name, "Stage started: {}", stage.description);
            let ctx = StageContext {
                stage: &stage.name,
                sorter: &sorter,
                node_store: &node_store,
                config: &self.config,
                profile: profile.as_ref(),
            };
            task(&ctx).map_err(|source| PipelineError::Stage {
                stage: stage.name.clone(),
                source,
            })?;
            stages_run += 1;

            let counters = sorter.counters();
            info!(
                target: "tilepress::run",
                stage = %stage.name,
                features = counters.features_added,
                chunks = counters.chunks_spilled,
                elapsed_ms = stage_start.elapsed().as_millis() as u64,
                "Stage finished"
            );
        }

        profile.release();
        node_store.delete()?;

        let sorted = sorter.sort()?;
        let counters = sorter.counters();

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.config.threads)
            .thread_name(|i| format!("tilepress-render-{}", i))
            .build()
            .map_err(|e| PipelineError::Io(io::Error::new(io::ErrorKind::Other, e)))?;

        let mut writer = open_archive(&output, &archive_config)?;
        let options = TileWriteOptions {
            batch_size: self.config.render_batch_size,
            emit_empty_tiles: self.config.emit_empty_tiles,
        };
        let (write_stats, _) = write_tiles(
            TileGrouper::new(sorted),
            profile.as_ref(),
            writer.as_mut(),
            &pool,
            options,
        )?;

        let summary = RunSummary {
            stages_run,
            stages_skipped,
            features_processed: counters.features_added,
            chunks_spilled: counters.chunks_spilled,
            tiles_written: write_stats.tiles_written,
            tiles_skipped: write_stats.tiles_skipped,
            elapsed: start.elapsed(),
        };
        info!(
            target: "tilepress::run",
            output = %output.display(),
            features = summary.features_processed,
            chunks = summary.chunks_spilled,
            tiles = summary.tiles_written,
            elapsed_ms = summary.elapsed.as_millis() as u64,
            "Run finished"
        );
        Ok(summary)
    }

    fn probe_input(&self) -> PipelineResult<Option<u64>> {
        let Some(input) = &self.input_file else {
            return Ok(None);
        };
        let metadata = fs::metadata(input).map_err(|e| {
            PipelineError::config(format!("Cannot read input {}: {}", input.display(), e))
        })?;
        Ok(Some(metadata.len()))
    }

    fn apply_overwrite_policy(
        &self,
        output: &Path,
        archive: &StreamArchiveConfig,
    ) -> PipelineResult<()> {
        if archive.append {
            return Ok(());
        }
        let force = self.overwrite || self.config.force_overwrite;
        for index in 0..archive.shards {
            let path = shard_path(output, index);
            if !path.exists() {
                continue;
            }
            if !force {
                return Err(PipelineError::OutputExists(path));
            }
            info!(target: "tilepress::run", path = %path.display(), "Deleting existing output");
            if path.is_dir() {
                fs::remove_dir_all(&path)?;
            } else {
                fs::remove_file(&path)?;
            }
        }
        Ok(())
    }

    fn log_phase_plan(&self, profile: &dyn Profile, output: &Path, archive: &StreamArchiveConfig) {
        info!(
            target: "tilepress::run",
            profile = profile.name(),
            output = %output.display(),
            format = %archive.format,
            shards = archive.shards,
            threads = self.config.threads,
            "Building tile archive"
        );
        for stage in &self.stages {
            let skipped = stage.kind == StageKind::Source && !profile.cares_about_source(&stage.name);
            if stage.substages.is_empty() {
                info!(target: "tilepress::run", skipped, "  {}: {}", stage.name, stage.description);
            }
            for (sub, description) in &stage.substages {
                info!(target: "tilepress::run", skipped, "  {}_{}: {}", stage.name, sub, description);
            }
        }
        info!(target: "tilepress::run", "  sort: sort rendered features by tile");
        info!(target: "tilepress::run", "  archive: encode each tile and write to {}", output.display());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use tilepress_core::TileEncodingResult;
    use tilepress_storage::TileFeatures;

    struct NullProfile;

    impl Profile for NullProfile {
        fn name(&self) -> &str {
            "null"
        }

        fn cares_about_source(&self, source: &str) -> bool {
            source != "ignored"
        }

        fn render_tile(&self, tile: &TileFeatures) -> anyhow::Result<TileEncodingResult> {
            Ok(TileEncodingResult::new(tile.coord, Some(vec![tile.len() as u8])))
        }
    }

    fn dir_is_empty(path: &Path) -> bool {
        !path.exists() || fs::read_dir(path).unwrap().next().is_none()
    }

    fn runner(tmp: &TempDir) -> PipelineRunner {
        PipelineRunner::new(PipelineConfig::for_testing(tmp.path().join("tmp")))
    }

    #[test]
    fn test_duplicate_stage_rejected_at_registration() {
        let tmp = TempDir::new().unwrap();
        let mut runner = runner(&tmp);
        runner.add_stage("water", "water polygons", |_| Ok(())).unwrap();
        let err = runner.add_stage("water", "again", |_| Ok(())).unwrap_err();
        assert!(matches!(err, PipelineError::DuplicateStage(ref name) if name == "water"));
        assert_eq!(runner.stages().len(), 1);
    }

    #[test]
    fn test_missing_profile_or_output() {
        let tmp = TempDir::new().unwrap();
        let mut runner = runner(&tmp);
        runner.add_stage("s", "s", |_| Ok(())).unwrap();
        assert!(matches!(runner.run(), Err(PipelineError::Config(_))));

        runner.set_profile(NullProfile);
        assert!(matches!(runner.run(), Err(PipelineError::Config(_))));
    }

    #[test]
    fn test_zero_stages_fails_before_io() {
        let tmp = TempDir::new().unwrap();
        let mut runner = runner(&tmp);
        runner
            .set_profile(NullProfile)
            .set_output(tmp.path().join("out/tiles.csv"));

        assert!(matches!(runner.run(), Err(PipelineError::Config(_))));
        assert!(!tmp.path().join("tmp").exists());
        assert!(!tmp.path().join("out").exists());
    }

    #[test]
    fn test_second_run_is_illegal_state() {
        let tmp = TempDir::new().unwrap();
        let mut runner = runner(&tmp);
        runner
            .set_profile(NullProfile)
            .set_output(tmp.path().join("tiles.csv"))
            .add_stage("noop", "nothing", |_| Ok(()))
            .unwrap();

        let summary = runner.run().unwrap();
        assert_eq!(summary.tiles_written, 0);
        assert!(matches!(runner.run(), Err(PipelineError::IllegalState(_))));

        let err = runner.add_stage("noop", "again", |_| Ok(())).unwrap_err();
        assert!(matches!(err, PipelineError::DuplicateStage(_)));
        assert_eq!(runner.stages().len(), 1);
    }

    #[test]
    fn test_existing_output_policy() {
        let tmp = TempDir::new().unwrap();
        let output = tmp.path().join("tiles.csv");
        fs::write(&output, "old").unwrap();

        let mut runner = runner(&tmp);
        runner
            .set_profile(NullProfile)
            .set_output(&output)
            .add_stage("noop", "nothing", |_| Ok(()))
            .unwrap();
        assert!(matches!(runner.run(), Err(PipelineError::OutputExists(_))));
        assert_eq!(fs::read_to_string(&output).unwrap(), "old");

        let mut runner = self::runner(&tmp);
        runner
            .set_profile(NullProfile)
            .overwrite_output(&output)
            .add_stage("noop", "nothing", |_| Ok(()))
            .unwrap();
        runner.run().unwrap();
        assert_eq!(fs::read_to_string(&output).unwrap(), "");
    }

    #[test]
    fn test_unused_source_skipped() {
        let tmp = TempDir::new().unwrap();
        let mut runner = runner(&tmp);
        runner
            .set_profile(NullProfile)
            .set_output(tmp.path().join("tiles.csv"))
            .add_source("ignored", "never read", |_| anyhow::bail!("must not run"))
            .unwrap()
            .add_source("used", "read", |_| Ok(()))
            .unwrap();

        let summary = runner.run().unwrap();
        assert_eq!(summary.stages_run, 1);
        assert_eq!(summary.stages_skipped, 1);
    }

    #[test]
    fn test_stage_failure_aborts_and_cleans_up() {
        let tmp = TempDir::new().unwrap();
        let output = tmp.path().join("tiles.csv");
        let mut runner = runner(&tmp);
        runner
            .set_profile(NullProfile)
            .set_output(&output)
            .add_stage("broken", "fails", |ctx| {
                ctx.node_store().put(1, 2)?;
                anyhow::bail!("source unreadable")
            })
            .unwrap();

        let err = runner.run().unwrap_err();
        assert!(matches!(err, PipelineError::Stage { ref stage, .. } if stage == "broken"));
        assert!(!output.exists());
        assert!(dir_is_empty(&tmp.path().join("tmp")));
    }

    #[test]
    fn test_substage_descriptions_need_stage() {
        let tmp = TempDir::new().unwrap();
        let mut runner = runner(&tmp);
        assert!(runner.add_substage_descriptions("osm", &[("pass1", "nodes")]).is_err());

        runner
            .add_source("osm", "OpenStreetMap", |_| Ok(()))
            .unwrap()
            .add_substage_descriptions("osm", &[("pass1", "nodes"), ("pass2", "ways")])
            .unwrap();
        assert_eq!(runner.stages()[0].substages().len(), 2);
    }

    #[test]
    fn test_missing_input_file_is_config_error() {
        let tmp = TempDir::new().unwrap();
        let mut runner = runner(&tmp);
        runner
            .set_profile(NullProfile)
            .set_output(tmp.path().join("tiles.csv"))
            .set_input_file(tmp.path().join("planet.osm.pbf"))
            .add_stage("noop", "nothing", |_| Ok(()))
            .unwrap();
        assert!(matches!(runner.run(), Err(PipelineError::Config(_))));
    }
}
