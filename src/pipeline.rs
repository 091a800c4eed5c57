//! Archive-to-report pipeline
//!
//! Three independent stages connected by plain data:
//!
//! 1. an [`ArchiveReader`] turns an archive into [`SimulationTask`]s,
//! 2. a [`SimulationExecutor`] turns each task into a [`Report`](crate::simulation::result::Report),
//! 3. a [`ReportWriter`] persists each report below the output directory.
//!
//! All tasks are read before anything is written, so an unreadable or malformed
//! archive leaves the output directory untouched. Tasks run one at a time in archive
//! order and the first failure aborts the run.

use std::fs;
use std::path::{Path, PathBuf};

use itertools::Itertools;
use log::info;

use crate::combine::archive::{resolve_relative, CombineArchive};
use crate::combine::error::ArchiveError;
use crate::error::AdapterError;
use crate::report::writer::{CsvReportWriter, ReportWriter};
use crate::sbml::reader::read_sbml;
use crate::sedml::error::SedmlError;
use crate::sedml::reader::read_sedml;
use crate::simulation::runner::{OdeExecutor, SimulationExecutor};
use crate::simulation::task::SimulationTask;

/// Reads the simulation tasks described by an archive
pub trait ArchiveReader {
    fn read_tasks(&self, archive: &Path) -> Result<Vec<SimulationTask>, AdapterError>;
}

/// Reads COMBINE/OMEX archives with SED-ML experiments over SBML models
#[derive(Debug, Clone, Copy, Default)]
pub struct OmexReader;

impl ArchiveReader for OmexReader {
    fn read_tasks(&self, path: &Path) -> Result<Vec<SimulationTask>, AdapterError> {
        let archive = CombineArchive::open(path)?;
        let mut located: Vec<(String, SimulationTask)> = Vec::new();

        for location in archive.sedml_locations()? {
            let experiment = |source: SedmlError| AdapterError::Experiment {
                location: location.clone(),
                source,
            };

            let xml = archive.entry_as_string(&location)?;
            let document = read_sedml(&xml).map_err(experiment)?;

            let stem = Path::new(&location)
                .file_stem()
                .map(|stem| stem.to_string_lossy().into_owned())
                .unwrap_or_else(|| location.clone());

            let tasks = document
                .simulation_tasks(&stem, |model| {
                    let model_location = resolve_relative(&location, &model.source);
                    let sbml = archive.entry_as_string(&model_location).map_err(|source| {
                        SedmlError::ModelEntry {
                            model: model.id.clone(),
                            source,
                        }
                    })?;

                    read_sbml(&sbml).map_err(|source| SedmlError::ModelError {
                        model: model.id.clone(),
                        source,
                    })
                })
                .map_err(experiment)?;

            info!("{}: {} report(s)", location, tasks.len());
            located.extend(tasks.into_iter().map(|task| (location.clone(), task)));
        }

        if located.is_empty() {
            return Err(ArchiveError::NoSimulationTask.into());
        }

        let duplicate = located
            .iter()
            .duplicates_by(|(_, task)| task.id.clone())
            .next();

        if let Some((location, task)) = duplicate {
            return Err(AdapterError::Experiment {
                location: location.clone(),
                source: SedmlError::DuplicateReport(task.id.clone()),
            });
        }

        Ok(located.into_iter().map(|(_, task)| task).collect())
    }
}

/// The pipeline run by the command-line adapter
pub type DefaultPipeline = Pipeline<OmexReader, OdeExecutor, CsvReportWriter>;

/// The adapter pipeline
#[derive(Debug, Clone, Default)]
pub struct Pipeline<R = OmexReader, E = OdeExecutor, W = CsvReportWriter> {
    reader: R,
    executor: E,
    writer: W,
}

impl<R, E, W> Pipeline<R, E, W>
where
    R: ArchiveReader,
    E: SimulationExecutor,
    W: ReportWriter,
{
    pub fn new(reader: R, executor: E, writer: W) -> Self {
        Self {
            reader,
            executor,
            writer,
        }
    }

    /// Executes every report of `archive` and writes it below `out_dir`
    ///
    /// Returns the paths of the written report files, in archive order.
    ///
    /// # Errors
    ///
    /// Returns the first [`AdapterError`] raised by any stage.
    pub fn run(&self, archive: &Path, out_dir: &Path) -> Result<Vec<PathBuf>, AdapterError> {
        let tasks = self.reader.read_tasks(archive)?;

        fs::create_dir_all(out_dir).map_err(|source| AdapterError::Io {
            path: out_dir.to_path_buf(),
            source,
        })?;

        let mut written = Vec::with_capacity(tasks.len());
        for task in &tasks {
            let report = self
                .executor
                .execute(task)
                .map_err(|source| AdapterError::Simulation {
                    report: task.id.clone(),
                    source,
                })?;

            let path = self
                .writer
                .write(&report, out_dir)
                .map_err(|source| AdapterError::Report {
                    report: task.id.clone(),
                    source,
                })?;

            info!("Wrote {}", path.display());
            written.push(path);
        }

        Ok(written)
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;

    use crate::error::ErrorKind;
    use crate::sbml::model::SBMLModel;
    use crate::simulation::error::SimulationError;
    use crate::simulation::result::Report;
    use crate::simulation::task::{Algorithm, TimeCourse};

    use super::*;

    /// Serves in-memory tasks
    struct StaticReader(Vec<SimulationTask>);

    impl ArchiveReader for StaticReader {
        fn read_tasks(&self, _: &Path) -> Result<Vec<SimulationTask>, AdapterError> {
            Ok(self.0.clone())
        }
    }

    /// Reports a constant column per task, failing for ids starting with `fail`
    struct ConstantExecutor;

    impl SimulationExecutor for ConstantExecutor {
        fn execute(&self, task: &SimulationTask) -> Result<Report, SimulationError> {
            if task.id.starts_with("fail") {
                return Err(SimulationError::NonFinite { time: 0.0 });
            }
            let time = task.time_course.time_points();
            let mut report = Report::new(task.id.clone(), time.clone());
            report.push_column("x", vec![1.0; time.len()]);
            Ok(report)
        }
    }

    /// Records the ids of written reports
    #[derive(Default)]
    struct RecordingWriter(RefCell<Vec<String>>);

    impl ReportWriter for &RecordingWriter {
        fn write(
            &self,
            report: &Report,
            out_dir: &Path,
        ) -> Result<PathBuf, crate::report::error::ReportError> {
            self.0.borrow_mut().push(report.id.clone());
            Ok(out_dir.join(&report.id))
        }
    }

    fn task(id: &str) -> SimulationTask {
        SimulationTask {
            id: id.to_string(),
            model_source: "model.xml".to_string(),
            model: SBMLModel::default(),
            time_course: TimeCourse::new(0.0, 0.0, 1.0, 2).unwrap(),
            algorithm: Algorithm::new("KISAO_0000019"),
            outputs: Vec::new(),
        }
    }

    #[test]
    fn test_runs_tasks_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("out");
        let writer = RecordingWriter::default();

        let pipeline = Pipeline::new(
            StaticReader(vec![task("simulation_1"), task("simulation_2")]),
            ConstantExecutor,
            &writer,
        );
        let paths = pipeline.run(Path::new("unused.omex"), &out).unwrap();

        assert_eq!(paths.len(), 2);
        assert!(out.is_dir());
        assert_eq!(*writer.0.borrow(), vec!["simulation_1", "simulation_2"]);
    }

    #[test]
    fn test_first_failure_aborts() {
        let dir = tempfile::tempdir().unwrap();
        let writer = RecordingWriter::default();

        let pipeline = Pipeline::new(
            StaticReader(vec![task("fail_1"), task("simulation_2")]),
            ConstantExecutor,
            &writer,
        );
        let err = pipeline.run(Path::new("unused.omex"), dir.path()).unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Simulation);
        assert!(writer.0.borrow().is_empty());
    }

    #[test]
    fn test_missing_archive_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("out");

        let err = DefaultPipeline::default()
            .run(&dir.path().join("missing.omex"), &out)
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Archive);
        assert!(!out.exists());
    }
}
