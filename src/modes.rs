//! Run modes built atop the pipeline executor
//!
//! One controller, four behaviors:
//! - `run`: execute once, propagate the first aborting failure
//! - `train`: execute n times, persisting accumulated state to a checkpoint
//! - `replay`: re-execute from a named task, reusing the most recent run's
//!   results for everything ordered before it
//! - `test`: execute n times, scoring each run with an evaluator; failed
//!   runs score zero instead of aborting the remaining iterations

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::context::PipelineInputs;
use crate::error::CadreError;
use crate::evaluator::{Evaluator, Score};
use crate::executor::{PipelineExecutor, PipelineRun};
use crate::run_store::{write_checkpoint, RunStore};

/// Tagged run-mode selector
pub enum RunMode {
    Run,
    Train {
        iterations: u32,
        checkpoint: PathBuf,
    },
    Replay {
        from_task: String,
    },
    Test {
        iterations: u32,
        evaluator: Box<dyn Evaluator>,
    },
}

/// What a mode hands back to the caller
pub enum ModeReport {
    Single(PipelineRun),
    Training(TrainingReport),
    Test(TestReport),
}

/// Accumulated learning state persisted to the checkpoint after every
/// training run
#[derive(Debug, Serialize, Deserialize)]
pub struct TrainingState {
    pub pipeline: String,
    pub completed_iterations: u32,
    pub iterations: Vec<TrainingIteration>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TrainingIteration {
    pub iteration: u32,
    pub run_sequence: u64,
    pub completed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub final_output: Option<String>,
}

impl TrainingState {
    fn new(pipeline: impl Into<String>) -> Self {
        Self {
            pipeline: pipeline.into(),
            completed_iterations: 0,
            iterations: Vec::new(),
            updated_at: Utc::now(),
        }
    }

    fn record(&mut self, iteration: u32, run: &PipelineRun) {
        self.completed_iterations = iteration;
        self.iterations.push(TrainingIteration {
            iteration,
            run_sequence: run.sequence,
            completed: run.is_completed(),
            final_output: run.final_output().map(str::to_string),
        });
        self.updated_at = Utc::now();
    }
}

/// Summary returned by `train`
#[derive(Debug, Serialize)]
pub struct TrainingReport {
    pub pipeline: String,
    pub iterations: u32,
    pub checkpoint: PathBuf,
    /// Sequence numbers of the persisted runs, in order
    pub run_sequences: Vec<u64>,
}

/// Summary returned by `test`: always exactly as many iterations as asked
#[derive(Debug, Serialize)]
pub struct TestReport {
    pub pipeline: String,
    pub iterations: Vec<TestIteration>,
}

#[derive(Debug, Serialize)]
pub struct TestIteration {
    pub iteration: u32,
    pub score: Score,
    /// Whether the pipeline run itself completed
    pub completed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
}

impl TestReport {
    pub fn scores(&self) -> Vec<f64> {
        self.iterations.iter().map(|i| i.score.value).collect()
    }

    pub fn average_score(&self) -> f64 {
        if self.iterations.is_empty() {
            return 0.0;
        }
        self.scores().iter().sum::<f64>() / self.iterations.len() as f64
    }
}

/// Wraps the executor with the four run modes
pub struct ModeController {
    executor: PipelineExecutor,
    store: RunStore,
}

impl ModeController {
    pub fn new(executor: PipelineExecutor, store: RunStore) -> Self {
        Self { executor, store }
    }

    pub fn executor(&self) -> &PipelineExecutor {
        &self.executor
    }

    /// Dispatch on the tagged mode variant
    pub async fn execute(
        &self,
        mode: RunMode,
        inputs: &PipelineInputs,
    ) -> Result<ModeReport, CadreError> {
        match mode {
            RunMode::Run => self.run(inputs).await.map(ModeReport::Single),
            RunMode::Train {
                iterations,
                checkpoint,
            } => self
                .train(iterations, &checkpoint, inputs)
                .await
                .map(ModeReport::Training),
            RunMode::Replay { from_task } => {
                self.replay(&from_task).await.map(ModeReport::Single)
            }
            RunMode::Test {
                iterations,
                evaluator,
            } => self
                .test(iterations, evaluator.as_ref(), inputs)
                .await
                .map(ModeReport::Test),
        }
    }

    /// Execute once; an aborted run is persisted, then surfaced as an error
    pub async fn run(&self, inputs: &PipelineInputs) -> Result<PipelineRun, CadreError> {
        let mut run = self.executor.execute(inputs).await?;
        self.store.save(&mut run)?;
        self.check_completed(run)
    }

    /// Execute `iterations` times, writing the accumulated training state to
    /// `checkpoint` after every run. The checkpoint is written once up front
    /// so an unwritable target fails before any worker is invoked.
    pub async fn train(
        &self,
        iterations: u32,
        checkpoint: &Path,
        inputs: &PipelineInputs,
    ) -> Result<TrainingReport, CadreError> {
        if iterations < 1 {
            return Err(CadreError::InvalidArgument(
                "train requires at least 1 iteration".to_string(),
            ));
        }

        let pipeline = self.executor.pipeline().name.clone();
        let mut state = TrainingState::new(&pipeline);
        write_checkpoint(checkpoint, &state)?;

        let mut run_sequences = Vec::with_capacity(iterations as usize);
        for iteration in 1..=iterations {
            info!(iteration, total = iterations, "training run");
            let mut run = self.executor.execute(inputs).await?;
            self.store.save(&mut run)?;
            state.record(iteration, &run);
            write_checkpoint(checkpoint, &state)?;

            let run = self.check_completed(run)?;
            run_sequences.push(run.sequence);
        }

        Ok(TrainingReport {
            pipeline,
            iterations,
            checkpoint: checkpoint.to_path_buf(),
            run_sequences,
        })
    }

    /// Re-execute from `from_task` onward, reusing the most recent recorded
    /// run's results (and inputs) for every task ordered before it
    pub async fn replay(&self, from_task: &str) -> Result<PipelineRun, CadreError> {
        let pipeline = self.executor.pipeline();
        let position =
            pipeline
                .position(from_task)
                .ok_or_else(|| CadreError::UnknownIdentifier {
                    kind: "task",
                    id: from_task.to_string(),
                })?;

        let prior = self
            .store
            .latest(&pipeline.name)?
            .ok_or_else(|| CadreError::NoPriorRun {
                pipeline: pipeline.name.clone(),
            })?;

        let mut seed = Vec::with_capacity(position);
        for task in &pipeline.tasks_ordered()[..position] {
            let result = prior
                .result_for(&task.id)
                .filter(|r| r.success)
                .cloned()
                .ok_or_else(|| {
                    CadreError::InvalidArgument(format!(
                        "prior run {} has no successful result for task '{}'; \
                         replay from an earlier task",
                        prior.sequence, task.id
                    ))
                })?;
            seed.push(result);
        }

        info!(from_task, reused = seed.len(), "replaying pipeline");
        let inputs = prior.inputs.clone();
        let mut run = self.executor.execute_seeded(&inputs, seed).await?;
        self.store.save(&mut run)?;
        self.check_completed(run)
    }

    /// Execute `iterations` times and score each run's aggregated output.
    /// This is the one mode that absorbs run failures: a failed run scores
    /// zero and the remaining iterations still execute.
    pub async fn test(
        &self,
        iterations: u32,
        evaluator: &dyn Evaluator,
        inputs: &PipelineInputs,
    ) -> Result<TestReport, CadreError> {
        if iterations < 1 {
            return Err(CadreError::InvalidArgument(
                "test requires at least 1 iteration".to_string(),
            ));
        }

        let pipeline = self.executor.pipeline();
        // The final task's expected output doubles as the reference criteria
        let criteria = pipeline
            .tasks_ordered()
            .last()
            .map(|t| t.expected_output.clone())
            .unwrap_or_default();

        let mut report = TestReport {
            pipeline: pipeline.name.clone(),
            iterations: Vec::with_capacity(iterations as usize),
        };

        for iteration in 1..=iterations {
            info!(iteration, total = iterations, "test run");
            let entry = match self.executor.execute(inputs).await {
                Err(error) => TestIteration {
                    iteration,
                    score: Score::failing(error.to_string()),
                    completed: false,
                    output: None,
                },
                Ok(mut run) => {
                    self.store.save(&mut run)?;
                    if run.is_completed() {
                        let output = run.final_output().unwrap_or_default().to_string();
                        let score = match evaluator.score(&output, &criteria).await {
                            Ok(score) => score,
                            Err(error) => Score::failing(format!("evaluator failed: {error:#}")),
                        };
                        TestIteration {
                            iteration,
                            score,
                            completed: true,
                            output: Some(output),
                        }
                    } else {
                        let cause = run
                            .abort_info()
                            .map(|(task_id, cause)| format!("aborted at task '{task_id}': {cause}"))
                            .unwrap_or_else(|| "run did not complete".to_string());
                        TestIteration {
                            iteration,
                            score: Score::failing(cause),
                            completed: false,
                            output: None,
                        }
                    }
                }
            };
            report.iterations.push(entry);
        }

        Ok(report)
    }

    fn check_completed(&self, run: PipelineRun) -> Result<PipelineRun, CadreError> {
        if let Some((task_id, cause)) = run.abort_info() {
            return Err(CadreError::Execution {
                task_id: task_id.to_string(),
                cause: cause.to_string(),
            });
        }
        Ok(run)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::Pipeline;
    use crate::run_store::read_checkpoint;
    use crate::worker::MockWorker;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn controller(dir: &TempDir) -> (ModeController, Arc<MockWorker>) {
        let yaml = r#"
name: review
capability: mock
workers:
  - id: reviewer
    role: "Code reviewer"
    objective: "Review code"
tasks:
  - id: review
    worker: reviewer
    instructions: "Review ${input.codebase_path}"
    expected_output: "Findings"
  - id: report
    worker: reviewer
    instructions: "Summarize"
    expected_output: "A markdown report"
    context: [review]
"#;
        let pipeline = Arc::new(Pipeline::from_yaml(yaml).unwrap());
        let executor = PipelineExecutor::new(pipeline);
        let mock = Arc::new(MockWorker::new());
        executor.insert_capability("mock", mock.clone());
        let store = RunStore::new(dir.path().join("runs"));
        (ModeController::new(executor, store), mock)
    }

    #[tokio::test]
    async fn run_persists_and_returns_the_run() {
        let dir = TempDir::new().unwrap();
        let (controller, _mock) = controller(&dir);

        let run = controller.run(&PipelineInputs::new()).await.unwrap();
        assert!(run.is_completed());
        assert_eq!(run.sequence, 1);
    }

    #[tokio::test]
    async fn run_surfaces_abort_as_execution_error() {
        let dir = TempDir::new().unwrap();
        let (controller, mock) = controller(&dir);
        mock.queue_failure("backend down");

        let err = controller.run(&PipelineInputs::new()).await.unwrap_err();
        assert!(matches!(err, CadreError::Execution { .. }));
        assert!(err.to_string().contains("review"));
    }

    #[tokio::test]
    async fn train_writes_checkpoint_per_iteration() {
        let dir = TempDir::new().unwrap();
        let (controller, _mock) = controller(&dir);
        let checkpoint = dir.path().join("learn.json");

        let report = controller
            .train(3, &checkpoint, &PipelineInputs::new())
            .await
            .unwrap();

        assert_eq!(report.iterations, 3);
        assert_eq!(report.run_sequences, vec![1, 2, 3]);

        let state: TrainingState = read_checkpoint(&checkpoint).unwrap();
        assert_eq!(state.completed_iterations, 3);
        assert_eq!(state.iterations.len(), 3);
        assert!(state.iterations.iter().all(|i| i.completed));
    }

    #[tokio::test]
    async fn train_rejects_zero_iterations() {
        let dir = TempDir::new().unwrap();
        let (controller, mock) = controller(&dir);

        let err = controller
            .train(0, &dir.path().join("learn.json"), &PipelineInputs::new())
            .await
            .unwrap_err();
        assert!(matches!(err, CadreError::InvalidArgument(_)));
        assert_eq!(mock.invocation_count(), 0);
    }

    #[tokio::test]
    async fn train_fails_fast_on_unwritable_checkpoint() {
        let dir = TempDir::new().unwrap();
        let (controller, mock) = controller(&dir);

        let err = controller
            .train(
                2,
                Path::new("/nonexistent-dir/learn.json"),
                &PipelineInputs::new(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, CadreError::Io(_)));
        // No worker was invoked before the writability probe failed
        assert_eq!(mock.invocation_count(), 0);
    }

    #[tokio::test]
    async fn replay_reuses_prior_results() {
        let dir = TempDir::new().unwrap();
        let (controller, mock) = controller(&dir);
        mock.queue_response("original findings");
        mock.queue_response("original report");

        let mut inputs = PipelineInputs::new();
        inputs.insert("codebase_path", "/repo");
        let first = controller.run(&inputs).await.unwrap();

        mock.queue_response("fresh report");
        let replayed = controller.replay("report").await.unwrap();

        // The reused result is identical to the prior run's
        assert_eq!(replayed.results[0], first.results[0]);
        assert_eq!(replayed.final_output(), Some("fresh report"));
        // 2 invocations for the first run, 1 for the replay
        assert_eq!(mock.invocation_count(), 3);
    }

    #[tokio::test]
    async fn replay_unknown_task_rejected() {
        let dir = TempDir::new().unwrap();
        let (controller, _mock) = controller(&dir);

        let err = controller.replay("ghost").await.unwrap_err();
        assert!(matches!(
            err,
            CadreError::UnknownIdentifier { kind: "task", .. }
        ));
    }

    #[tokio::test]
    async fn replay_without_history_rejected() {
        let dir = TempDir::new().unwrap();
        let (controller, _mock) = controller(&dir);

        let err = controller.replay("report").await.unwrap_err();
        assert!(matches!(err, CadreError::NoPriorRun { .. }));
    }

    #[tokio::test]
    async fn test_mode_absorbs_failures() {
        let dir = TempDir::new().unwrap();
        let (controller, mock) = controller(&dir);
        // Iteration 2 fails at the first task; 1 and 3 succeed
        mock.queue_response("r1");
        mock.queue_response("rep1");
        mock.queue_failure("flaky backend");
        mock.queue_response("r3");
        mock.queue_response("rep3");

        let evaluator = crate::evaluator::StaticEvaluator::new(9.0);
        let report = controller
            .test(3, &evaluator, &PipelineInputs::new())
            .await
            .unwrap();

        assert_eq!(report.iterations.len(), 3);
        assert_eq!(report.scores(), vec![9.0, 0.0, 9.0]);
        assert!(!report.iterations[1].completed);
        assert_eq!(report.average_score(), 6.0);
    }

    #[tokio::test]
    async fn test_mode_rejects_zero_iterations() {
        let dir = TempDir::new().unwrap();
        let (controller, _mock) = controller(&dir);

        let evaluator = crate::evaluator::StaticEvaluator::new(5.0);
        assert!(controller
            .test(0, &evaluator, &PipelineInputs::new())
            .await
            .is_err());
    }
}
