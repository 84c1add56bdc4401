//! End-to-end executor tests against the mock worker capability
//!
//! Covers the core execution contract: declared order is execution order,
//! upstream outputs are injected as context, the first failure aborts the
//! run before any downstream task is invoked, and composition is
//! deterministic.

use std::sync::Arc;

use cadre::worker::MockWorker;
use cadre::{Pipeline, PipelineExecutor, PipelineInputs, TaskState};

/// Three-task review pipeline: review -> security -> report, where report
/// consumes both upstream outputs
fn review_pipeline() -> Arc<Pipeline> {
    let yaml = r#"
name: review
capability: mock
workers:
  - id: reviewer
    role: "Senior code reviewer"
    objective: "Find defects"
  - id: analyst
    role: "Security analyst"
    objective: "Find vulnerabilities"
  - id: architect
    role: "Software architect"
    objective: "Plan the refactor"
tasks:
  - id: review
    worker: reviewer
    instructions: "Review the codebase at ${input.codebase_path}"
    expected_output: "Findings"
  - id: security
    worker: analyst
    instructions: "Audit the codebase"
    expected_output: "Vulnerabilities"
    context: [review]
  - id: report
    worker: architect
    instructions: "Write the final report"
    expected_output: "A refactor plan"
    context: [review, security]
"#;
    Arc::new(Pipeline::from_yaml(yaml).unwrap())
}

fn inputs() -> PipelineInputs {
    let mut inputs = PipelineInputs::new();
    inputs.insert("codebase_path", "/repo");
    inputs
}

#[tokio::test]
async fn workers_invoked_in_declared_order_with_propagated_context() {
    let executor = PipelineExecutor::new(review_pipeline());
    let mock = Arc::new(MockWorker::with_responses(vec![
        "review findings",
        "security findings",
        "final plan",
    ]));
    executor.insert_capability("mock", mock.clone());

    let run = executor.execute(&inputs()).await.unwrap();

    assert!(run.is_completed());
    assert_eq!(run.final_output(), Some("final plan"));

    let requests = mock.requests();
    assert_eq!(requests.len(), 3);

    // reviewer first, then analyst, then architect
    assert_eq!(requests[0].role, "Senior code reviewer");
    assert_eq!(requests[1].role, "Security analyst");
    assert_eq!(requests[2].role, "Software architect");

    // review saw the resolved input and no context
    assert_eq!(requests[0].instructions, "Review the codebase at /repo");

    // security saw review's output appended as context
    assert!(requests[1].instructions.contains("context from task 'review'"));
    assert!(requests[1].instructions.contains("review findings"));

    // report saw both upstream outputs, in declared order
    let report_instructions = &requests[2].instructions;
    let review_pos = report_instructions.find("review findings").unwrap();
    let security_pos = report_instructions.find("security findings").unwrap();
    assert!(review_pos < security_pos);
}

#[tokio::test]
async fn second_task_failure_leaves_third_uninvoked() {
    let executor = PipelineExecutor::new(review_pipeline());
    let mock = Arc::new(MockWorker::new());
    mock.queue_response("review findings");
    mock.queue_failure("analyst backend unreachable");
    executor.insert_capability("mock", mock.clone());

    let run = executor.execute(&inputs()).await.unwrap();

    // Exactly two results: first succeeded, second failed
    assert_eq!(run.results.len(), 2);
    assert!(run.results[0].success);
    assert!(!run.results[1].success);
    assert_eq!(run.task_state("review"), TaskState::Succeeded);
    assert_eq!(run.task_state("security"), TaskState::Failed);
    assert_eq!(run.task_state("report"), TaskState::Pending);

    // The third worker was never invoked
    assert_eq!(mock.invocation_count(), 2);

    let (task_id, cause) = run.abort_info().unwrap();
    assert_eq!(task_id, "security");
    assert!(cause.contains("analyst backend unreachable"));
}

#[tokio::test]
async fn each_task_invoked_exactly_once_per_run() {
    let executor = PipelineExecutor::new(review_pipeline());
    let mock = Arc::new(MockWorker::new());
    executor.insert_capability("mock", mock.clone());

    executor.execute(&inputs()).await.unwrap();

    assert_eq!(mock.invocation_count(), 3);
    let roles: Vec<String> = mock.requests().iter().map(|r| r.role.clone()).collect();
    assert_eq!(
        roles,
        vec![
            "Senior code reviewer",
            "Security analyst",
            "Software architect"
        ],
        "every task invoked exactly once, in order"
    );
}

#[tokio::test]
async fn identical_inputs_and_outputs_compose_identical_instructions() {
    let mock_responses = vec!["review findings", "security findings", "final plan"];

    let first_executor = PipelineExecutor::new(review_pipeline());
    let first_mock = Arc::new(MockWorker::with_responses(mock_responses.clone()));
    first_executor.insert_capability("mock", first_mock.clone());
    first_executor.execute(&inputs()).await.unwrap();

    let second_executor = PipelineExecutor::new(review_pipeline());
    let second_mock = Arc::new(MockWorker::with_responses(mock_responses));
    second_executor.insert_capability("mock", second_mock.clone());
    second_executor.execute(&inputs()).await.unwrap();

    let first_requests = first_mock.requests();
    let second_requests = second_mock.requests();
    for (a, b) in first_requests.iter().zip(&second_requests) {
        assert_eq!(a.instructions, b.instructions);
        assert_eq!(a.expected_output, b.expected_output);
    }
}

#[tokio::test]
async fn expected_output_travels_with_the_invocation() {
    let executor = PipelineExecutor::new(review_pipeline());
    let mock = Arc::new(MockWorker::new());
    executor.insert_capability("mock", mock.clone());

    executor.execute(&inputs()).await.unwrap();

    let requests = mock.requests();
    assert_eq!(requests[0].expected_output, "Findings");
    assert_eq!(requests[2].expected_output, "A refactor plan");
}

#[test]
fn bundled_code_review_pipeline_is_valid() {
    let pipeline =
        Pipeline::from_file(std::path::Path::new("pipelines/code-review.cadre.yaml")).unwrap();
    assert_eq!(pipeline.name, "code-review");
    assert_eq!(pipeline.task_count(), 5);
    assert_eq!(pipeline.worker_count(), 5);
    // The synthesis task consumes all three review outputs
    let strategy = pipeline.task("refactor_strategy").unwrap();
    assert_eq!(
        strategy.context,
        vec!["code_review", "security_audit", "performance_review"]
    );
}
