/// Workflow Module
///
/// Starting executions of the orchestrating state machine.
pub mod sfn;

pub use sfn::StepFunctionsStarter;

use crate::models::WorkflowInput;
use std::future::Future;

pub trait WorkflowStarter {
    /// Start an execution with the given input and return its execution ARN
    fn start_execution(&self, input: &WorkflowInput) -> impl Future<Output = anyhow::Result<String>> + Send;
}
