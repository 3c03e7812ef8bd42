use super::WorkflowStarter;
use crate::config::WorkflowConfig;
use crate::models::WorkflowInput;
use anyhow::{Context, Result};
use aws_sdk_sfn::error::DisplayErrorContext;
use aws_sdk_sfn::Client;

/// Step Functions client bound to one state machine
#[derive(Clone)]
pub struct StepFunctionsStarter {
    client: Client,
    state_machine_arn: String,
}

impl StepFunctionsStarter {
    pub async fn new(config: &WorkflowConfig) -> Self {
        let sdk_config = crate::aws::load_sdk_config().await;
        Self { client: Client::new(&sdk_config), state_machine_arn: config.state_machine_arn.clone() }
    }
}

impl WorkflowStarter for StepFunctionsStarter {
    async fn start_execution(&self, input: &WorkflowInput) -> Result<String> {
        let payload = serde_json::to_string(input).context("Failed to serialize workflow input")?;

        tracing::info!("Invoking the StepFunction {}", self.state_machine_arn);

        let response = self
            .client
            .start_execution()
            .state_machine_arn(&self.state_machine_arn)
            .input(payload)
            .send()
            .await
            .map_err(|e| anyhow::anyhow!("{}", DisplayErrorContext(&e)))
            .context("Failed to start workflow execution")?;

        Ok(response.execution_arn().to_string())
    }
}
