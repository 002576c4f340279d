//! # AWS CloudFormation Client
//!
//! [`StackDescriber`] implementation that reads the outputs of a deployed
//! stack. The reconciler uses the `ServiceEndpoint` output to recover the
//! deployed REST API identifier.

use anyhow::{Context, Result};
use async_trait::async_trait;
use aws_sdk_cloudformation::Client as CloudFormationClient;

use crate::provider::{StackDescriber, StackOutput};

/// AWS CloudFormation implementation of [`StackDescriber`].
pub struct AwsStacks {
    client: CloudFormationClient,
    region: String,
}

impl std::fmt::Debug for AwsStacks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AwsStacks")
            .field("region", &self.region)
            .finish_non_exhaustive()
    }
}

impl AwsStacks {
    /// Create a client from the default credential chain with an explicit
    /// region.
    pub async fn new(region: &str) -> Self {
        let sdk_config = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .region(aws_config::Region::new(region.to_string()))
            .load()
            .await;

        Self {
            client: CloudFormationClient::new(&sdk_config),
            region: region.to_string(),
        }
    }
}

#[async_trait]
impl StackDescriber for AwsStacks {
    async fn stack_outputs(&self, stack_name: &str) -> Result<Vec<StackOutput>> {
        let response = self
            .client
            .describe_stacks()
            .stack_name(stack_name)
            .send()
            .await
            .with_context(|| format!("Failed to describe stack {stack_name}"))?;

        let stack = response
            .stacks()
            .first()
            .with_context(|| format!("Stack {stack_name} not found"))?;

        let outputs = stack
            .outputs()
            .iter()
            .filter_map(|output| {
                Some(StackOutput {
                    key: output.output_key()?.to_string(),
                    value: output.output_value()?.to_string(),
                })
            })
            .collect();
        Ok(outputs)
    }
}
