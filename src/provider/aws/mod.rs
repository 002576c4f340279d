//! # AWS API Gateway Client
//!
//! [`GatewayOps`] implementation over the official AWS SDK.
//!
//! This module provides functionality to:
//! - List API keys, usage plans, and plan-key associations page by page
//! - Create keys, usage plans, and plan-key associations
//! - Link a REST API stage to a usage plan via a patch operation
//! - Delete keys and usage plans on the remove path
//!
//! A `NotFoundException` from the list operations is translated into an
//! empty terminal page so callers see absence as a value, not an error.

use anyhow::{Context, Result};
use async_trait::async_trait;
use aws_sdk_apigateway::error::{ProvideErrorMetadata, SdkError};
use aws_sdk_apigateway::types::{Op, PatchOperation, QuotaPeriodType, QuotaSettings, ThrottleSettings};
use aws_sdk_apigateway::Client as ApiGatewayClient;
use tracing::info;

use crate::constants::{ADD_LOG_PREFIX, API_STAGES_PATCH_PATH, USAGE_PLAN_KEY_TYPE};
use crate::pagination::Page;
use crate::provider::{
    ApiKeySummary, ApiStagePair, CreatedKey, GatewayOps, UsagePlanKeySummary, UsagePlanRequest,
    UsagePlanSummary,
};

pub mod cloudformation;
pub mod kms;

pub use cloudformation::AwsStacks;
pub use kms::AwsKms;

/// AWS API Gateway implementation of [`GatewayOps`].
pub struct AwsGateway {
    client: ApiGatewayClient,
    region: String,
}

impl std::fmt::Debug for AwsGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AwsGateway")
            .field("region", &self.region)
            .finish_non_exhaustive()
    }
}

impl AwsGateway {
    /// Create a client from the default credential chain with an explicit
    /// region.
    pub async fn new(region: &str) -> Self {
        let sdk_config = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .region(aws_config::Region::new(region.to_string()))
            .load()
            .await;

        Self {
            client: ApiGatewayClient::new(&sdk_config),
            region: region.to_string(),
        }
    }
}

/// Whether a service error carries the `NotFoundException` code.
fn is_not_found<E, R>(err: &SdkError<E, R>) -> bool
where
    E: ProvideErrorMetadata,
{
    err.as_service_error().and_then(|service| service.code()) == Some("NotFoundException")
}

#[async_trait]
impl GatewayOps for AwsGateway {
    async fn list_api_keys(&self, position: Option<String>) -> Result<Page<ApiKeySummary>> {
        match self
            .client
            .get_api_keys()
            .set_position(position)
            .send()
            .await
        {
            Ok(response) => {
                let items = response
                    .items()
                    .iter()
                    .filter_map(|key| {
                        Some(ApiKeySummary {
                            id: key.id()?.to_string(),
                            name: key.name()?.to_string(),
                        })
                    })
                    .collect();
                Ok(Page {
                    items,
                    position: response.position().map(ToString::to_string),
                })
            }
            Err(e) if is_not_found(&e) => Ok(Page::empty()),
            Err(e) => Err(anyhow::anyhow!("Failed to list api keys: {e}")),
        }
    }

    async fn list_usage_plans(&self, position: Option<String>) -> Result<Page<UsagePlanSummary>> {
        match self
            .client
            .get_usage_plans()
            .set_position(position)
            .send()
            .await
        {
            Ok(response) => {
                let items = response
                    .items()
                    .iter()
                    .filter_map(|plan| {
                        let api_stages = plan
                            .api_stages()
                            .iter()
                            .filter_map(|stage| {
                                Some(ApiStagePair {
                                    api_id: stage.api_id()?.to_string(),
                                    stage: stage.stage()?.to_string(),
                                })
                            })
                            .collect();
                        Some(UsagePlanSummary {
                            id: plan.id()?.to_string(),
                            name: plan.name()?.to_string(),
                            api_stages,
                        })
                    })
                    .collect();
                Ok(Page {
                    items,
                    position: response.position().map(ToString::to_string),
                })
            }
            Err(e) if is_not_found(&e) => Ok(Page::empty()),
            Err(e) => Err(anyhow::anyhow!("Failed to list usage plans: {e}")),
        }
    }

    async fn list_usage_plan_keys(
        &self,
        plan_id: &str,
        position: Option<String>,
    ) -> Result<Page<UsagePlanKeySummary>> {
        let response = self
            .client
            .get_usage_plan_keys()
            .usage_plan_id(plan_id)
            .set_position(position)
            .send()
            .await
            .with_context(|| format!("Failed to list keys of usage plan {plan_id}"))?;

        let items = response
            .items()
            .iter()
            .filter_map(|key| {
                Some(UsagePlanKeySummary {
                    id: key.id()?.to_string(),
                })
            })
            .collect();
        Ok(Page {
            items,
            position: response.position().map(ToString::to_string),
        })
    }

    async fn create_api_key(&self, name: &str, value: Option<&str>) -> Result<CreatedKey> {
        let response = self
            .client
            .create_api_key()
            .name(name)
            .enabled(true)
            .set_value(value.map(ToString::to_string))
            .send()
            .await
            .with_context(|| format!("Failed to create new api key {name}"))?;

        let id = response
            .id()
            .context("Key creation response is missing an id")?
            .to_string();
        info!("{ADD_LOG_PREFIX}: Created new api key {name}:{id}");

        Ok(CreatedKey {
            id,
            value: response.value().map(ToString::to_string),
        })
    }

    async fn create_usage_plan(&self, request: &UsagePlanRequest) -> Result<String> {
        let mut builder = self.client.create_usage_plan().name(&request.name);

        if let Some(template) = &request.template {
            if let Some(quota) = &template.quota {
                builder = builder.quota(
                    QuotaSettings::builder()
                        .set_limit(quota.limit)
                        .set_offset(quota.offset)
                        .set_period(quota.period.as_deref().map(QuotaPeriodType::from))
                        .build(),
                );
            }
            if let Some(throttle) = &template.throttle {
                builder = builder.throttle(
                    ThrottleSettings::builder()
                        .set_burst_limit(throttle.burst_limit)
                        .set_rate_limit(throttle.rate_limit)
                        .build(),
                );
            }
        }

        let response = builder
            .send()
            .await
            .with_context(|| format!("Failed to create new usage plan {}", request.name))?;

        let id = response
            .id()
            .context("Usage plan creation response is missing an id")?
            .to_string();
        Ok(id)
    }

    async fn create_usage_plan_key(&self, key_id: &str, plan_id: &str) -> Result<()> {
        self.client
            .create_usage_plan_key()
            .usage_plan_id(plan_id)
            .key_id(key_id)
            .key_type(USAGE_PLAN_KEY_TYPE)
            .send()
            .await
            .with_context(|| {
                format!("Failed to associate api key {key_id} with usage plan {plan_id}")
            })?;
        Ok(())
    }

    async fn add_stage_to_plan(&self, plan_id: &str, api_id: &str, stage: &str) -> Result<()> {
        self.client
            .update_usage_plan()
            .usage_plan_id(plan_id)
            .patch_operations(
                PatchOperation::builder()
                    .op(Op::Add)
                    .path(API_STAGES_PATCH_PATH)
                    .value(format!("{api_id}:{stage}"))
                    .build(),
            )
            .send()
            .await
            .with_context(|| {
                format!("Failed to associate rest api {api_id}:{stage} with usage plan {plan_id}")
            })?;
        Ok(())
    }

    async fn delete_usage_plan(&self, plan_id: &str) -> Result<()> {
        self.client
            .delete_usage_plan()
            .usage_plan_id(plan_id)
            .send()
            .await
            .with_context(|| format!("Failed to delete usage plan {plan_id}"))?;
        Ok(())
    }

    async fn delete_api_key(&self, key_id: &str) -> Result<()> {
        self.client
            .delete_api_key()
            .api_key(key_id)
            .send()
            .await
            .with_context(|| format!("Failed to delete api key {key_id}"))?;
        Ok(())
    }
}
