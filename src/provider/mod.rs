//! # Provider Modules
//!
//! Capability traits for the remote services the reconciler drives, plus the
//! name-resolution helpers built on top of the paginated listings.
//!
//! Each remote resource group gets its own small trait so tests can
//! substitute in-memory fakes:
//!
//! - `GatewayOps` - API Gateway keys, usage plans, plan-key links, stage patch
//! - `StackDescriber` - deployed infrastructure stack outputs
//! - `Decryptor` - KMS decryption of configured ciphertexts

use anyhow::Result;
use async_trait::async_trait;

use crate::pagination::{list_all, Page};

/// Summary of a remote API key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiKeySummary {
    pub id: String,
    pub name: String,
}

/// Result of creating an API key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatedKey {
    pub id: String,
    /// Secret value, present when the remote service reports it back.
    pub value: Option<String>,
}

/// A `{apiId, stage}` pair attached to a usage plan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiStagePair {
    pub api_id: String,
    pub stage: String,
}

/// Summary of a remote usage plan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UsagePlanSummary {
    pub id: String,
    pub name: String,
    /// REST API stages currently linked to the plan.
    pub api_stages: Vec<ApiStagePair>,
}

/// Summary of a key associated with a usage plan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UsagePlanKeySummary {
    pub id: String,
}

/// Creation request for a usage plan: resolved name plus the optional
/// quota/throttle template.
#[derive(Debug, Clone, PartialEq)]
pub struct UsagePlanRequest {
    pub name: String,
    pub template: Option<crate::UsagePlanSpec>,
}

/// One output of a deployed infrastructure stack.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StackOutput {
    pub key: String,
    pub value: String,
}

/// API Gateway operations: keys, usage plans, plan-key links, stage patch.
///
/// List operations return raw pages; implementations translate a NotFound
/// coded failure into an empty terminal page, so callers treat absence as a
/// value, never as an error.
#[async_trait]
pub trait GatewayOps: Send + Sync {
    async fn list_api_keys(&self, position: Option<String>) -> Result<Page<ApiKeySummary>>;

    async fn list_usage_plans(&self, position: Option<String>) -> Result<Page<UsagePlanSummary>>;

    async fn list_usage_plan_keys(
        &self,
        plan_id: &str,
        position: Option<String>,
    ) -> Result<Page<UsagePlanKeySummary>>;

    /// Create an enabled API key, optionally with an explicit value.
    async fn create_api_key(&self, name: &str, value: Option<&str>) -> Result<CreatedKey>;

    /// Create a usage plan, returning its id.
    async fn create_usage_plan(&self, request: &UsagePlanRequest) -> Result<String>;

    /// Associate a key with a usage plan.
    async fn create_usage_plan_key(&self, key_id: &str, plan_id: &str) -> Result<()>;

    /// Link an API stage to a usage plan with a single patch operation.
    async fn add_stage_to_plan(&self, plan_id: &str, api_id: &str, stage: &str) -> Result<()>;

    async fn delete_usage_plan(&self, plan_id: &str) -> Result<()>;

    async fn delete_api_key(&self, key_id: &str) -> Result<()>;
}

/// Deployed infrastructure description.
#[async_trait]
pub trait StackDescriber: Send + Sync {
    /// Outputs of the named stack. Fails when the stack does not exist.
    async fn stack_outputs(&self, stack_name: &str) -> Result<Vec<StackOutput>>;
}

/// External decryption service.
#[async_trait]
pub trait Decryptor: Send + Sync {
    /// Decrypt raw ciphertext bytes using keys in the given region.
    async fn decrypt(&self, ciphertext: &[u8], region: &str) -> Result<Vec<u8>>;
}

/// Find an existing API key by exact name across the full paginated listing.
pub async fn find_api_key_by_name(
    gateway: &dyn GatewayOps,
    name: &str,
) -> Result<Option<ApiKeySummary>> {
    let keys = list_all(|position| gateway.list_api_keys(position)).await?;
    Ok(keys.into_iter().find(|key| key.name == name))
}

/// Find an existing usage plan by exact name across the full paginated
/// listing.
pub async fn find_usage_plan_by_name(
    gateway: &dyn GatewayOps,
    name: &str,
) -> Result<Option<UsagePlanSummary>> {
    let plans = list_all(|position| gateway.list_usage_plans(position)).await?;
    Ok(plans.into_iter().find(|plan| plan.name == name))
}

/// All keys currently associated with a usage plan.
pub async fn list_plan_keys(
    gateway: &dyn GatewayOps,
    plan_id: &str,
) -> Result<Vec<UsagePlanKeySummary>> {
    list_all(|position| gateway.list_usage_plan_keys(plan_id, position)).await
}

// AWS implementations
pub mod aws;
