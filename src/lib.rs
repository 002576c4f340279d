//! # API Key Reconciler
//!
//! A deploy-lifecycle hook that reconciles a declarative list of API Gateway
//! keys and usage plans against live AWS state.
//!
//! For each declared key the add path ensures that:
//!
//! 1. The key exists in API Gateway (creating it if absent)
//! 2. A usage plan exists and the key is associated with it
//! 3. The usage plan is linked to the deployed REST API stage
//!
//! The remove path reverses the association where permitted, guarded by a
//! per-key protection flag and a fan-out check on the plan's attached stages.
//!
//! Every remote mutation is conditional on an absence check performed
//! immediately before it, which is what makes repeated runs idempotent.
//!
//! Remote services are consumed through small capability traits
//! ([`provider::GatewayOps`], [`provider::StackDescriber`],
//! [`provider::Decryptor`]) so tests can substitute in-memory fakes.

use std::collections::HashMap;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Deserializer};

pub mod constants;
pub mod options;
pub mod pagination;
pub mod provider;
pub mod reconciler;
pub mod secrets;

/// Root of the declarative service file (the `serverless.yml` shape).
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceConfig {
    /// Service name, used for the `{service}-{stage}` stack name fallback.
    pub service: String,
    #[serde(default)]
    pub provider: ProviderSettings,
    #[serde(default)]
    pub custom: CustomSettings,
}

impl ServiceConfig {
    /// Parse a service config from YAML text.
    pub fn from_yaml(text: &str) -> Result<Self> {
        serde_yaml::from_str(text).context("Failed to parse service config")
    }

    /// Load and parse a service config file.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read service config {}", path.display()))?;
        Self::from_yaml(&text)
    }

    /// Deployed stack name: explicit `provider.stackName` or the
    /// `{service}-{stage}` convention.
    pub fn stack_name(&self, stage: &str) -> String {
        self.provider
            .stack_name
            .clone()
            .unwrap_or_else(|| format!("{}-{stage}", self.service))
    }

    /// The declared keys applicable to `stage`, selected once per run.
    pub fn keys_for_stage(&self, stage: &str) -> &[DesiredKeySpec] {
        self.custom
            .api_keys
            .as_ref()
            .map_or(&[], |keys| keys.for_stage(stage))
    }
}

/// `provider` block of the service file.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderSettings {
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default)]
    pub stage: Option<String>,
    #[serde(default)]
    pub stack_name: Option<String>,
    #[serde(default)]
    pub api_gateway: Option<ApiGatewaySettings>,
    #[serde(default)]
    pub usage_plan: Option<UsagePlanSpec>,
}

impl ProviderSettings {
    /// Provider-level default usage plan: the nested `apiGateway.usagePlan`
    /// field wins over the flat `usagePlan` field; absence of both yields an
    /// empty default.
    pub fn default_usage_plan(&self) -> UsagePlanSpec {
        if let Some(plan) = self.api_gateway.as_ref().and_then(|ag| ag.usage_plan.as_ref()) {
            return plan.clone();
        }
        self.usage_plan.clone().unwrap_or_default()
    }
}

/// `provider.apiGateway` block.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiGatewaySettings {
    #[serde(default)]
    pub usage_plan: Option<UsagePlanSpec>,
}

/// `custom` block of the service file.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomSettings {
    #[serde(default)]
    pub api_keys: Option<ApiKeysConfig>,
}

/// Declared key list: either flat (applies to all stages) or keyed by stage
/// name (applies only to the active stage).
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum ApiKeysConfig {
    List(Vec<DesiredKeySpec>),
    PerStage(HashMap<String, Vec<DesiredKeySpec>>),
}

impl ApiKeysConfig {
    /// Keys applicable to `stage`. An unknown stage in per-stage form yields
    /// an empty list.
    pub fn for_stage(&self, stage: &str) -> &[DesiredKeySpec] {
        match self {
            Self::List(keys) => keys,
            Self::PerStage(map) => map.get(stage).map_or(&[], Vec::as_slice),
        }
    }
}

/// Declared configuration for one API key.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DesiredKeySpec {
    /// Key name, unique within its deployment stage scope.
    pub name: String,
    /// Key value; absent means API Gateway generates one at creation.
    #[serde(default)]
    pub value: KeyValue,
    /// Per-key usage plan override (name and/or creation template).
    #[serde(default)]
    pub usage_plan: Option<UsagePlanSpec>,
    /// Whether the remove path may delete this key. Accepts booleans and the
    /// strings `"true"`/`"false"`; normalised to a bool at parse time.
    #[serde(default = "default_true", deserialize_with = "bool_or_string")]
    pub delete_at_removal: bool,
}

/// Configured key value.
///
/// Surface syntax: absent field, plain string, or a map carrying an
/// `encrypted` field (the discriminator) with an optional `kmsKeyRegion`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum KeyValue {
    /// No value configured; the remote service generates one.
    #[default]
    Generated,
    /// Literal plaintext value.
    Literal(String),
    /// KMS-encrypted value, base64-encoded ciphertext.
    Encrypted {
        encrypted: String,
        kms_key_region: Option<String>,
    },
}

impl<'de> Deserialize<'de> for KeyValue {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Literal(String),
            #[serde(rename_all = "camelCase")]
            Encrypted {
                encrypted: String,
                #[serde(default)]
                kms_key_region: Option<String>,
            },
        }

        Ok(match Raw::deserialize(deserializer)? {
            Raw::Literal(value) => Self::Literal(value),
            Raw::Encrypted {
                encrypted,
                kms_key_region,
            } => Self::Encrypted {
                encrypted,
                kms_key_region,
            },
        })
    }
}

/// Usage plan override / creation template.
///
/// The quota and throttle settings are applied only when a plan is created;
/// an existing plan is never updated to match them.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsagePlanSpec {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub quota: Option<QuotaSpec>,
    #[serde(default)]
    pub throttle: Option<ThrottleSpec>,
}

impl UsagePlanSpec {
    /// True when the spec carries a creation-time quota or throttle template.
    pub fn has_limits(&self) -> bool {
        self.quota.is_some() || self.throttle.is_some()
    }

    /// True when no field is set at all.
    pub fn is_empty(&self) -> bool {
        self.name.is_none() && !self.has_limits()
    }
}

/// Request quota template for a usage plan.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuotaSpec {
    #[serde(default)]
    pub limit: Option<i32>,
    #[serde(default)]
    pub offset: Option<i32>,
    /// Quota period: `DAY`, `WEEK`, or `MONTH`.
    #[serde(default)]
    pub period: Option<String>,
}

/// Request throttle template for a usage plan.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThrottleSpec {
    #[serde(default)]
    pub burst_limit: Option<i32>,
    #[serde(default)]
    pub rate_limit: Option<f64>,
}

fn default_true() -> bool {
    true
}

/// Accept `true`/`false` as booleans or as the strings `"true"`/`"false"`.
fn bool_or_string<'de, D>(deserializer: D) -> std::result::Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Bool(bool),
        Text(String),
    }

    match Raw::deserialize(deserializer)? {
        Raw::Bool(flag) => Ok(flag),
        Raw::Text(text) => match text.as_str() {
            "true" => Ok(true),
            "false" => Ok(false),
            other => Err(serde::de::Error::invalid_value(
                serde::de::Unexpected::Str(other),
                &"\"true\" or \"false\"",
            )),
        },
    }
}
