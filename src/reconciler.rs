//! # Reconciler
//!
//! Core reconciliation logic for declared API keys.
//!
//! ## Add path (after a successful deploy)
//!
//! Per key, strictly in order:
//!
//! 1. Resolve the effective key value (decrypting an encrypted literal)
//! 2. Find the existing key by name; create it if absent
//! 3. Resolve the effective usage plan name and creation template
//! 4. Find the existing plan by name; create it (and the plan-key
//!    association) if absent, otherwise associate the key only when it is
//!    not already linked
//! 5. Link the deployed REST API stage to the plan, once
//!
//! A failure while processing one key is logged and does not abort the
//! remaining keys. Values of newly created keys are reported after the loop
//! so secrets do not end up interleaved with per-key progress logs.
//!
//! ## Remove path (on teardown)
//!
//! Per key: re-resolve the plan name, delete the plan when it has no stages
//! attached, then delete the key. A plan with stages still attached is left
//! alone together with its key. A key protected by `deleteAtRemoval: false`
//! ends the whole removal run.

use std::sync::Arc;

use anyhow::{Context, Result};
use thiserror::Error;
use tracing::{error, info, warn};

use crate::constants::{ADD_LOG_PREFIX, REMOVE_LOG_PREFIX, SERVICE_ENDPOINT_OUTPUT_KEY};
use crate::options::EffectiveOptions;
use crate::provider::{
    find_api_key_by_name, find_usage_plan_by_name, list_plan_keys, Decryptor, GatewayOps,
    StackDescriber, UsagePlanRequest, UsagePlanSummary,
};
use crate::secrets::resolve_key_value;
use crate::{DesiredKeySpec, UsagePlanSpec};

#[derive(Debug, Error)]
pub enum ReconcilerError {
    #[error("Reconciliation failed: {0}")]
    ReconciliationFailed(#[from] anyhow::Error),
}

/// Per-run inputs resolved from the deployment provider.
#[derive(Debug, Clone)]
pub struct RunContext {
    /// Active deployment stage.
    pub stage: String,
    /// Deploy region, also the decryption fallback region.
    pub region: String,
    /// Name of the deployed stack whose outputs carry the REST API endpoint.
    pub stack_name: String,
    /// Suppress collection and reporting of generated key values.
    pub conceal: bool,
}

/// A newly created key surfaced to the caller's reporting sink.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatedKeyRecord {
    pub name: String,
    /// Generated or supplied secret value, when the remote service reported
    /// one back.
    pub value: Option<String>,
}

/// Outcome of an add-path run. Per-key failures are recorded, not raised.
#[derive(Debug, Default)]
pub struct AddSummary {
    /// Keys created during this run, in declaration order. Empty when
    /// concealment is on.
    pub created: Vec<CreatedKeyRecord>,
    /// Names of declared keys whose processing failed.
    pub failed: Vec<String>,
}

/// Reconciles declared keys against the remote gateway state.
pub struct KeyReconciler {
    gateway: Arc<dyn GatewayOps>,
    stacks: Arc<dyn StackDescriber>,
    decryptor: Arc<dyn Decryptor>,
}

impl std::fmt::Debug for KeyReconciler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyReconciler").finish_non_exhaustive()
    }
}

impl KeyReconciler {
    pub fn new(
        gateway: Arc<dyn GatewayOps>,
        stacks: Arc<dyn StackDescriber>,
        decryptor: Arc<dyn Decryptor>,
    ) -> Self {
        Self {
            gateway,
            stacks,
            decryptor,
        }
    }

    /// Run the add path over the declared keys.
    ///
    /// Each key is processed to completion before the next begins; a key's
    /// failure is logged and recorded but never aborts the run.
    pub async fn add_keys(
        &self,
        specs: &[DesiredKeySpec],
        default_plan: &UsagePlanSpec,
        ctx: &RunContext,
    ) -> Result<AddSummary, ReconcilerError> {
        let mut summary = AddSummary::default();

        if specs.is_empty() {
            info!(
                "{ADD_LOG_PREFIX}: No api key names specified for stage {} so skipping creation",
                ctx.stage
            );
            return Ok(summary);
        }

        for spec in specs {
            let options = EffectiveOptions::resolve(spec, default_plan);
            match self.add_one_key(spec, &options, ctx).await {
                Ok(Some(record)) => summary.created.push(record),
                Ok(None) => {}
                Err(e) => {
                    error!(
                        "{ADD_LOG_PREFIX}: Failed to add api key {} to the service. Error {e:#}",
                        spec.name
                    );
                    summary.failed.push(spec.name.clone());
                }
            }
        }

        // Created values are reported only after every key is processed so
        // they are not interleaved with other keys' progress logs.
        for record in &summary.created {
            info!(
                "{ADD_LOG_PREFIX}: {} - {}",
                record.name,
                record.value.as_deref().unwrap_or("(no value returned)")
            );
        }

        Ok(summary)
    }

    /// Bring one declared key, its plan, the plan-key link, and the stage
    /// link into existence. Every mutation is preceded by an absence check.
    async fn add_one_key(
        &self,
        spec: &DesiredKeySpec,
        options: &EffectiveOptions,
        ctx: &RunContext,
    ) -> Result<Option<CreatedKeyRecord>> {
        let value = resolve_key_value(&spec.value, &ctx.region, self.decryptor.as_ref()).await?;

        let existing_key = find_api_key_by_name(self.gateway.as_ref(), &spec.name)
            .await
            .context("Failed to check if key already exists")?;

        let (key_id, created) = match existing_key {
            Some(key) => {
                info!(
                    "{ADD_LOG_PREFIX}: Api key {} already exists, skipping creation.",
                    spec.name
                );
                (key.id, None)
            }
            None => {
                info!("{ADD_LOG_PREFIX}: Creating new api key {}", spec.name);
                let created = self
                    .gateway
                    .create_api_key(&spec.name, value.as_deref())
                    .await?;
                let record = (!ctx.conceal).then(|| CreatedKeyRecord {
                    name: spec.name.clone(),
                    value: created.value.clone(),
                });
                (created.id, record)
            }
        };

        let existing_plan = find_usage_plan_by_name(self.gateway.as_ref(), &options.plan_name)
            .await
            .context("Failed to check if usage plan already exists")?;

        let plan = match existing_plan {
            None => {
                info!(
                    "{ADD_LOG_PREFIX}: Creating new usage plan {}",
                    options.plan_name
                );
                let request = UsagePlanRequest {
                    name: options.plan_name.clone(),
                    template: options.plan_template.clone(),
                };
                let plan_id = self.gateway.create_usage_plan(&request).await?;
                info!(
                    "{ADD_LOG_PREFIX}: Associating api key {key_id} with usage plan {plan_id}"
                );
                self.gateway.create_usage_plan_key(&key_id, &plan_id).await?;
                // A plan created in this run cannot have stages attached yet.
                UsagePlanSummary {
                    id: plan_id,
                    name: options.plan_name.clone(),
                    api_stages: Vec::new(),
                }
            }
            Some(plan) => {
                info!(
                    "{ADD_LOG_PREFIX}: Usage plan {} already exists, skipping creation.",
                    options.plan_name
                );
                let linked_keys = list_plan_keys(self.gateway.as_ref(), &plan.id).await?;
                if linked_keys.iter().any(|key| key.id == key_id) {
                    info!(
                        "{ADD_LOG_PREFIX}: Usage plan {} already has api key associated with it, skipping association.",
                        options.plan_name
                    );
                } else {
                    info!(
                        "{ADD_LOG_PREFIX}: Associating api key {key_id} with usage plan {}",
                        plan.id
                    );
                    self.gateway.create_usage_plan_key(&key_id, &plan.id).await?;
                }
                plan
            }
        };

        self.associate_stage(&plan, ctx).await?;
        Ok(created)
    }

    /// Link the deployed REST API's stage to the usage plan exactly once.
    pub async fn associate_stage(
        &self,
        plan: &UsagePlanSummary,
        ctx: &RunContext,
    ) -> Result<()> {
        let outputs = self.stacks.stack_outputs(&ctx.stack_name).await?;
        let endpoint = outputs
            .iter()
            .find(|output| output.key == SERVICE_ENDPOINT_OUTPUT_KEY)
            .with_context(|| {
                format!(
                    "Stack {} has no {SERVICE_ENDPOINT_OUTPUT_KEY} output",
                    ctx.stack_name
                )
            })?;
        let api_id = parse_rest_api_id(&endpoint.value).with_context(|| {
            format!(
                "Unrecognized {SERVICE_ENDPOINT_OUTPUT_KEY} value {}",
                endpoint.value
            )
        })?;

        if plan
            .api_stages
            .iter()
            .any(|pair| pair.api_id == api_id && pair.stage == ctx.stage)
        {
            info!("{ADD_LOG_PREFIX}: Rest api {api_id} already associated with the usage plan");
            return Ok(());
        }

        self.gateway
            .add_stage_to_plan(&plan.id, api_id, &ctx.stage)
            .await?;
        info!("{ADD_LOG_PREFIX}: Completed associating rest api {api_id} with the usage plan");
        Ok(())
    }

    /// Run the remove path over the declared keys.
    ///
    /// Deletion order per key: usage plan first (only when it has no stages
    /// attached), then the key itself. Remote state is re-resolved fresh;
    /// nothing from an earlier add run is assumed.
    ///
    /// A protected key (`deleteAtRemoval: false`) ends the whole run, leaving
    /// the remaining declared keys untouched. This matches the behaviour the
    /// plugin has always shipped with and is pinned by tests.
    pub async fn remove_keys(
        &self,
        specs: &[DesiredKeySpec],
        default_plan: &UsagePlanSpec,
    ) -> Result<(), ReconcilerError> {
        for spec in specs {
            let options = EffectiveOptions::resolve(spec, default_plan);

            if !spec.delete_at_removal {
                info!(
                    "{REMOVE_LOG_PREFIX}: Api key {} is protected from deletion",
                    spec.name
                );
                return Ok(());
            }

            match find_usage_plan_by_name(self.gateway.as_ref(), &options.plan_name).await? {
                None => {
                    warn!(
                        "{REMOVE_LOG_PREFIX}: {} not found. Checking and deleting api key.",
                        options.plan_name
                    );
                }
                Some(plan) => {
                    if !plan.api_stages.is_empty() {
                        warn!(
                            "{REMOVE_LOG_PREFIX}: {} has api stages associated with it. Skipping deletion.",
                            options.plan_name
                        );
                        continue;
                    }
                    info!(
                        "{REMOVE_LOG_PREFIX}: Deleting usage plan {} - {}",
                        options.plan_name, plan.id
                    );
                    self.gateway.delete_usage_plan(&plan.id).await?;
                    info!(
                        "{REMOVE_LOG_PREFIX}: Usage plan {} deleted successfully",
                        options.plan_name
                    );
                }
            }

            match find_api_key_by_name(self.gateway.as_ref(), &spec.name).await? {
                None => {
                    warn!("{REMOVE_LOG_PREFIX}: {} not found.", spec.name);
                }
                Some(key) => {
                    info!(
                        "{REMOVE_LOG_PREFIX}: Deleting api key {} - {}",
                        spec.name, key.id
                    );
                    self.gateway.delete_api_key(&key.id).await?;
                    info!(
                        "{REMOVE_LOG_PREFIX}: Api key {} deleted successfully",
                        spec.name
                    );
                }
            }
        }

        Ok(())
    }
}

/// Extract the REST API id from a `ServiceEndpoint` output value.
///
/// The value is a URL whose host's first label is the API id
/// (`https://{apiId}.execute-api.{region}.amazonaws.com/{stage}`): take the
/// value up to the first `.`, then the portion after `//`.
pub fn parse_rest_api_id(endpoint: &str) -> Option<&str> {
    let scheme_and_id = endpoint.split('.').next()?;
    let api_id = scheme_and_id.split("//").nth(1)?;
    (!api_id.is_empty()).then_some(api_id)
}
