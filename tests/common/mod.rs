//! Common test utilities for reconciler integration tests
//!
//! Provides in-memory recording fakes for the capability traits so the add
//! and remove paths can be exercised without AWS. Each fake records every
//! call in order; mutation calls can be counted to assert idempotence.

#![allow(dead_code, reason = "shared fixtures are not all used by every test binary")]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Result};
use async_trait::async_trait;

use api_key_reconciler::pagination::Page;
use api_key_reconciler::provider::{
    ApiKeySummary, ApiStagePair, CreatedKey, Decryptor, GatewayOps, StackDescriber, StackOutput,
    UsagePlanKeySummary, UsagePlanRequest, UsagePlanSummary,
};
use api_key_reconciler::reconciler::{KeyReconciler, RunContext};
use api_key_reconciler::{DesiredKeySpec, KeyValue, UsagePlanSpec};

/// One recorded remote call.
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    ListApiKeys,
    ListUsagePlans,
    ListUsagePlanKeys(String),
    CreateApiKey {
        name: String,
        value: Option<String>,
    },
    CreateUsagePlan(UsagePlanRequest),
    CreateUsagePlanKey {
        key_id: String,
        plan_id: String,
    },
    AddStage {
        plan_id: String,
        api_id: String,
        stage: String,
    },
    DeleteUsagePlan(String),
    DeleteApiKey(String),
}

impl Call {
    /// True for calls that change remote state.
    pub fn is_mutation(&self) -> bool {
        !matches!(
            self,
            Self::ListApiKeys | Self::ListUsagePlans | Self::ListUsagePlanKeys(_)
        )
    }
}

/// Scriptable remote gateway state.
#[derive(Debug, Default)]
pub struct GatewayState {
    pub keys: Vec<ApiKeySummary>,
    pub plans: Vec<UsagePlanSummary>,
    /// `(plan_id, key_id)` association pairs.
    pub plan_keys: Vec<(String, String)>,
    next_id: u32,
    /// Key names whose creation is scripted to fail.
    pub fail_create_key_named: Vec<String>,
}

impl GatewayState {
    fn next_id(&mut self, prefix: &str) -> String {
        self.next_id += 1;
        format!("{prefix}-{}", self.next_id)
    }
}

/// In-memory [`GatewayOps`] fake with call recording and optional paging.
#[derive(Debug)]
pub struct FakeGateway {
    pub state: Mutex<GatewayState>,
    pub calls: Mutex<Vec<Call>>,
    /// Items per listing page; listings spanning more items return a
    /// continuation token.
    pub page_size: usize,
}

impl Default for FakeGateway {
    fn default() -> Self {
        Self {
            state: Mutex::new(GatewayState::default()),
            calls: Mutex::new(Vec::new()),
            page_size: 100,
        }
    }
}

impl FakeGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_page_size(page_size: usize) -> Self {
        Self {
            page_size,
            ..Self::default()
        }
    }

    /// Seed an existing key, returning its id.
    pub fn seed_key(&self, name: &str) -> String {
        let mut state = self.state.lock().unwrap();
        let id = state.next_id("key");
        state.keys.push(ApiKeySummary {
            id: id.clone(),
            name: name.to_string(),
        });
        id
    }

    /// Seed an existing usage plan, returning its id.
    pub fn seed_plan(&self, name: &str, api_stages: Vec<ApiStagePair>) -> String {
        let mut state = self.state.lock().unwrap();
        let id = state.next_id("plan");
        state.plans.push(UsagePlanSummary {
            id: id.clone(),
            name: name.to_string(),
            api_stages,
        });
        id
    }

    /// Seed an existing plan-key association.
    pub fn seed_plan_key(&self, plan_id: &str, key_id: &str) {
        self.state
            .lock()
            .unwrap()
            .plan_keys
            .push((plan_id.to_string(), key_id.to_string()));
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn mutation_calls(&self) -> Vec<Call> {
        self.calls().into_iter().filter(Call::is_mutation).collect()
    }

    pub fn clear_calls(&self) {
        self.calls.lock().unwrap().clear();
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }

    fn page_of<T: Clone>(&self, items: &[T], position: Option<&String>) -> Page<T> {
        let start = position.map_or(0, |token| token.parse::<usize>().unwrap_or(0));
        let end = (start + self.page_size).min(items.len());
        Page {
            items: items[start..end].to_vec(),
            position: (end < items.len()).then(|| end.to_string()),
        }
    }
}

#[async_trait]
impl GatewayOps for FakeGateway {
    async fn list_api_keys(&self, position: Option<String>) -> Result<Page<ApiKeySummary>> {
        self.record(Call::ListApiKeys);
        let state = self.state.lock().unwrap();
        Ok(self.page_of(&state.keys, position.as_ref()))
    }

    async fn list_usage_plans(&self, position: Option<String>) -> Result<Page<UsagePlanSummary>> {
        self.record(Call::ListUsagePlans);
        let state = self.state.lock().unwrap();
        Ok(self.page_of(&state.plans, position.as_ref()))
    }

    async fn list_usage_plan_keys(
        &self,
        plan_id: &str,
        position: Option<String>,
    ) -> Result<Page<UsagePlanKeySummary>> {
        self.record(Call::ListUsagePlanKeys(plan_id.to_string()));
        let state = self.state.lock().unwrap();
        let keys: Vec<UsagePlanKeySummary> = state
            .plan_keys
            .iter()
            .filter(|(plan, _)| plan == plan_id)
            .map(|(_, key)| UsagePlanKeySummary { id: key.clone() })
            .collect();
        Ok(self.page_of(&keys, position.as_ref()))
    }

    async fn create_api_key(&self, name: &str, value: Option<&str>) -> Result<CreatedKey> {
        self.record(Call::CreateApiKey {
            name: name.to_string(),
            value: value.map(ToString::to_string),
        });
        let mut state = self.state.lock().unwrap();
        if state.fail_create_key_named.iter().any(|n| n == name) {
            return Err(anyhow!("TooManyRequestsException: rate exceeded"));
        }
        let id = state.next_id("key");
        state.keys.push(ApiKeySummary {
            id: id.clone(),
            name: name.to_string(),
        });
        let value = value.map_or_else(|| format!("generated-{id}"), ToString::to_string);
        Ok(CreatedKey {
            id,
            value: Some(value),
        })
    }

    async fn create_usage_plan(&self, request: &UsagePlanRequest) -> Result<String> {
        self.record(Call::CreateUsagePlan(request.clone()));
        let mut state = self.state.lock().unwrap();
        let id = state.next_id("plan");
        state.plans.push(UsagePlanSummary {
            id: id.clone(),
            name: request.name.clone(),
            api_stages: Vec::new(),
        });
        Ok(id)
    }

    async fn create_usage_plan_key(&self, key_id: &str, plan_id: &str) -> Result<()> {
        self.record(Call::CreateUsagePlanKey {
            key_id: key_id.to_string(),
            plan_id: plan_id.to_string(),
        });
        self.state
            .lock()
            .unwrap()
            .plan_keys
            .push((plan_id.to_string(), key_id.to_string()));
        Ok(())
    }

    async fn add_stage_to_plan(&self, plan_id: &str, api_id: &str, stage: &str) -> Result<()> {
        self.record(Call::AddStage {
            plan_id: plan_id.to_string(),
            api_id: api_id.to_string(),
            stage: stage.to_string(),
        });
        let mut state = self.state.lock().unwrap();
        let plan = state
            .plans
            .iter_mut()
            .find(|plan| plan.id == plan_id)
            .ok_or_else(|| anyhow!("NotFoundException: usage plan {plan_id}"))?;
        plan.api_stages.push(ApiStagePair {
            api_id: api_id.to_string(),
            stage: stage.to_string(),
        });
        Ok(())
    }

    async fn delete_usage_plan(&self, plan_id: &str) -> Result<()> {
        self.record(Call::DeleteUsagePlan(plan_id.to_string()));
        let mut state = self.state.lock().unwrap();
        state.plans.retain(|plan| plan.id != plan_id);
        state.plan_keys.retain(|(plan, _)| plan != plan_id);
        Ok(())
    }

    async fn delete_api_key(&self, key_id: &str) -> Result<()> {
        self.record(Call::DeleteApiKey(key_id.to_string()));
        let mut state = self.state.lock().unwrap();
        state.keys.retain(|key| key.id != key_id);
        state.plan_keys.retain(|(_, key)| key != key_id);
        Ok(())
    }
}

/// In-memory [`StackDescriber`] fake.
#[derive(Debug, Default)]
pub struct FakeStacks {
    pub outputs: Mutex<HashMap<String, Vec<StackOutput>>>,
}

impl FakeStacks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a stack whose `ServiceEndpoint` output points at `api_id`.
    pub fn with_endpoint(stack_name: &str, api_id: &str, stage: &str) -> Self {
        let stacks = Self::default();
        stacks.outputs.lock().unwrap().insert(
            stack_name.to_string(),
            vec![StackOutput {
                key: "ServiceEndpoint".to_string(),
                value: format!(
                    "https://{api_id}.execute-api.us-east-1.amazonaws.com/{stage}"
                ),
            }],
        );
        stacks
    }
}

#[async_trait]
impl StackDescriber for FakeStacks {
    async fn stack_outputs(&self, stack_name: &str) -> Result<Vec<StackOutput>> {
        self.outputs
            .lock()
            .unwrap()
            .get(stack_name)
            .cloned()
            .ok_or_else(|| anyhow!("Stack {stack_name} not found"))
    }
}

/// In-memory [`Decryptor`] fake mapping ciphertexts to plaintexts.
#[derive(Debug, Default)]
pub struct FakeDecryptor {
    pub known: Mutex<HashMap<Vec<u8>, Vec<u8>>>,
    /// `(ciphertext, region)` pairs, in call order.
    pub calls: Mutex<Vec<(Vec<u8>, String)>>,
}

impl FakeDecryptor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn knowing(ciphertext: &[u8], plaintext: &[u8]) -> Self {
        let decryptor = Self::default();
        decryptor
            .known
            .lock()
            .unwrap()
            .insert(ciphertext.to_vec(), plaintext.to_vec());
        decryptor
    }
}

#[async_trait]
impl Decryptor for FakeDecryptor {
    async fn decrypt(&self, ciphertext: &[u8], region: &str) -> Result<Vec<u8>> {
        self.calls
            .lock()
            .unwrap()
            .push((ciphertext.to_vec(), region.to_string()));
        self.known
            .lock()
            .unwrap()
            .get(ciphertext)
            .cloned()
            .ok_or_else(|| anyhow!("InvalidCiphertextException"))
    }
}

/// A declared key with defaults suitable for most scenarios.
pub fn declared_key(name: &str) -> DesiredKeySpec {
    DesiredKeySpec {
        name: name.to_string(),
        value: KeyValue::Generated,
        usage_plan: None,
        delete_at_removal: true,
    }
}

/// A declared key pointing at an explicit usage plan name.
pub fn declared_key_with_plan(name: &str, plan_name: &str) -> DesiredKeySpec {
    DesiredKeySpec {
        usage_plan: Some(UsagePlanSpec {
            name: Some(plan_name.to_string()),
            ..UsagePlanSpec::default()
        }),
        ..declared_key(name)
    }
}

/// The run context used by the scenarios: stage `dev` on stack `svc-dev`.
pub fn run_context() -> RunContext {
    RunContext {
        stage: "dev".to_string(),
        region: "us-east-1".to_string(),
        stack_name: "svc-dev".to_string(),
        conceal: false,
    }
}

/// Wire a reconciler over the given fakes.
pub fn reconciler(
    gateway: &Arc<FakeGateway>,
    stacks: &Arc<FakeStacks>,
    decryptor: &Arc<FakeDecryptor>,
) -> KeyReconciler {
    KeyReconciler::new(
        Arc::clone(gateway) as Arc<dyn GatewayOps>,
        Arc::clone(stacks) as Arc<dyn StackDescriber>,
        Arc::clone(decryptor) as Arc<dyn Decryptor>,
    )
}
