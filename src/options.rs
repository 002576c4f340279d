//! # Option Resolution
//!
//! Computes, per declared key, the effective usage plan name and the
//! creation-time plan template by applying the override precedence:
//! per-key setting, then the provider-level default, then a derived default.

use crate::constants::DEFAULT_PLAN_SUFFIX;
use crate::{DesiredKeySpec, UsagePlanSpec};

/// Effective per-key settings, derived once per key and never persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct EffectiveOptions {
    /// Resolved usage plan name.
    pub plan_name: String,
    /// Template applied only when the plan has to be created.
    pub plan_template: Option<UsagePlanSpec>,
}

impl EffectiveOptions {
    /// Resolve the plan name and creation template for one declared key.
    ///
    /// Name precedence: key-level `usagePlan.name`, then the provider
    /// default's name, then `{key}-usage-plan`.
    ///
    /// Template precedence: the key-level plan object when it carries a
    /// quota or throttle, then the provider default (whatever its shape),
    /// then none.
    pub fn resolve(spec: &DesiredKeySpec, default_plan: &UsagePlanSpec) -> Self {
        let plan_name = spec
            .usage_plan
            .as_ref()
            .and_then(|plan| plan.name.clone())
            .or_else(|| default_plan.name.clone())
            .unwrap_or_else(|| format!("{}{DEFAULT_PLAN_SUFFIX}", spec.name));

        let plan_template = match &spec.usage_plan {
            Some(plan) if plan.has_limits() => Some(plan.clone()),
            _ if !default_plan.is_empty() => Some(default_plan.clone()),
            _ => None,
        };

        Self {
            plan_name,
            plan_template,
        }
    }
}
