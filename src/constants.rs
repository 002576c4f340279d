//! # Constants
//!
//! Shared constants used throughout the reconciler.

/// Log prefix for add-path messages.
pub const ADD_LOG_PREFIX: &str = "AddApiKey";

/// Log prefix for remove-path messages.
pub const REMOVE_LOG_PREFIX: &str = "RemoveApiKey";

/// Stack output key whose value carries the deployed REST API endpoint URL.
pub const SERVICE_ENDPOINT_OUTPUT_KEY: &str = "ServiceEndpoint";

/// Suffix for the derived default usage plan name (`{key}-usage-plan`).
pub const DEFAULT_PLAN_SUFFIX: &str = "-usage-plan";

/// Key type used when associating a key with a usage plan.
pub const USAGE_PLAN_KEY_TYPE: &str = "API_KEY";

/// Patch path for linking an API stage to a usage plan.
pub const API_STAGES_PATCH_PATH: &str = "/apiStages";

/// Upper bound on pages followed during a paginated listing.
///
/// The remote contract says a response without a continuation token ends the
/// listing, so a well-behaved service can never hit this. The bound turns a
/// token that never stops into an error instead of an infinite loop.
pub const MAX_LIST_PAGES: usize = 100;
