//! Wire shapes shipped to (or fetched from) a remote scheduler (§6.1).
//!
//! The HTTP transport and REST endpoints themselves are out of scope; only
//! the contracts a runner needs to speak are modeled here.

use crate::retry::Retries;
use crate::value::SerializerName;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A resource request: CPU/memory/disk plus an optional GPU list.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResourceRequest {
    /// Fractional CPU count.
    pub cpus: f64,
    /// Memory, in megabytes.
    pub memory_mb: u64,
    /// Ephemeral disk, in megabytes.
    pub disk_mb: u64,
    /// Requested accelerators.
    #[serde(default)]
    pub gpus: Vec<GpuRequest>,
}

/// One GPU request line: how many of a given model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GpuRequest {
    /// Number of accelerators of this model.
    pub count: u32,
    /// Accelerator model identifier, e.g. `"a100-40gb"`.
    pub model: String,
}

/// A JSON-Schema-shaped parameter description, carried on the manifest so
/// the scheduler and remote runner are schema-driven rather than relying on
/// runtime type introspection (§4.7, §9 redesign note).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParameterSchema {
    /// Parameter name.
    pub name: String,
    /// JSON-Schema type descriptor.
    pub schema: serde_json::Value,
    /// Human-readable description.
    #[serde(default)]
    pub description: String,
    /// Whether the caller must supply this parameter.
    pub required: bool,
}

/// Static description of one registered function, as shipped to the
/// scheduler.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionManifest {
    /// Registered name.
    pub name: String,
    /// Human-readable description.
    #[serde(default)]
    pub description: String,
    /// True if this function is an application entrypoint.
    pub is_api: bool,
    /// Names of secrets this function needs injected at call time.
    #[serde(default)]
    pub secret_names: Vec<String>,
    /// Timeout for one-time class construction, if this is a method.
    pub init_timeout_sec: Option<f64>,
    /// Timeout for one call.
    pub call_timeout_sec: Option<f64>,
    /// CPU/memory/disk/GPU request.
    pub resources: ResourceRequest,
    /// Retry policy.
    pub retries: Retries,
    /// Optional cache key template.
    pub cache_key: Option<String>,
    /// Declared parameters.
    pub parameters: Vec<ParameterSchema>,
    /// JSON-Schema for the return type.
    pub return_type: serde_json::Value,
    /// Placement filter expressions, e.g. `"region==us"`.
    #[serde(default)]
    pub placement_constraints: Vec<String>,
    /// Maximum concurrent in-flight calls, if bounded.
    pub max_concurrency: Option<u32>,
}

/// One declared entrypoint argument: name plus its declared type hint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntrypointArgument {
    /// Argument name.
    pub arg_name: String,
    /// Serialized type hint, used by the remote runner to pick a decoder for
    /// the return value.
    pub type_hint: String,
}

/// The application's externally-callable entry, as described on the
/// manifest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntrypointManifest {
    /// Name of the registered entry function.
    pub function_name: String,
    /// Serializer used to encode entry arguments.
    pub input_serializer: SerializerName,
    /// Declared entry parameters and their type hints.
    pub inputs: Vec<EntrypointArgument>,
    /// Serializer used to decode the entry's output.
    pub output_serializer: SerializerName,
    /// Declared output type hints, tried in order when decoding (§4.4).
    pub output_type_hints: Vec<String>,
}

/// Full application manifest, as upserted to or fetched from the scheduler.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApplicationManifest {
    /// Application name.
    pub name: String,
    /// Human-readable description.
    #[serde(default)]
    pub description: String,
    /// Free-form tags.
    #[serde(default)]
    pub tags: HashMap<String, String>,
    /// Unique alphanumeric version nonce, assigned per load.
    pub version: String,
    /// Every registered function, by name.
    pub functions: HashMap<String, FunctionManifest>,
    /// The callable entry.
    pub entrypoint: EntrypointManifest,
}
