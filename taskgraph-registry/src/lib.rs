//! # taskgraph-registry — function/class registry and pre-deployment checks
//!
//! A [`Registry`] maps function and class names to the descriptors built
//! when user code declares them. Per the redesign note on global singletons
//! (a process-global registry becomes an explicit value passed into the
//! runner factory), this is a plain value a caller owns and hands to a
//! runner, not a process-wide static.

#![deny(missing_docs)]

use std::collections::HashMap;
use std::sync::RwLock;
use taskgraph_core::value::SerializerName;
use taskgraph_core::Retries;
use thiserror::Error;

/// Errors raised by registration and validation.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum RegistryError {
    /// A function or class name was already registered from a different
    /// source path. Re-registration from the *same* path is tolerated (it
    /// accommodates a script imported both as `__main__` and under its real
    /// module name).
    #[error("duplicate name {name:?}: already registered from {existing_path:?}, now from {new_path:?}")]
    DuplicateName {
        /// The colliding name.
        name: String,
        /// Path it was first registered from.
        existing_path: String,
        /// Path the second registration came from.
        new_path: String,
    },

    /// A name was looked up but never registered.
    #[error("not registered: {0}")]
    NotFound(String),

    /// Catch-all.
    #[error("{0}")]
    Other(#[from] Box<dyn std::error::Error + Send + Sync>),
}

/// Declared resource request. Mirrors
/// [`taskgraph_core::manifest::ResourceRequest`] but kept independent so a
/// registration doesn't require building a full manifest just to declare a
/// function.
#[derive(Debug, Clone, Default)]
pub struct Resources {
    /// Fractional CPU count.
    pub cpus: f64,
    /// Memory, in megabytes.
    pub memory_mb: u64,
    /// Ephemeral disk, in megabytes.
    pub disk_mb: u64,
}

/// A user-supplied procedure promoted to a function, with immutable
/// configuration fixed at registration time.
#[derive(Debug, Clone)]
pub struct FunctionDescriptor {
    /// Qualified, process-unique name.
    pub name: String,
    /// Absolute source path this function was declared in, used for
    /// duplicate-registration detection.
    pub source_path: String,
    /// Name of the owning class, if this is a method-function.
    pub class_name: Option<String>,
    /// Serializer used to decode this function's arguments.
    pub input_serializer: SerializerName,
    /// Serializer used to encode this function's return value.
    pub output_serializer: SerializerName,
    /// Retry policy.
    pub retries: Retries,
    /// Resource request.
    pub resources: Resources,
    /// Per-call timeout, advisory on the local runner (§5).
    pub timeout_sec: Option<f64>,
    /// Declared parameter names, in order (for validation).
    pub parameters: Vec<String>,
    /// Names, among `parameters`, whose declared type doesn't resolve to
    /// anything a serializer can encode (untyped or unresolvable in the
    /// source language this was declared in). Empty when every parameter
    /// is serializable.
    pub untyped_parameters: Vec<String>,
    /// True if the function's declared return type is itself an awaitable.
    /// An application entry can't return a second layer of awaitable for a
    /// caller to await (§4.7).
    pub returns_awaitable: bool,
    /// Maximum concurrent in-flight calls, if bounded.
    pub max_concurrency: Option<u32>,
}

impl FunctionDescriptor {
    /// Start building a descriptor for `name`, declared from `source_path`.
    pub fn new(name: impl Into<String>, source_path: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            source_path: source_path.into(),
            class_name: None,
            input_serializer: SerializerName::Json,
            output_serializer: SerializerName::Json,
            retries: Retries::none(),
            resources: Resources::default(),
            timeout_sec: None,
            parameters: Vec::new(),
            untyped_parameters: Vec::new(),
            returns_awaitable: false,
            max_concurrency: None,
        }
    }

    /// Bind this function as a method of `class_name`.
    pub fn method_of(mut self, class_name: impl Into<String>) -> Self {
        self.class_name = Some(class_name.into());
        self
    }

    /// Declare the parameter names, in order.
    pub fn with_parameters(mut self, parameters: Vec<String>) -> Self {
        self.parameters = parameters;
        self
    }

    /// Mark the given parameter names as lacking a serializable type hint.
    pub fn with_untyped_parameters(mut self, untyped_parameters: Vec<String>) -> Self {
        self.untyped_parameters = untyped_parameters;
        self
    }

    /// Mark this function's declared return type as itself an awaitable.
    pub fn returning_awaitable(mut self) -> Self {
        self.returns_awaitable = true;
        self
    }

    /// Set the retry policy.
    pub fn with_retries(mut self, retries: Retries) -> Self {
        self.retries = retries;
        self
    }
}

/// A distinguished function marked as an application's externally callable
/// entry.
#[derive(Debug, Clone)]
pub struct ApplicationDescriptor {
    /// The entry function's descriptor.
    pub function: FunctionDescriptor,
    /// Free-form tags.
    pub tags: HashMap<String, String>,
    /// Optional placement/region policy.
    pub region_policy: Option<String>,
    /// Unique alphanumeric version nonce, assigned per load.
    pub version: String,
}

/// A class decorated for method-functions.
#[derive(Debug, Clone)]
pub struct ClassDescriptor {
    /// Class name.
    pub name: String,
    /// Absolute source path this class was declared in.
    pub source_path: String,
    /// Whether the class exposes a parameter-free constructor (other than
    /// the implicit receiver). Rust has no runtime constructor reflection,
    /// so this is asserted by the caller at registration time rather than
    /// inspected.
    pub has_parameterless_constructor: bool,
    /// True if this class is declared at module scope (not nested inside
    /// another type or a function body); nested/non-module-level classes
    /// are rejected by validation (§4.7).
    pub is_module_level: bool,
}

/// Process-wide mapping of function and class names to their descriptors,
/// held as an explicit value rather than global mutable state (§9).
#[derive(Default)]
pub struct Registry {
    functions: RwLock<HashMap<String, FunctionDescriptor>>,
    applications: RwLock<HashMap<String, ApplicationDescriptor>>,
    classes: RwLock<HashMap<String, ClassDescriptor>>,
}

impl Registry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a function. Idempotent when re-registered from the same
    /// source path; rejects a name collision from a different path.
    pub fn register_function(&self, descriptor: FunctionDescriptor) -> Result<(), RegistryError> {
        let mut functions = self.functions.write().unwrap();
        if let Some(existing) = functions.get(&descriptor.name) {
            if existing.source_path != descriptor.source_path {
                return Err(RegistryError::DuplicateName {
                    name: descriptor.name.clone(),
                    existing_path: existing.source_path.clone(),
                    new_path: descriptor.source_path.clone(),
                });
            }
            return Ok(());
        }
        functions.insert(descriptor.name.clone(), descriptor);
        Ok(())
    }

    /// Register an application entry. Subject to the same re-registration
    /// rule as [`Self::register_function`], applied to the entry function's
    /// name.
    pub fn register_application(
        &self,
        descriptor: ApplicationDescriptor,
    ) -> Result<(), RegistryError> {
        {
            let mut apps = self.applications.write().unwrap();
            if let Some(existing) = apps.get(&descriptor.function.name) {
                if existing.function.source_path != descriptor.function.source_path {
                    return Err(RegistryError::DuplicateName {
                        name: descriptor.function.name.clone(),
                        existing_path: existing.function.source_path.clone(),
                        new_path: descriptor.function.source_path.clone(),
                    });
                }
                return Ok(());
            }
            apps.insert(descriptor.function.name.clone(), descriptor.clone());
        }
        self.register_function(descriptor.function)
    }

    /// Register a class.
    pub fn register_class(&self, descriptor: ClassDescriptor) -> Result<(), RegistryError> {
        let mut classes = self.classes.write().unwrap();
        if let Some(existing) = classes.get(&descriptor.name) {
            if existing.source_path != descriptor.source_path {
                return Err(RegistryError::DuplicateName {
                    name: descriptor.name.clone(),
                    existing_path: existing.source_path.clone(),
                    new_path: descriptor.source_path.clone(),
                });
            }
            return Ok(());
        }
        classes.insert(descriptor.name.clone(), descriptor);
        Ok(())
    }

    /// Look up a function by name.
    pub fn function(&self, name: &str) -> Result<FunctionDescriptor, RegistryError> {
        self.functions
            .read()
            .unwrap()
            .get(name)
            .cloned()
            .ok_or_else(|| RegistryError::NotFound(name.to_string()))
    }

    /// Look up an application by its entry function name.
    pub fn application(&self, name: &str) -> Result<ApplicationDescriptor, RegistryError> {
        self.applications
            .read()
            .unwrap()
            .get(name)
            .cloned()
            .ok_or_else(|| RegistryError::NotFound(name.to_string()))
    }

    /// Look up a class by name.
    pub fn class(&self, name: &str) -> Result<ClassDescriptor, RegistryError> {
        self.classes
            .read()
            .unwrap()
            .get(name)
            .cloned()
            .ok_or_else(|| RegistryError::NotFound(name.to_string()))
    }

    /// Snapshot every registered function.
    pub fn functions(&self) -> Vec<FunctionDescriptor> {
        self.functions.read().unwrap().values().cloned().collect()
    }

    /// Snapshot every registered class.
    pub fn classes(&self) -> Vec<ClassDescriptor> {
        self.classes.read().unwrap().values().cloned().collect()
    }

    /// Snapshot every registered application.
    pub fn applications(&self) -> Vec<ApplicationDescriptor> {
        self.applications.read().unwrap().values().cloned().collect()
    }
}

/// Severity of one validation finding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Aborts deployment.
    Error,
    /// Surfaced but does not block deployment.
    Warning,
}

/// One structured validation finding.
#[derive(Debug, Clone)]
pub struct ValidationIssue {
    /// How serious this finding is.
    pub severity: Severity,
    /// Human-readable message.
    pub message: String,
    /// Source path the finding applies to.
    pub file: String,
}

/// Pre-deployment static analysis over a [`Registry`] (§4.7). Returns every
/// finding; callers should treat any [`Severity::Error`] as blocking.
pub fn validate(registry: &Registry) -> Vec<ValidationIssue> {
    let mut issues = Vec::new();

    for class in registry.classes() {
        if !class.is_module_level {
            issues.push(ValidationIssue {
                severity: Severity::Error,
                message: format!(
                    "class {:?} must be declared at module scope, not nested",
                    class.name
                ),
                file: class.source_path.clone(),
            });
        }
        let has_methods = registry
            .functions()
            .iter()
            .any(|f| f.class_name.as_deref() == Some(class.name.as_str()));
        if has_methods && !class.has_parameterless_constructor {
            issues.push(ValidationIssue {
                severity: Severity::Error,
                message: format!(
                    "class {:?} has method-functions but no parameter-free constructor",
                    class.name
                ),
                file: class.source_path.clone(),
            });
        }
    }

    for function in registry.functions() {
        if let Some(class_name) = &function.class_name {
            if registry.class(class_name).is_err() {
                issues.push(ValidationIssue {
                    severity: Severity::Error,
                    message: format!(
                        "method-function {:?} declares class {:?}, which is not decorated",
                        function.name, class_name
                    ),
                    file: function.source_path.clone(),
                });
            }
        }
    }

    for app in registry.applications() {
        if !app.function.untyped_parameters.is_empty() {
            issues.push(ValidationIssue {
                severity: Severity::Error,
                message: format!(
                    "application {:?} has parameters without a serializable type hint: {}",
                    app.function.name,
                    app.function.untyped_parameters.join(", ")
                ),
                file: app.function.source_path.clone(),
            });
        }
        if app.function.returns_awaitable {
            issues.push(ValidationIssue {
                severity: Severity::Error,
                message: format!(
                    "application {:?} declares a return type that is itself awaitable",
                    app.function.name
                ),
                file: app.function.source_path.clone(),
            });
        }
    }

    issues
}

#[cfg(test)]
mod tests {
    use super::*;

    fn _assert_send_sync<T: Send + Sync>() {}
    #[test]
    fn registry_is_send_sync() {
        _assert_send_sync::<Registry>();
    }

    #[test]
    fn reregistering_from_the_same_path_is_idempotent() {
        let reg = Registry::new();
        let d = FunctionDescriptor::new("add", "lib.rs");
        reg.register_function(d.clone()).unwrap();
        reg.register_function(d).unwrap();
        assert_eq!(reg.functions().len(), 1);
    }

    #[test]
    fn duplicate_name_from_different_path_is_rejected() {
        let reg = Registry::new();
        reg.register_function(FunctionDescriptor::new("add", "a.rs"))
            .unwrap();
        let err = reg
            .register_function(FunctionDescriptor::new("add", "b.rs"))
            .unwrap_err();
        assert!(matches!(err, RegistryError::DuplicateName { .. }));
    }

    #[test]
    fn validation_flags_method_function_without_decorated_class() {
        let reg = Registry::new();
        reg.register_function(FunctionDescriptor::new("run", "a.rs").method_of("Worker"))
            .unwrap();
        let issues = validate(&reg);
        assert!(issues
            .iter()
            .any(|i| i.severity == Severity::Error && i.message.contains("Worker")));
    }

    #[test]
    fn validation_flags_missing_parameterless_constructor() {
        let reg = Registry::new();
        reg.register_class(ClassDescriptor {
            name: "Worker".to_string(),
            source_path: "a.rs".to_string(),
            has_parameterless_constructor: false,
            is_module_level: true,
        })
        .unwrap();
        reg.register_function(FunctionDescriptor::new("run", "a.rs").method_of("Worker"))
            .unwrap();
        let issues = validate(&reg);
        assert!(issues
            .iter()
            .any(|i| i.message.contains("parameter-free constructor")));
    }

    #[test]
    fn validation_flags_application_with_untyped_parameter() {
        let reg = Registry::new();
        let f = FunctionDescriptor::new("entry", "a.rs")
            .with_parameters(vec!["payload".to_string()])
            .with_untyped_parameters(vec!["payload".to_string()]);
        reg.register_application(ApplicationDescriptor {
            function: f,
            tags: HashMap::new(),
            region_policy: None,
            version: "v1".to_string(),
        })
        .unwrap();
        let issues = validate(&reg);
        assert!(issues
            .iter()
            .any(|i| i.severity == Severity::Error && i.message.contains("payload")));
    }

    #[test]
    fn validation_flags_application_returning_an_awaitable() {
        let reg = Registry::new();
        let f = FunctionDescriptor::new("entry", "a.rs").returning_awaitable();
        reg.register_application(ApplicationDescriptor {
            function: f,
            tags: HashMap::new(),
            region_policy: None,
            version: "v1".to_string(),
        })
        .unwrap();
        let issues = validate(&reg);
        assert!(issues
            .iter()
            .any(|i| i.severity == Severity::Error && i.message.contains("awaitable")));
    }

    #[test]
    fn validation_is_clean_for_a_well_formed_registry() {
        let reg = Registry::new();
        reg.register_class(ClassDescriptor {
            name: "Worker".to_string(),
            source_path: "a.rs".to_string(),
            has_parameterless_constructor: true,
            is_module_level: true,
        })
        .unwrap();
        reg.register_function(FunctionDescriptor::new("run", "a.rs").method_of("Worker"))
            .unwrap();
        let issues = validate(&reg);
        assert!(issues.iter().all(|i| i.severity != Severity::Error));
    }
}
