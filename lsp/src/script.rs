//! Function-valued configuration seams.
//!
//! Catalog fields may be functions instead of data: either a host-language
//! closure registered by the embedding editor, or a function living in the
//! editor's scripting runtime. The runtime itself is a collaborator; the
//! engine only holds a dispatch handle to it.

use std::fmt;
use std::sync::Arc;

use serde_json::Value;

use crate::runnable::ServerSpec;

/// Host-language callback: receives the owning server spec and the call
/// arguments, returns a JSON value that is then run through the field's
/// type-expected resolver.
#[derive(Clone)]
pub struct HostFn(pub Arc<dyn Fn(&ServerSpec, &[Value]) -> anyhow::Result<Value> + Send + Sync>);

impl HostFn {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&ServerSpec, &[Value]) -> anyhow::Result<Value> + Send + Sync + 'static,
    {
        Self(Arc::new(f))
    }

    pub fn call(&self, spec: &ServerSpec, args: &[Value]) -> anyhow::Result<Value> {
        (self.0)(spec, args)
    }
}

impl fmt::Debug for HostFn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("HostFn")
    }
}

/// Dispatch interface into the editor's embedded scripting runtime.
pub trait ScriptRuntime: Send + Sync {
    /// Invoke `function` with the server name and arguments, returning the
    /// produced value as JSON.
    fn invoke(&self, function: &str, server: &str, args: &[Value]) -> anyhow::Result<Value>;
}

/// A named function inside a [`ScriptRuntime`].
#[derive(Clone)]
pub struct ScriptFn {
    runtime: Arc<dyn ScriptRuntime>,
    function: String,
}

impl ScriptFn {
    pub fn new(runtime: Arc<dyn ScriptRuntime>, function: impl Into<String>) -> Self {
        Self {
            runtime,
            function: function.into(),
        }
    }

    pub fn call(&self, spec: &ServerSpec, args: &[Value]) -> anyhow::Result<Value> {
        self.runtime.invoke(&self.function, &spec.name, args)
    }
}

impl fmt::Debug for ScriptFn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ScriptFn({})", self.function)
    }
}
