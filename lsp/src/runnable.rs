//! Polymorphic launch/install configuration.
//!
//! Every configurable field of a server entry (command, install,
//! is-installed, env, cwd) accepts one of several shapes: a literal string, a
//! token vector (one command), a vector of token vectors (a command
//! sequence), a host-language function, a scripting-runtime function, or a
//! name-to-value map. The resolver reduces whatever the catalog or a plugin
//! handed us to exactly one tagged variant; higher layers dispatch on the
//! tag.

use std::collections::HashMap;
use std::path::Path;
use std::process::Stdio;

use serde_json::Value;
use tokio::process::Command;
use tracing::debug;
use tracing::warn;

use crate::error::LspErr;
use crate::error::Result;
use crate::hooks;
use crate::script::HostFn;
use crate::script::ScriptFn;

/// One resolved configuration value. The variant is fixed at construction.
#[derive(Debug, Clone)]
pub enum Runnable {
    NoOp,
    Literal(String),
    Command(Vec<String>),
    Commands(Vec<Vec<String>>),
    Host(HostFn),
    Script(ScriptFn),
    EnvMap(HashMap<String, String>),
}

impl Runnable {
    fn kind(&self) -> &'static str {
        match self {
            Self::NoOp => "no-op",
            Self::Literal(_) => "string",
            Self::Command(_) => "command",
            Self::Commands(_) => "command sequence",
            Self::Host(_) => "host function",
            Self::Script(_) => "script function",
            Self::EnvMap(_) => "env map",
        }
    }

    /// Execute the value. Commands spawn and wait; functions are invoked with
    /// the owning spec and `args`; literals and maps return themselves.
    pub async fn run(&self, spec: &ServerSpec, args: &[Value]) -> Result<Value> {
        match self {
            Self::NoOp => Err(LspErr::NotSupported),
            Self::Literal(s) => Ok(Value::String(s.clone())),
            Self::Command(tokens) => run_tokens(&spec.name, tokens).await,
            Self::Commands(sequence) => {
                let mut results = Vec::with_capacity(sequence.len());
                for tokens in sequence {
                    results.push(run_tokens(&spec.name, tokens).await?);
                }
                Ok(Value::Array(results))
            }
            Self::Host(f) => f
                .call(spec, args)
                .map_err(|err| LspErr::Internal(format!("host function for {}: {err}", spec.name))),
            Self::Script(f) => f
                .call(spec, args)
                .map_err(|err| LspErr::Internal(format!("script function for {}: {err}", spec.name))),
            Self::EnvMap(map) => Ok(serde_json::to_value(map)?),
        }
    }
}

/// Raw field value before resolution: plain data out of the catalog, or a
/// function handed over by the editor or one of its plugins.
#[derive(Debug, Clone)]
pub enum RawValue {
    Json(Value),
    Host(HostFn),
    Script(ScriptFn),
}

impl From<Value> for RawValue {
    fn from(value: Value) -> Self {
        Self::Json(value)
    }
}

impl From<HostFn> for RawValue {
    fn from(f: HostFn) -> Self {
        Self::Host(f)
    }
}

impl From<ScriptFn> for RawValue {
    fn from(f: ScriptFn) -> Self {
        Self::Script(f)
    }
}

/// Reduce a raw value to a [`Runnable`]. Shapes are tried in a fixed order
/// and the first match wins: token matrix, token vector, string, host
/// function, script function, string map. With `strict` set a value that
/// matches nothing rejects the whole entry; otherwise it degrades to
/// [`Runnable::NoOp`].
pub fn resolve(server: &str, field: &str, value: RawValue, strict: bool) -> Result<Runnable> {
    let resolved = match &value {
        RawValue::Json(json) => resolve_json(json),
        RawValue::Host(f) => Some(Runnable::Host(f.clone())),
        RawValue::Script(f) => Some(Runnable::Script(f.clone())),
    };
    match resolved {
        Some(runnable) => Ok(runnable),
        None if strict => Err(LspErr::ConfigurationFailure {
            server: server.to_string(),
            field: field.to_string(),
            reason: format!("no shape matched {value:?}"),
        }),
        None => Ok(Runnable::NoOp),
    }
}

fn resolve_json(value: &Value) -> Option<Runnable> {
    if let Some(matrix) = string_matrix(value) {
        return Some(Runnable::Commands(matrix));
    }
    if let Some(tokens) = string_list(value) {
        return Some(Runnable::Command(tokens));
    }
    if let Value::String(s) = value {
        return Some(Runnable::Literal(s.clone()));
    }
    string_map(value).map(Runnable::EnvMap)
}

fn string_list(value: &Value) -> Option<Vec<String>> {
    let items = value.as_array()?;
    if items.is_empty() {
        return None;
    }
    items
        .iter()
        .map(|item| item.as_str().map(str::to_string))
        .collect()
}

fn string_matrix(value: &Value) -> Option<Vec<Vec<String>>> {
    let items = value.as_array()?;
    if items.is_empty() {
        return None;
    }
    items.iter().map(string_list).collect()
}

fn string_map(value: &Value) -> Option<HashMap<String, String>> {
    let entries = value.as_object()?;
    entries
        .iter()
        .map(|(key, value)| value.as_str().map(|v| (key.clone(), v.to_string())))
        .collect()
}

async fn run_tokens(server: &str, tokens: &[String]) -> Result<Value> {
    let Some(program) = tokens.first() else {
        return Err(LspErr::SpawnFailure {
            server: server.to_string(),
            reason: "command must not be empty".to_string(),
        });
    };
    debug!(server, command = %tokens.join(" "), "running command");
    let status = Command::new(program)
        .args(&tokens[1..])
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .await
        .map_err(|err| LspErr::SpawnFailure {
            server: server.to_string(),
            reason: format!("{program}: {err}"),
        })?;
    if !status.success() {
        return Err(LspErr::SpawnFailure {
            server: server.to_string(),
            reason: format!("{program} exited with {status}"),
        });
    }
    Ok(Value::Bool(true))
}

/// Static catalog entry for one language server. Built by the config loader
/// or plugin registration and immutable afterwards.
#[derive(Debug, Clone)]
pub struct ServerSpec {
    pub name: String,
    pub languages: Vec<String>,
    pub command: Runnable,
    pub install: Runnable,
    pub is_installed: Runnable,
    pub env: Runnable,
    pub cwd: Runnable,
    /// Opaque initialization options forwarded verbatim on the handshake.
    pub options: Value,
}

impl ServerSpec {
    /// Whether this server covers the given path's filetype.
    pub fn valid_for(&self, path: &Path) -> bool {
        match hooks::filetype_for(path) {
            Some(filetype) => self.languages.iter().any(|l| *l == filetype),
            None => false,
        }
    }

    fn config_err(&self, field: &str, reason: impl Into<String>) -> LspErr {
        LspErr::ConfigurationFailure {
            server: self.name.clone(),
            field: field.to_string(),
            reason: reason.into(),
        }
    }

    fn call_fn(&self, runnable: &Runnable, field: &str, args: &[Value]) -> Result<Value> {
        let result = match runnable {
            Runnable::Host(f) => f.call(self, args),
            Runnable::Script(f) => f.call(self, args),
            other => return Err(self.config_err(field, format!("unusable shape {}", other.kind()))),
        };
        result.map_err(|err| self.config_err(field, err.to_string()))
    }

    /// The launch command as a token vector. Function shapes are invoked with
    /// the workspace root and must produce a non-empty vector of strings.
    pub fn get_command(&self, root: &str) -> Result<Vec<String>> {
        match &self.command {
            Runnable::Command(tokens) => Ok(tokens.clone()),
            Runnable::Literal(s) => Ok(vec![s.clone()]),
            Runnable::Host(_) | Runnable::Script(_) => {
                let value =
                    self.call_fn(&self.command, "command", &[Value::String(root.to_string())])?;
                let tokens = string_list(&value)
                    .ok_or_else(|| self.config_err("command", "expected a list of strings"))?;
                Ok(tokens)
            }
            other => Err(self.config_err("command", format!("unusable shape {}", other.kind()))),
        }
    }

    /// The install recipe as a sequence of commands.
    pub fn get_install(&self) -> Result<Vec<Vec<String>>> {
        match &self.install {
            Runnable::Literal(s) => Ok(vec![vec![s.clone()]]),
            Runnable::Command(tokens) => Ok(vec![tokens.clone()]),
            Runnable::Commands(sequence) => Ok(sequence.clone()),
            Runnable::Host(_) | Runnable::Script(_) => {
                let value = self.call_fn(&self.install, "install", &[])?;
                string_matrix(&value)
                    .ok_or_else(|| self.config_err("install", "expected a list of token lists"))
            }
            Runnable::NoOp => Err(LspErr::NotSupported),
            other => Err(self.config_err("install", format!("unusable shape {}", other.kind()))),
        }
    }

    /// The is-installed probe, normalized so a literal becomes a one-token
    /// command.
    pub fn get_is_installed(&self) -> Runnable {
        match &self.is_installed {
            Runnable::Literal(s) => Runnable::Command(vec![s.clone()]),
            other => other.clone(),
        }
    }

    /// Environment overrides overlaid on the inherited environment at spawn.
    pub fn get_env(&self) -> Result<HashMap<String, String>> {
        match &self.env {
            Runnable::EnvMap(map) => Ok(map.clone()),
            Runnable::Host(_) | Runnable::Script(_) => {
                let value = self.call_fn(&self.env, "env", &[])?;
                string_map(&value)
                    .ok_or_else(|| self.config_err("env", "expected a string-to-string map"))
            }
            Runnable::NoOp => Ok(HashMap::new()),
            other => Err(self.config_err("env", format!("unusable shape {}", other.kind()))),
        }
    }

    /// Working directory for the child; empty means the session's directory.
    pub fn get_cwd(&self) -> Result<String> {
        match &self.cwd {
            Runnable::Literal(s) => Ok(s.clone()),
            Runnable::Host(_) | Runnable::Script(_) => {
                let value = self.call_fn(&self.cwd, "cwd", &[])?;
                value
                    .as_str()
                    .map(str::to_string)
                    .ok_or_else(|| self.config_err("cwd", "expected a string"))
            }
            Runnable::NoOp => Ok(String::new()),
            other => Err(self.config_err("cwd", format!("unusable shape {}", other.kind()))),
        }
    }

    /// Probe whether the server binary is available.
    ///
    /// Without an explicit probe the first command token is looked up on
    /// PATH. An explicit probe runs: a command counts as installed iff it
    /// exits zero; a function's first returned value (an array is unwrapped
    /// to its first element) must be a boolean, anything else is false.
    pub async fn installed(&self) -> bool {
        let probe = self.get_is_installed();
        if matches!(probe, Runnable::NoOp) {
            let tokens = match self.get_command("") {
                Ok(tokens) => tokens,
                Err(err) => {
                    warn!(server = %self.name, %err, "is-installed lookup failed");
                    return false;
                }
            };
            let Some(program) = tokens.first() else {
                return false;
            };
            return which::which(program).is_ok();
        }

        match probe.run(self, &[]).await {
            Ok(value) => coerce_installed(&value),
            Err(err) => {
                warn!(server = %self.name, %err, "is-installed probe failed");
                false
            }
        }
    }

    /// Run the install recipe unless the server is already present.
    pub async fn do_install(&self) -> Result<()> {
        if self.installed().await {
            return Ok(());
        }
        let commands = self.get_install()?;
        for tokens in &commands {
            run_tokens(&self.name, tokens).await?;
        }
        Ok(())
    }
}

fn coerce_installed(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::Array(items) => matches!(items.first(), Some(Value::Bool(true))),
        _ => false,
    }
}
