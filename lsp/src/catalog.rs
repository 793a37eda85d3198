//! Declarative server catalog.
//!
//! The catalog is a YAML document mapping language keys to server records.
//! `command` plus `args` must resolve to a launch command (strict); every
//! other field may be absent and degrades to a no-op. A default catalog
//! ships in the binary; on first run it is written to the user's config
//! directory, and the user's copy is read from then on.

use std::collections::HashMap;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::LazyLock;
use std::sync::RwLock;

use serde::Deserialize;
use serde_json::Value;
use tracing::debug;
use tracing::info;
use tracing::warn;

use crate::error::LspErr;
use crate::error::Result;
use crate::runnable::RawValue;
use crate::runnable::ServerSpec;
use crate::runnable::resolve;

/// Catalog file name inside the config directory.
pub const CATALOG_FILE: &str = "lsp.yaml";

const DEFAULT_CATALOG: &str = include_str!("default_servers.yaml");

static CATALOG: LazyLock<RwLock<HashMap<String, Arc<ServerSpec>>>> =
    LazyLock::new(|| RwLock::new(HashMap::new()));

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawCatalog {
    language: HashMap<String, RawRecord>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawRecord {
    name: Option<String>,
    command: Option<String>,
    args: Vec<String>,
    install: Value,
    is_installed: Value,
    env: Value,
    cwd: Value,
    languages: Vec<String>,
    options: Value,
}

/// Parse a catalog document. The interface is bytes in, specs out; YAML is
/// the concrete syntax.
pub fn load_catalog(data: &[u8]) -> Result<HashMap<String, Arc<ServerSpec>>> {
    let raw: RawCatalog = serde_yaml::from_slice(data).map_err(|err| LspErr::ConfigurationFailure {
        server: "catalog".to_string(),
        field: "language".to_string(),
        reason: err.to_string(),
    })?;

    let mut catalog = HashMap::with_capacity(raw.language.len());
    for (key, record) in raw.language {
        let spec = build_spec(&key, record)?;
        catalog.insert(key, spec);
    }
    Ok(catalog)
}

fn build_spec(key: &str, record: RawRecord) -> Result<Arc<ServerSpec>> {
    let name = record
        .name
        .or_else(|| record.command.clone())
        .unwrap_or_else(|| key.to_string());

    // command and args concatenate into one token vector
    let command_value = match record.command {
        Some(command) => {
            let mut tokens = vec![Value::String(command)];
            tokens.extend(record.args.into_iter().map(Value::String));
            Value::Array(tokens)
        }
        None => Value::Null,
    };

    let languages = if record.languages.is_empty() {
        vec![key.to_string()]
    } else {
        record.languages
    };

    Ok(Arc::new(ServerSpec {
        command: resolve(&name, "command", command_value.into(), true)?,
        install: resolve(&name, "install", record.install.into(), false)?,
        is_installed: resolve(&name, "is_installed", record.is_installed.into(), false)?,
        env: resolve(&name, "env", record.env.into(), false)?,
        cwd: resolve(&name, "cwd", record.cwd.into(), false)?,
        options: record.options,
        name,
        languages,
    }))
}

/// Load the catalog into the process-wide table.
///
/// `<config_dir>/lsp.yaml` is read when present; otherwise the embedded
/// default is written there and used. A previously loaded catalog is
/// replaced wholesale.
pub fn init(config_dir: &Path) -> Result<()> {
    let path = config_dir.join(CATALOG_FILE);
    let data = if path.exists() {
        std::fs::read(&path)?
    } else {
        if let Err(err) = std::fs::create_dir_all(config_dir)
            .and_then(|()| std::fs::write(&path, DEFAULT_CATALOG))
        {
            warn!(path = %path.display(), %err, "could not write default catalog");
        }
        DEFAULT_CATALOG.as_bytes().to_vec()
    };

    let catalog = load_catalog(&data)?;
    info!(servers = catalog.len(), path = %path.display(), "catalog loaded");
    *CATALOG.write().unwrap_or_else(|e| e.into_inner()) = catalog;
    Ok(())
}

/// The user config directory the engine defaults to.
pub fn default_config_dir() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("mlsp"))
}

/// Look up the spec covering a language, by catalog key first and declared
/// language list second.
pub fn get_language(language: &str) -> Option<Arc<ServerSpec>> {
    let catalog = CATALOG.read().unwrap_or_else(|e| e.into_inner());
    if let Some(spec) = catalog.get(language) {
        return Some(Arc::clone(spec));
    }
    catalog
        .values()
        .find(|spec| spec.languages.iter().any(|l| l == language))
        .map(Arc::clone)
}

/// Register a server at runtime, e.g. from an editor plugin. The command is
/// resolved strictly; everything else tolerates absence.
pub fn register_language_server(
    language: &str,
    name: &str,
    command: RawValue,
    install: RawValue,
    is_installed: RawValue,
    env: RawValue,
    cwd: RawValue,
) -> Result<()> {
    let spec = Arc::new(ServerSpec {
        name: name.to_string(),
        languages: vec![language.to_string()],
        command: resolve(name, "command", command, true)?,
        install: resolve(name, "install", install, false)?,
        is_installed: resolve(name, "is_installed", is_installed, false)?,
        env: resolve(name, "env", env, false)?,
        cwd: resolve(name, "cwd", cwd, false)?,
        options: Value::Null,
    });
    debug!(language, server = name, "registered language server");
    CATALOG
        .write()
        .unwrap_or_else(|e| e.into_inner())
        .insert(language.to_string(), spec);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runnable::Runnable;
    use pretty_assertions::assert_eq;

    #[test]
    fn embedded_default_catalog_parses() {
        let catalog = load_catalog(DEFAULT_CATALOG.as_bytes()).unwrap();
        let rust = catalog.get("rust").unwrap();
        assert_eq!(rust.name, "rust-analyzer");
        match &rust.command {
            Runnable::Command(tokens) => assert_eq!(tokens, &["rust-analyzer"]),
            other => panic!("unexpected command shape: {other:?}"),
        }
        assert!(matches!(rust.install, Runnable::Commands(_)));
    }

    #[test]
    fn command_and_args_concatenate() {
        let catalog = load_catalog(
            b"language:\n  go:\n    command: gopls\n    args: [\"serve\"]\n",
        )
        .unwrap();
        let go = catalog.get("go").unwrap();
        match &go.command {
            Runnable::Command(tokens) => assert_eq!(tokens, &["gopls", "serve"]),
            other => panic!("unexpected command shape: {other:?}"),
        }
    }

    #[test]
    fn name_defaults_to_command_then_key() {
        let catalog = load_catalog(
            b"language:\n  zig:\n    command: zls\n",
        )
        .unwrap();
        assert_eq!(catalog.get("zig").unwrap().name, "zls");
        assert_eq!(catalog.get("zig").unwrap().languages, vec!["zig"]);
    }

    #[test]
    fn unknown_keys_are_ignored() {
        let catalog = load_catalog(
            b"language:\n  d:\n    command: serve-d\n    shiny_new_field: 12\n",
        )
        .unwrap();
        assert_eq!(catalog.get("d").unwrap().name, "serve-d");
    }

    #[test]
    fn missing_command_fails_the_catalog() {
        let err = load_catalog(b"language:\n  broken:\n    args: [\"--stdio\"]\n").unwrap_err();
        assert!(matches!(err, LspErr::ConfigurationFailure { .. }));
    }

    #[test]
    fn options_blob_is_kept_verbatim() {
        let catalog = load_catalog(
            b"language:\n  lua:\n    command: lua-language-server\n    options:\n      telemetry:\n        enable: false\n",
        )
        .unwrap();
        let options = &catalog.get("lua").unwrap().options;
        assert_eq!(options["telemetry"]["enable"], serde_json::json!(false));
    }

    // one test owns the process-wide catalog; keeping every global
    // assertion here avoids cross-test interference
    #[test]
    fn global_catalog_lifecycle() {
        let dir = tempfile::tempdir().unwrap();
        init(dir.path()).unwrap();
        let written = std::fs::read_to_string(dir.path().join(CATALOG_FILE)).unwrap();
        assert_eq!(written, DEFAULT_CATALOG);

        // lookup by key and by declared language list
        assert_eq!(get_language("rust").unwrap().name, "rust-analyzer");
        assert_eq!(get_language("cpp").unwrap().name, "clangd");
        assert!(get_language("brainfuck").is_none());

        // plugin registration inserts a live entry
        let command = crate::script::HostFn::new(|_, _| Ok(serde_json::json!(["zls"])));
        register_language_server(
            "zig",
            "zls",
            command.into(),
            Value::Null.into(),
            Value::Null.into(),
            Value::Null.into(),
            Value::Null.into(),
        )
        .unwrap();
        let zig = get_language("zig").unwrap();
        assert_eq!(zig.get_command("/w").unwrap(), vec!["zls"]);

        // a user edit survives the next init
        std::fs::write(
            dir.path().join(CATALOG_FILE),
            "language:\n  rust:\n    command: my-analyzer\n",
        )
        .unwrap();
        init(dir.path()).unwrap();
        assert_eq!(get_language("rust").unwrap().name, "my-analyzer");
    }
}
