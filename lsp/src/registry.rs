//! Process-wide index of active sessions.
//!
//! Sessions are keyed by server name plus workspace root; one server may
//! serve many roots and many languages may share one server. The registry
//! mutex serializes get-or-start so two callers cannot race a spawn for the
//! same key. Teardown is [`shutdown_all_servers`].

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::sync::LazyLock;

use tokio::sync::Mutex;
use tracing::warn;

use crate::runnable::ServerSpec;
use crate::session::Session;
use crate::session::State;

static SERVERS: LazyLock<Mutex<HashMap<String, Arc<Session>>>> =
    LazyLock::new(|| Mutex::new(HashMap::new()));

fn key(spec: &ServerSpec, dir: &Path) -> String {
    format!("{}-{}", spec.name, dir.display())
}

/// Return the session serving (`spec`, `dir`), starting and initializing one
/// if needed. Returns None when `path` is outside the spec's filetypes or
/// the child cannot be spawned. A session found in `Created` (a previous
/// crash or shutdown) is respawned in place.
pub async fn get_or_start_server(
    spec: &Arc<ServerSpec>,
    dir: &Path,
    path: &Path,
) -> Option<Arc<Session>> {
    if !spec.valid_for(path) {
        return None;
    }

    let mut servers = SERVERS.lock().await;
    if let Some(session) = servers.get(&key(spec, dir)) {
        let session = Arc::clone(session);
        if session.state() == State::Created {
            if let Err(err) = respawn(&session).await {
                warn!(server = %spec.name, %err, "failed to restart server");
            }
        }
        return Some(session);
    }

    let session = match Session::create(Arc::clone(spec), dir) {
        Ok(session) => session,
        Err(err) => {
            warn!(server = %spec.name, dir = %dir.display(), %err, "failed to create session");
            return None;
        }
    };
    if let Err(err) = session.run_command().await {
        warn!(server = %spec.name, dir = %dir.display(), %err, "failed to start server");
        return None;
    }

    // installed before the handshake so concurrent lookups see it
    servers.insert(key(spec, dir), Arc::clone(&session));
    if let Err(err) = session.initialize().await {
        warn!(server = %spec.name, %err, "handshake failed");
    }
    Some(session)
}

async fn respawn(session: &Arc<Session>) -> crate::error::Result<()> {
    session.run_command().await?;
    session.initialize().await
}

/// Names of every server with a live child.
pub async fn get_active_server_names() -> Vec<String> {
    let servers = SERVERS.lock().await;
    servers
        .values()
        .filter(|session| session.state() != State::Created)
        .map(|session| session.name().to_string())
        .collect()
}

/// Cooperatively shut down every running session.
pub async fn shutdown_all_servers() {
    let servers = SERVERS.lock().await;
    for session in servers.values() {
        if session.state() != State::Created {
            session.shutdown().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runnable::Runnable;
    use serde_json::Value;

    fn spec(name: &str, command: &str) -> Arc<ServerSpec> {
        Arc::new(ServerSpec {
            name: name.to_string(),
            languages: vec!["rust".to_string()],
            command: Runnable::Command(vec![command.to_string()]),
            install: Runnable::NoOp,
            is_installed: Runnable::NoOp,
            env: Runnable::NoOp,
            cwd: Runnable::NoOp,
            options: Value::Null,
        })
    }

    #[tokio::test]
    async fn filetype_filter_gates_session_creation() {
        let spec = spec("registry-filter", "definitely-not-a-binary-zz");
        let session =
            get_or_start_server(&spec, Path::new("/tmp"), Path::new("/tmp/readme.txt")).await;
        assert!(session.is_none());
    }

    #[tokio::test]
    async fn spawn_failure_yields_no_session() {
        let spec = spec("registry-missing", "definitely-not-a-binary-zz");
        let session =
            get_or_start_server(&spec, Path::new("/tmp"), Path::new("/tmp/lib.rs")).await;
        assert!(session.is_none());
        assert!(!get_active_server_names().await.contains(&"registry-missing".to_string()));
    }
}
