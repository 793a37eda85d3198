//! One live connection to one language server rooted at one workspace
//! directory: child process lifecycle, the initialize/shutdown handshake,
//! and request/response correlation over the framed transport.

use std::collections::HashMap;
use std::path::Path;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::sync::Mutex as StdMutex;
use std::sync::RwLock;
use std::sync::Weak;
use std::sync::atomic::AtomicI64;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;

use lsp_types::Url;
use serde::Serialize;
use serde_json::Value;
use tokio::io::AsyncBufRead;
use tokio::io::AsyncBufReadExt;
use tokio::io::AsyncWrite;
use tokio::io::BufReader;
use tokio::process::Child;
use tokio::process::Command;
use tokio::sync::Mutex;
use tokio::sync::oneshot;
use tokio::time::Duration;
use tokio::time::timeout;
use tracing::debug;
use tracing::info;
use tracing::trace;
use tracing::warn;

use crate::decode;
use crate::diagnostics::DiagnosticStore;
use crate::diagnostics::ServerDiagnostic;
use crate::error::LspErr;
use crate::error::Result;
use crate::hooks;
use crate::protocol::FrameHeader;
use crate::protocol::NotificationEnvelope;
use crate::protocol::RequestEnvelope;
use crate::runnable::ServerSpec;
use crate::transport;

/// Fixed deadline for every request.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

type BoxReader = Box<dyn AsyncBufRead + Send + Unpin>;
type BoxWriter = Box<dyn AsyncWrite + Send + Unpin>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    /// No child running
    Created,
    /// Child running, handshake not yet confirmed
    Initialized,
    /// Initialize response received
    Running,
    /// Shutdown issued, respawn pending
    Restarting,
}

impl std::fmt::Display for State {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Created => "created",
            Self::Initialized => "initialized",
            Self::Running => "running",
            Self::Restarting => "restarting",
        };
        f.write_str(name)
    }
}

pub struct Session {
    spec: Arc<ServerSpec>,
    root: PathBuf,
    /// Self-handle for the receive task and diagnostic back-references.
    weak: Weak<Session>,
    child: StdMutex<Option<Child>>,
    reader: StdMutex<Option<BoxReader>>,
    /// The session write-lock: at most one frame is on its way to stdin at
    /// any time.
    writer: Mutex<Option<BoxWriter>>,
    capabilities: RwLock<Value>,
    state: StdMutex<State>,
    request_id: AtomicI64,
    responses: Mutex<HashMap<i64, oneshot::Sender<Vec<u8>>>>,
    /// Bumped on every murder so a receive loop reading a dead child's
    /// stdout cannot touch the respawned session.
    generation: AtomicU64,
    diagnostics: DiagnosticStore,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("server", &self.spec.name)
            .field("root", &self.root)
            .field("state", &self.state())
            .finish()
    }
}

pub(crate) fn file_uri(path: &Path) -> Result<Url> {
    Url::from_file_path(path)
        .map_err(|()| LspErr::Internal(format!("not an absolute path: {}", path.display())))
}

impl Session {
    /// Create a session for `spec` rooted at `dir` (or at the spec's cwd
    /// override). No child is spawned yet.
    pub(crate) fn create(spec: Arc<ServerSpec>, dir: &Path) -> Result<Arc<Self>> {
        let cwd = spec.get_cwd()?;
        let root = if cwd.is_empty() {
            dir.to_path_buf()
        } else {
            PathBuf::from(cwd)
        };
        Ok(Arc::new_cyclic(|weak| Self {
            spec,
            root,
            weak: weak.clone(),
            child: StdMutex::new(None),
            reader: StdMutex::new(None),
            writer: Mutex::new(None),
            capabilities: RwLock::new(Value::Null),
            state: StdMutex::new(State::Created),
            request_id: AtomicI64::new(0),
            responses: Mutex::new(HashMap::new()),
            generation: AtomicU64::new(0),
            diagnostics: DiagnosticStore::default(),
        }))
    }

    /// Wire a session over arbitrary streams instead of a spawned child.
    /// The session starts in `Initialized`, ready for [`Session::initialize`].
    pub fn from_io(
        spec: Arc<ServerSpec>,
        root: &Path,
        reader: BoxReader,
        writer: BoxWriter,
    ) -> Arc<Self> {
        Arc::new_cyclic(|weak| Self {
            spec,
            root: root.to_path_buf(),
            weak: weak.clone(),
            child: StdMutex::new(None),
            reader: StdMutex::new(Some(reader)),
            writer: Mutex::new(Some(writer)),
            capabilities: RwLock::new(Value::Null),
            state: StdMutex::new(State::Initialized),
            request_id: AtomicI64::new(0),
            responses: Mutex::new(HashMap::new()),
            generation: AtomicU64::new(0),
            diagnostics: DiagnosticStore::default(),
        })
    }

    pub fn language(&self) -> &Arc<ServerSpec> {
        &self.spec
    }

    pub fn name(&self) -> &str {
        &self.spec.name
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn state(&self) -> State {
        *self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn set_state(&self, state: State) {
        *self.state.lock().unwrap_or_else(|e| e.into_inner()) = state;
    }

    pub fn capabilities(&self) -> Value {
        self.capabilities
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub(crate) fn capability(&self, name: &str) -> bool {
        let capabilities = self.capabilities.read().unwrap_or_else(|e| e.into_inner());
        match capabilities.get(name) {
            Some(Value::Bool(enabled)) => *enabled,
            Some(Value::Null) | None => false,
            Some(_) => true,
        }
    }

    pub(crate) fn state_guard(&self, expected: &[State]) -> Result<()> {
        let actual = self.state();
        if expected.contains(&actual) {
            return Ok(());
        }
        let mut wanted = String::new();
        for (i, state) in expected.iter().enumerate() {
            if i > 0 {
                wanted.push_str(if i + 1 == expected.len() { " or " } else { ", " });
            }
            wanted.push_str(&state.to_string());
        }
        Err(LspErr::StateViolation {
            expected: wanted,
            server: self.spec.name.clone(),
            actual: actual.to_string(),
        })
    }

    /// Spawn the child: resolve command, env and cwd, inherit the current
    /// environment and overlay the spec's env map.
    pub(crate) async fn run_command(&self) -> Result<()> {
        self.state_guard(&[State::Created])?;
        if self.child.lock().unwrap_or_else(|e| e.into_inner()).is_some() {
            return Err(LspErr::SpawnFailure {
                server: self.spec.name.clone(),
                reason: "already running".to_string(),
            });
        }

        let tokens = self.spec.get_command(&self.root.to_string_lossy())?;
        let Some(program) = tokens.first() else {
            return Err(LspErr::SpawnFailure {
                server: self.spec.name.clone(),
                reason: "command must not be empty".to_string(),
            });
        };

        let mut child = Command::new(program)
            .args(&tokens[1..])
            .envs(self.spec.get_env()?)
            .current_dir(&self.root)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|err| LspErr::SpawnFailure {
                server: self.spec.name.clone(),
                reason: err.to_string(),
            })?;

        let stdin = child.stdin.take().ok_or_else(|| LspErr::SpawnFailure {
            server: self.spec.name.clone(),
            reason: "missing child stdin".to_string(),
        })?;
        let stdout = child.stdout.take().ok_or_else(|| LspErr::SpawnFailure {
            server: self.spec.name.clone(),
            reason: "missing child stdout".to_string(),
        })?;
        if let Some(stderr) = child.stderr.take() {
            let server = self.spec.name.clone();
            tokio::spawn(async move {
                let mut stderr = BufReader::new(stderr);
                let mut line = String::new();
                loop {
                    line.clear();
                    let bytes = stderr.read_line(&mut line).await.unwrap_or(0);
                    if bytes == 0 {
                        break;
                    }
                    let trimmed = line.trim_end();
                    if !trimmed.is_empty() {
                        debug!(server = %server, "stderr: {trimmed}");
                    }
                }
            });
        }

        *self.child.lock().unwrap_or_else(|e| e.into_inner()) = Some(child);
        *self.reader.lock().unwrap_or_else(|e| e.into_inner()) =
            Some(Box::new(BufReader::new(stdout)));
        *self.writer.lock().await = Some(Box::new(stdin));
        self.set_state(State::Initialized);
        info!(server = %self.spec.name, root = %self.root.display(), "spawned language server");
        Ok(())
    }

    /// Perform the initialize handshake: send `initialize`, record the
    /// server's capabilities, confirm with `initialized`. On failure the
    /// child is murdered and the session drops back to `Created`.
    pub async fn initialize(&self) -> Result<()> {
        self.state_guard(&[State::Initialized])?;
        let params = self.initialize_params();
        self.start_receive()?;

        let bytes = match self.send_request("initialize", params).await {
            Ok(bytes) => bytes,
            Err(err) => {
                warn!(server = %self.spec.name, %err, "initialize failed");
                self.murder().await;
                return Err(err);
            }
        };
        if let Err(err) = decode::check_error(&bytes) {
            warn!(server = %self.spec.name, %err, "initialize rejected");
            self.murder().await;
            return Err(err);
        }

        let result = decode::result_value(&bytes)?;
        let capabilities = result.get("capabilities").cloned().unwrap_or(Value::Null);
        *self.capabilities.write().unwrap_or_else(|e| e.into_inner()) = capabilities;
        self.set_state(State::Running);

        if let Err(err) = self.send_notification("initialized", serde_json::json!({})).await {
            warn!(server = %self.spec.name, %err, "initialized notification failed");
        }
        info!(server = %self.spec.name, root = %self.root.display(), "language server running");
        Ok(())
    }

    #[allow(deprecated)] // root_uri is still what most servers actually read
    fn initialize_params(&self) -> lsp_types::InitializeParams {
        let mut options = self.spec.options.clone();
        let override_path = self.root.join(format!("{}.mlsp.json", self.spec.name));
        match std::fs::read(&override_path) {
            Ok(data) => match serde_json::from_slice::<Value>(&data) {
                Ok(value) => options = value,
                Err(err) => {
                    warn!(path = %override_path.display(), %err, "unparsable options file")
                }
            },
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %override_path.display(), "no workspace options, using defaults");
            }
            Err(err) => warn!(path = %override_path.display(), %err, "unreadable options file"),
        }

        let root_uri = Url::from_file_path(&self.root).ok();
        let workspace_folders = root_uri.clone().map(|uri| {
            vec![lsp_types::WorkspaceFolder {
                name: self
                    .root
                    .file_name()
                    .map(|name| name.to_string_lossy().into_owned())
                    .unwrap_or_default(),
                uri,
            }]
        });

        lsp_types::InitializeParams {
            process_id: Some(std::process::id()),
            root_uri,
            workspace_folders,
            initialization_options: (!options.is_null()).then_some(options),
            capabilities: lsp_types::ClientCapabilities {
                workspace: Some(lsp_types::WorkspaceClientCapabilities {
                    workspace_edit: Some(lsp_types::WorkspaceEditClientCapabilities {
                        document_changes: Some(true),
                        resource_operations: Some(vec![
                            lsp_types::ResourceOperationKind::Create,
                            lsp_types::ResourceOperationKind::Rename,
                            lsp_types::ResourceOperationKind::Delete,
                        ]),
                        ..Default::default()
                    }),
                    apply_edit: Some(true),
                    ..Default::default()
                }),
                text_document: Some(lsp_types::TextDocumentClientCapabilities {
                    formatting: Some(lsp_types::DynamicRegistrationClientCapabilities {
                        dynamic_registration: Some(true),
                    }),
                    completion: Some(lsp_types::CompletionClientCapabilities {
                        dynamic_registration: Some(true),
                        completion_item: Some(lsp_types::CompletionItemCapability {
                            snippet_support: Some(false),
                            commit_characters_support: Some(false),
                            documentation_format: Some(vec![lsp_types::MarkupKind::PlainText]),
                            deprecated_support: Some(false),
                            preselect_support: Some(false),
                            insert_replace_support: Some(false),
                            ..Default::default()
                        }),
                        context_support: Some(false),
                        ..Default::default()
                    }),
                    rename: Some(lsp_types::RenameClientCapabilities {
                        dynamic_registration: Some(true),
                        prepare_support: Some(true),
                        honors_change_annotations: Some(false),
                        ..Default::default()
                    }),
                    hover: Some(lsp_types::HoverClientCapabilities {
                        dynamic_registration: Some(true),
                        content_format: Some(vec![lsp_types::MarkupKind::PlainText]),
                        ..Default::default()
                    }),
                    ..Default::default()
                }),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    fn start_receive(&self) -> Result<()> {
        let reader = self
            .reader
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take()
            .ok_or_else(|| LspErr::Internal("receive stream already taken".to_string()))?;
        let session = self
            .weak
            .upgrade()
            .ok_or_else(|| LspErr::Internal("session dropped".to_string()))?;
        let generation = self.generation.load(Ordering::SeqCst);
        tokio::spawn(async move { session.receive(reader, generation).await });
        Ok(())
    }

    async fn receive(&self, mut reader: BoxReader, generation: u64) {
        loop {
            if self.generation.load(Ordering::SeqCst) != generation
                || self.state() == State::Created
            {
                return;
            }
            match transport::read_frame(&mut *reader).await {
                Ok(payload) if payload.is_empty() => continue,
                Ok(payload) => {
                    if self.generation.load(Ordering::SeqCst) != generation {
                        return;
                    }
                    self.dispatch(&payload).await;
                    hooks::redraw();
                }
                Err(LspErr::Eof) => {
                    info!(server = %self.spec.name, "received EOF, shutting down");
                    if self.generation.load(Ordering::SeqCst) == generation {
                        self.murder().await;
                    }
                    return;
                }
                Err(LspErr::Io(err)) => {
                    warn!(server = %self.spec.name, %err, "read failed, shutting down");
                    if self.generation.load(Ordering::SeqCst) == generation {
                        self.murder().await;
                    }
                    return;
                }
                Err(err) => {
                    warn!(server = %self.spec.name, %err, "dropping frame");
                }
            }
        }
    }

    async fn dispatch(&self, payload: &[u8]) {
        let header: FrameHeader = match serde_json::from_slice(payload) {
            Ok(header) => header,
            Err(err) => {
                warn!(server = %self.spec.name, %err, "unparsable frame");
                return;
            }
        };

        match header.method.as_deref() {
            Some("textDocument/publishDiagnostics") => self.store_diagnostics(payload),
            Some(method) if !method.is_empty() => {
                // Server-initiated request or notification outside our
                // vocabulary (window/logMessage, client/registerCapability...)
                trace!(server = %self.spec.name, method, "ignoring server message");
            }
            _ => {
                let Some(id) = header.id else {
                    return;
                };
                let sender = self.responses.lock().await.remove(&id);
                match sender {
                    Some(sender) => {
                        debug!(server = %self.spec.name, id, "got response");
                        // a dropped receiver means the deadline already fired
                        let _ = sender.send(payload.to_vec());
                    }
                    None => trace!(server = %self.spec.name, id, "late response, dropped"),
                }
            }
        }
    }

    fn store_diagnostics(&self, payload: &[u8]) {
        #[derive(serde::Deserialize)]
        struct DiagnosticsFrame {
            params: lsp_types::PublishDiagnosticsParams,
        }
        let frame: DiagnosticsFrame = match serde_json::from_slice(payload) {
            Ok(frame) => frame,
            Err(err) => {
                warn!(server = %self.spec.name, %err, "unparsable diagnostics");
                return;
            }
        };
        let diagnostics = frame
            .params
            .diagnostics
            .into_iter()
            .map(|diagnostic| ServerDiagnostic {
                diagnostic,
                session: self.weak.clone(),
            })
            .collect();
        self.diagnostics.publish(frame.params.uri, diagnostics);
    }

    async fn write_payload(&self, payload: &[u8]) -> Result<()> {
        let mut writer = self.writer.lock().await;
        let Some(writer) = writer.as_mut() else {
            return Err(LspErr::Transport("write handle closed".to_string()));
        };
        transport::write_frame(&mut **writer, payload).await
    }

    /// Allocate the next id, register a response channel, write the request,
    /// then wait for the response or the 5-second deadline, whichever fires
    /// first. The id is deregistered on every exit path.
    pub(crate) async fn send_request<P: Serialize>(
        &self,
        method: &str,
        params: P,
    ) -> Result<Vec<u8>> {
        self.state_guard(&[State::Initialized, State::Running, State::Restarting])?;

        let id = self.request_id.fetch_add(1, Ordering::SeqCst);
        let payload = serde_json::to_vec(&RequestEnvelope::new(id, method, params))?;

        let (tx, rx) = oneshot::channel();
        self.responses.lock().await.insert(id, tx);

        debug!(server = %self.spec.name, id, method, "request");
        trace!(server = %self.spec.name, payload = %String::from_utf8_lossy(&payload), ">>>");

        if let Err(err) = self.write_payload(&payload).await {
            self.responses.lock().await.remove(&id);
            return Err(err);
        }

        let outcome = match timeout(REQUEST_TIMEOUT, rx).await {
            Ok(Ok(bytes)) => Ok(bytes),
            Ok(Err(_)) => Err(LspErr::Transport("response channel closed".to_string())),
            Err(_) => {
                self.cancel_request(id).await;
                Err(LspErr::Timeout)
            }
        };
        self.responses.lock().await.remove(&id);

        if let Err(err) = &outcome {
            warn!(server = %self.spec.name, id, method, %err, "request failed");
        }
        outcome
    }

    /// Best-effort `$/cancelRequest` after a deadline fires.
    async fn cancel_request(&self, id: i64) {
        let notification =
            NotificationEnvelope::new("$/cancelRequest", serde_json::json!({ "id": id }));
        if let Ok(payload) = serde_json::to_vec(&notification) {
            let _ = self.write_payload(&payload).await;
        }
    }

    pub(crate) async fn send_notification<P: Serialize>(
        &self,
        method: &str,
        params: P,
    ) -> Result<()> {
        self.state_guard(&[State::Initialized, State::Running, State::Restarting])?;
        let payload = serde_json::to_vec(&NotificationEnvelope::new(method, params))?;
        debug!(server = %self.spec.name, method, "notify");
        self.write_payload(&payload).await
    }

    /// Cooperative shutdown: `shutdown` request, `exit` notification, then
    /// reap (or kill) the child.
    pub async fn shutdown(&self) {
        if self.state_guard(&[State::Initialized, State::Running]).is_err() {
            return;
        }
        let _ = self.send_request("shutdown", Value::Null).await;
        let _ = self.send_notification("exit", Value::Null).await;
        self.murder().await;
    }

    /// Force the session back to `Created`, killing the child if it is still
    /// alive and failing every in-flight request.
    pub(crate) async fn murder(&self) {
        self.set_state(State::Created);
        self.generation.fetch_add(1, Ordering::SeqCst);

        let child = self.child.lock().unwrap_or_else(|e| e.into_inner()).take();
        if let Some(mut child) = child {
            match child.try_wait() {
                Ok(Some(status)) => debug!(server = %self.spec.name, %status, "child exited"),
                _ => {
                    let _ = child.start_kill();
                    let _ = child.wait().await;
                    debug!(server = %self.spec.name, "child killed");
                }
            }
        }

        *self.writer.lock().await = None;
        *self.reader.lock().unwrap_or_else(|e| e.into_inner()) = None;
        *self.capabilities.write().unwrap_or_else(|e| e.into_inner()) = Value::Null;

        // wake in-flight callers with a transport failure
        let pending: Vec<_> = {
            let mut responses = self.responses.lock().await;
            responses.drain().map(|(_, sender)| sender).collect()
        };
        drop(pending);
    }

    /// Shutdown followed by a fresh spawn and handshake.
    pub async fn restart(&self) -> Result<()> {
        self.state_guard(&[State::Initialized, State::Running])?;
        self.set_state(State::Restarting);
        let _ = self.send_request("shutdown", Value::Null).await;
        let _ = self.send_notification("exit", Value::Null).await;
        self.murder().await;
        self.run_command().await?;
        self.initialize().await
    }

    pub fn get_diagnostics(&self, path: &Path) -> Vec<ServerDiagnostic> {
        match file_uri(path) {
            Ok(uri) => self.diagnostics.get(&uri),
            Err(_) => Vec::new(),
        }
    }

    pub fn diagnostics_count(&self, path: &Path) -> usize {
        match file_uri(path) {
            Ok(uri) => self.diagnostics.count(&uri),
            Err(_) => 0,
        }
    }

    pub(crate) fn diagnostics(&self) -> &DiagnosticStore {
        &self.diagnostics
    }

    /// Whether the server binary is present (see [`ServerSpec::installed`]).
    pub async fn installed(&self) -> bool {
        self.spec.installed().await
    }

    /// Run the spec's install recipe.
    pub async fn do_install(&self) -> Result<()> {
        self.spec.do_install().await
    }
}
