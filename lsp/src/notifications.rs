//! Document-sync notifications.
//!
//! Fire-and-forget: each method serializes its params under the session
//! write-lock and never waits for acknowledgement. Encoder or write failures
//! are logged and swallowed.

use std::path::Path;

use lsp_types::DidChangeTextDocumentParams;
use lsp_types::DidCloseTextDocumentParams;
use lsp_types::DidOpenTextDocumentParams;
use lsp_types::DidSaveTextDocumentParams;
use lsp_types::TextDocumentContentChangeEvent;
use lsp_types::TextDocumentIdentifier;
use lsp_types::TextDocumentItem;
use lsp_types::VersionedTextDocumentIdentifier;
use serde::Serialize;
use tracing::warn;

use crate::session::Session;
use crate::session::file_uri;

impl Session {
    async fn notify_logged<P: Serialize>(&self, method: &str, params: P) {
        if let Err(err) = self.send_notification(method, params).await {
            warn!(server = %self.name(), method, %err, "notification failed");
        }
    }

    pub async fn did_open(&self, path: &Path, language: &str, text: &str, version: i32) {
        let uri = match file_uri(path) {
            Ok(uri) => uri,
            Err(err) => {
                warn!(%err, "didOpen skipped");
                return;
            }
        };
        let params = DidOpenTextDocumentParams {
            text_document: TextDocumentItem {
                uri,
                language_id: language.to_string(),
                version,
                text: text.to_string(),
            },
        };
        self.notify_logged("textDocument/didOpen", params).await;
    }

    pub async fn did_change(
        &self,
        path: &Path,
        version: i32,
        changes: Vec<TextDocumentContentChangeEvent>,
    ) {
        let uri = match file_uri(path) {
            Ok(uri) => uri,
            Err(err) => {
                warn!(%err, "didChange skipped");
                return;
            }
        };
        let params = DidChangeTextDocumentParams {
            text_document: VersionedTextDocumentIdentifier { uri, version },
            content_changes: changes,
        };
        self.notify_logged("textDocument/didChange", params).await;
    }

    pub async fn did_save(&self, path: &Path) {
        let uri = match file_uri(path) {
            Ok(uri) => uri,
            Err(err) => {
                warn!(%err, "didSave skipped");
                return;
            }
        };
        let params = DidSaveTextDocumentParams {
            text_document: TextDocumentIdentifier { uri },
            text: None,
        };
        self.notify_logged("textDocument/didSave", params).await;
    }

    /// Closes the document and evicts its cached diagnostics.
    pub async fn did_close(&self, path: &Path) {
        let uri = match file_uri(path) {
            Ok(uri) => uri,
            Err(err) => {
                warn!(%err, "didClose skipped");
                return;
            }
        };
        self.diagnostics().evict(&uri);
        let params = DidCloseTextDocumentParams {
            text_document: TextDocumentIdentifier { uri },
        };
        self.notify_logged("textDocument/didClose", params).await;
    }
}
