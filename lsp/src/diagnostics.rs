//! Per-document published-diagnostics cache.
//!
//! Each `textDocument/publishDiagnostics` replaces the whole vector stored
//! under its URI, so readers only ever see complete publishes and never need
//! to coordinate with writers beyond the map lock.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::Weak;

use lsp_types::Diagnostic;
use lsp_types::Url;
use tracing::warn;

use crate::session::Session;

/// A server-published diagnostic plus a handle back to the session that
/// produced it, so the editor can style and navigate by source.
#[derive(Debug, Clone)]
pub struct ServerDiagnostic {
    pub diagnostic: Diagnostic,
    pub session: Weak<Session>,
}

#[derive(Debug, Default)]
pub struct DiagnosticStore {
    inner: Mutex<HashMap<Url, Vec<ServerDiagnostic>>>,
}

impl DiagnosticStore {
    fn lock_inner(&self) -> std::sync::MutexGuard<'_, HashMap<Url, Vec<ServerDiagnostic>>> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(err) => {
                warn!("diagnostics lock poisoned");
                err.into_inner()
            }
        }
    }

    /// Replace the cached vector for `uri` with a fresh publish.
    pub fn publish(&self, uri: Url, diagnostics: Vec<ServerDiagnostic>) {
        self.lock_inner().insert(uri, diagnostics);
    }

    /// Drop the entry for a closed document.
    pub fn evict(&self, uri: &Url) {
        self.lock_inner().remove(uri);
    }

    pub fn get(&self, uri: &Url) -> Vec<ServerDiagnostic> {
        self.lock_inner().get(uri).cloned().unwrap_or_default()
    }

    pub fn count(&self, uri: &Url) -> usize {
        self.lock_inner().get(uri).map_or(0, Vec::len)
    }
}
