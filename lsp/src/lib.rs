//! Editor-side LSP client engine.
//!
//! Discovers, launches, and supervises language-server subprocesses,
//! exchanges framed JSON-RPC 2.0 messages over their stdio, and exposes the
//! operations an editor needs: document sync notifications, typed requests
//! (completion, hover, goto family, formatting, rename), and a per-document
//! diagnostics cache fed by server pushes.
//!
//! # Example
//!
//! ```ignore
//! use std::path::Path;
//!
//! mlsp::init(&mlsp::default_config_dir().unwrap())?;
//! let spec = mlsp::get_language("rust").unwrap();
//! let session = mlsp::get_or_start_server(&spec, root, Path::new("src/lib.rs"))
//!     .await
//!     .unwrap();
//! session.did_open(path, "rust", &text, 1).await;
//! let items = session.completion(path, position).await?;
//! ```

mod catalog;
mod diagnostics;
mod error;
mod notifications;
mod registry;
mod requests;
mod runnable;
mod session;

pub mod decode;
pub mod hooks;
pub mod protocol;
pub mod script;
pub mod transport;

pub use catalog::CATALOG_FILE;
pub use catalog::default_config_dir;
pub use catalog::get_language;
pub use catalog::init;
pub use catalog::load_catalog;
pub use catalog::register_language_server;
pub use decode::RenameSymbol;
pub use diagnostics::DiagnosticStore;
pub use diagnostics::ServerDiagnostic;
pub use error::LspErr;
pub use error::LspErrorCode;
pub use error::Result;
pub use registry::get_active_server_names;
pub use registry::get_or_start_server;
pub use registry::shutdown_all_servers;
pub use runnable::RawValue;
pub use runnable::Runnable;
pub use runnable::ServerSpec;
pub use runnable::resolve;
pub use script::HostFn;
pub use script::ScriptFn;
pub use script::ScriptRuntime;
pub use session::Session;
pub use session::State;

// Re-export the protocol vocabulary for embedding editors
pub use lsp_types;
