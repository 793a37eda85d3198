//! Editor collaborator hooks.
//!
//! The engine never draws and never classifies files itself; the embedding
//! editor registers callables here. Both hooks have safe defaults so the
//! engine works standalone: redraw is a no-op and filetype detection falls
//! back to a small extension table.

use std::path::Path;
use std::sync::Arc;
use std::sync::LazyLock;
use std::sync::RwLock;

type RedrawHook = Arc<dyn Fn() + Send + Sync>;
type FiletypeMatcher = Arc<dyn Fn(&Path) -> Option<String> + Send + Sync>;

static REDRAW: LazyLock<RwLock<Option<RedrawHook>>> = LazyLock::new(|| RwLock::new(None));
static FILETYPE: LazyLock<RwLock<Option<FiletypeMatcher>>> = LazyLock::new(|| RwLock::new(None));

/// Register the callable invoked after every received message, so the editor
/// can refresh diagnostics display.
pub fn set_redraw_hook<F>(hook: F)
where
    F: Fn() + Send + Sync + 'static,
{
    *REDRAW.write().unwrap_or_else(|e| e.into_inner()) = Some(Arc::new(hook));
}

pub(crate) fn redraw() {
    let hook = REDRAW.read().unwrap_or_else(|e| e.into_inner()).clone();
    if let Some(hook) = hook {
        hook();
    }
}

/// Register the editor's filetype detection; it maps a path to a language
/// identifier or None when the file is unclassified.
pub fn set_filetype_matcher<F>(matcher: F)
where
    F: Fn(&Path) -> Option<String> + Send + Sync + 'static,
{
    *FILETYPE.write().unwrap_or_else(|e| e.into_inner()) = Some(Arc::new(matcher));
}

pub(crate) fn filetype_for(path: &Path) -> Option<String> {
    let matcher = FILETYPE.read().unwrap_or_else(|e| e.into_inner()).clone();
    if let Some(matcher) = matcher {
        return matcher(path);
    }
    let extension = path.extension()?.to_str()?.to_ascii_lowercase();
    let language = match extension.as_str() {
        "rs" => "rust",
        "go" => "go",
        "py" | "pyi" => "python",
        "js" | "jsx" | "mjs" | "cjs" => "javascript",
        "ts" | "tsx" => "typescript",
        "c" | "h" => "c",
        "cc" | "cpp" | "cxx" | "hpp" => "cpp",
        "rb" => "ruby",
        "hs" => "haskell",
        "html" => "html",
        "css" => "css",
        "scss" => "scss",
        _ => return None,
    };
    Some(language.to_string())
}
