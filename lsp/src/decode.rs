//! Tolerant decoders for LSP response unions.
//!
//! Servers legitimately answer several of our requests with one of multiple
//! shapes. Each decoder here is a pure function on the raw response bytes
//! that tries every admissible shape and takes the first that parses.

use lsp_types::CompletionItem;
use lsp_types::Location;
use lsp_types::Range;
use lsp_types::TextEdit;
use lsp_types::Url;
use lsp_types::WorkspaceEdit;
use serde::Deserialize;
use serde_json::Value;

use crate::error::LspErr;
use crate::error::Result;
use crate::protocol::ResponseEnvelope;

/// Surface a populated `error` member as a typed failure.
pub fn check_error(payload: &[u8]) -> Result<()> {
    let envelope: ResponseEnvelope = serde_json::from_slice(payload)?;
    match envelope.error {
        Some(error) => Err(LspErr::Lsp {
            code: error.code.into(),
            message: error.message,
        }),
        None => Ok(()),
    }
}

/// The `result` member of a response, `Null` when absent.
pub fn result_value(payload: &[u8]) -> Result<Value> {
    let envelope: ResponseEnvelope = serde_json::from_slice(payload)?;
    Ok(envelope.result.unwrap_or(Value::Null))
}

/// Completion result: `CompletionList{items}` or a bare item array.
pub fn completion_items(payload: &[u8]) -> Result<Vec<CompletionItem>> {
    #[derive(Deserialize)]
    struct ListShape {
        items: Vec<CompletionItem>,
    }

    let result = result_value(payload)?;
    if result.is_null() {
        return Ok(Vec::new());
    }
    if let Ok(list) = serde_json::from_value::<ListShape>(result.clone()) {
        return Ok(list.items);
    }
    serde_json::from_value(result)
        .map_err(|err| LspErr::DecodeFailure(format!("completion: {err}")))
}

/// Goto-family result: a single `Location`, a `Location` array, or a
/// `LocationLink` array flattened to its targets.
pub fn locations(payload: &[u8]) -> Result<Vec<Location>> {
    #[derive(Deserialize)]
    #[serde(rename_all = "camelCase")]
    struct LinkShape {
        target_uri: Url,
        target_range: Range,
    }

    let result = result_value(payload)?;
    if result.is_null() {
        return Ok(Vec::new());
    }
    if let Ok(location) = serde_json::from_value::<Location>(result.clone()) {
        return Ok(vec![location]);
    }
    if let Ok(list) = serde_json::from_value::<Vec<Location>>(result.clone()) {
        return Ok(list);
    }
    let links: Vec<LinkShape> = serde_json::from_value(result)
        .map_err(|err| LspErr::DecodeFailure(format!("locations: {err}")))?;
    Ok(links
        .into_iter()
        .map(|link| Location {
            uri: link.target_uri,
            range: link.target_range,
        })
        .collect())
}

/// Hover contents: a string, `MarkupContent{value}`, an array of those, or
/// any map carrying a string `value`. The walker is total and concatenates
/// every string it finds, array entries separated by newlines; absent
/// contents yield the empty string.
pub fn hover_text(payload: &[u8]) -> Result<String> {
    let result = result_value(payload)?;
    let contents = result.get("contents").cloned().unwrap_or(Value::Null);
    Ok(extract_strings(&contents))
}

fn extract_strings(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Array(items) => items
            .iter()
            .map(extract_strings)
            .collect::<Vec<_>>()
            .join("\n"),
        Value::Object(map) => map.get("value").map(extract_strings).unwrap_or_default(),
        _ => String::new(),
    }
}

/// Prepare-rename disposition.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RenameSymbol {
    pub range: Range,
    pub placeholder: String,
    pub use_default: bool,
    pub use_range: bool,
    pub can_rename: bool,
}

/// Prepare-rename result: a bare `Range`, `{range, placeholder}`, or
/// `{defaultBehavior}`. Anything else is a cannot-rename disposition.
pub fn prepare_rename(payload: &[u8]) -> Result<RenameSymbol> {
    #[derive(Deserialize)]
    struct PlaceholderShape {
        range: Range,
        placeholder: String,
    }
    #[derive(Deserialize)]
    #[serde(rename_all = "camelCase")]
    struct DefaultShape {
        default_behavior: bool,
    }

    let result = result_value(payload)?;
    if let Ok(range) = serde_json::from_value::<Range>(result.clone()) {
        return Ok(RenameSymbol {
            range,
            use_range: true,
            can_rename: true,
            ..Default::default()
        });
    }
    if let Ok(shape) = serde_json::from_value::<PlaceholderShape>(result.clone()) {
        return Ok(RenameSymbol {
            range: shape.range,
            placeholder: shape.placeholder,
            can_rename: true,
            ..Default::default()
        });
    }
    if let Ok(shape) = serde_json::from_value::<DefaultShape>(result) {
        return Ok(RenameSymbol {
            use_default: shape.default_behavior,
            can_rename: true,
            ..Default::default()
        });
    }
    Ok(RenameSymbol::default())
}

pub fn workspace_edit(payload: &[u8]) -> Result<WorkspaceEdit> {
    let result = result_value(payload)?;
    if result.is_null() {
        return Ok(WorkspaceEdit::default());
    }
    serde_json::from_value(result).map_err(|err| LspErr::DecodeFailure(format!("rename: {err}")))
}

pub fn text_edits(payload: &[u8]) -> Result<Vec<TextEdit>> {
    let result = result_value(payload)?;
    if result.is_null() {
        return Ok(Vec::new());
    }
    serde_json::from_value(result).map_err(|err| LspErr::DecodeFailure(format!("format: {err}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn response(result: Value) -> Vec<u8> {
        serde_json::to_vec(&serde_json::json!({
            "jsonrpc": "2.0",
            "id": 1,
            "result": result,
        }))
        .unwrap()
    }

    #[test]
    fn completion_list_shape() {
        let payload = response(serde_json::json!({"items": [{"label": "print"}]}));
        let items = completion_items(&payload).unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].label, "print");
    }

    #[test]
    fn completion_array_shape() {
        let payload = response(serde_json::json!([{"label": "pr"}]));
        let items = completion_items(&payload).unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].label, "pr");
    }

    #[test]
    fn completion_null_is_empty() {
        assert!(completion_items(&response(Value::Null)).unwrap().is_empty());
    }

    #[test]
    fn completion_garbage_is_a_decode_failure() {
        let payload = response(serde_json::json!(42));
        assert!(matches!(
            completion_items(&payload),
            Err(LspErr::DecodeFailure(_))
        ));
    }

    fn range() -> Value {
        serde_json::json!({
            "start": {"line": 0, "character": 0},
            "end": {"line": 0, "character": 4},
        })
    }

    #[test]
    fn single_location_becomes_one_element_vector() {
        let payload = response(serde_json::json!({"uri": "file:///x", "range": range()}));
        let locations = locations(&payload).unwrap();
        assert_eq!(locations.len(), 1);
        assert_eq!(locations[0].uri.as_str(), "file:///x");
    }

    #[test]
    fn location_array_passes_through() {
        let payload = response(serde_json::json!([
            {"uri": "file:///x", "range": range()},
            {"uri": "file:///y", "range": range()},
        ]));
        assert_eq!(locations(&payload).unwrap().len(), 2);
    }

    #[test]
    fn location_links_are_flattened() {
        let payload =
            response(serde_json::json!([{"targetUri": "file:///x", "targetRange": range()}]));
        let locations = locations(&payload).unwrap();
        assert_eq!(locations.len(), 1);
        assert_eq!(locations[0].uri.as_str(), "file:///x");
        assert_eq!(locations[0].range.end.character, 4);
    }

    #[test]
    fn hover_plain_string() {
        let payload = response(serde_json::json!({"contents": "fn print()"}));
        assert_eq!(hover_text(&payload).unwrap(), "fn print()");
    }

    #[test]
    fn hover_markup_content() {
        let payload = response(serde_json::json!({
            "contents": {"kind": "plaintext", "value": "a docstring"}
        }));
        assert_eq!(hover_text(&payload).unwrap(), "a docstring");
    }

    #[test]
    fn hover_array_joins_with_newlines() {
        let payload = response(serde_json::json!({
            "contents": ["first", {"language": "rust", "value": "second"}]
        }));
        assert_eq!(hover_text(&payload).unwrap(), "first\nsecond");
    }

    #[test]
    fn hover_absent_contents_is_empty() {
        assert_eq!(hover_text(&response(Value::Null)).unwrap(), "");
        let payload = response(serde_json::json!({"range": range()}));
        assert_eq!(hover_text(&payload).unwrap(), "");
    }

    #[test]
    fn prepare_rename_bare_range() {
        let payload = response(range());
        let symbol = prepare_rename(&payload).unwrap();
        assert!(symbol.can_rename);
        assert!(symbol.use_range);
        assert_eq!(symbol.range.end.character, 4);
    }

    #[test]
    fn prepare_rename_with_placeholder() {
        let payload = response(serde_json::json!({"range": range(), "placeholder": "old_name"}));
        let symbol = prepare_rename(&payload).unwrap();
        assert!(symbol.can_rename);
        assert!(!symbol.use_range);
        assert_eq!(symbol.placeholder, "old_name");
    }

    #[test]
    fn prepare_rename_default_behavior() {
        let payload = response(serde_json::json!({"defaultBehavior": true}));
        let symbol = prepare_rename(&payload).unwrap();
        assert!(symbol.can_rename);
        assert!(symbol.use_default);
    }

    #[test]
    fn prepare_rename_unrecognized_shape_cannot_rename() {
        let payload = response(Value::Null);
        assert!(!prepare_rename(&payload).unwrap().can_rename);
    }

    #[test]
    fn error_member_surfaces_the_published_code() {
        let payload = serde_json::to_vec(&serde_json::json!({
            "jsonrpc": "2.0",
            "id": 4,
            "error": {"code": -32601, "message": "unknown method"},
        }))
        .unwrap();
        match check_error(&payload) {
            Err(LspErr::Lsp { code, message }) => {
                assert_eq!(code, crate::error::LspErrorCode::MethodNotFound);
                assert_eq!(message, "unknown method");
            }
            other => panic!("expected an LSP error, got {other:?}"),
        }
    }

    #[test]
    fn format_and_rename_results_decode() {
        let payload = response(serde_json::json!([
            {"range": range(), "newText": "fmt"},
        ]));
        let edits = text_edits(&payload).unwrap();
        assert_eq!(edits[0].new_text, "fmt");

        let payload = response(serde_json::json!({"changes": {}}));
        assert!(workspace_edit(&payload).unwrap().changes.is_some());
    }
}
