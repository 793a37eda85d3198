//! Typed request operations.
//!
//! Every operation follows the same template: check the server's advertised
//! capability, build params, send the request, surface a populated error
//! member, then run the tolerant decoder for the result shape.

use std::path::Path;

use lsp_types::CompletionContext;
use lsp_types::CompletionItem;
use lsp_types::CompletionParams;
use lsp_types::CompletionTriggerKind;
use lsp_types::DocumentFormattingParams;
use lsp_types::DocumentRangeFormattingParams;
use lsp_types::FormattingOptions;
use lsp_types::Location;
use lsp_types::Position;
use lsp_types::Range;
use lsp_types::ReferenceContext;
use lsp_types::ReferenceParams;
use lsp_types::RenameParams;
use lsp_types::TextDocumentIdentifier;
use lsp_types::TextDocumentPositionParams;
use lsp_types::TextEdit;
use lsp_types::WorkspaceEdit;
use serde::Serialize;

use crate::decode;
use crate::decode::RenameSymbol;
use crate::error::LspErr;
use crate::error::Result;
use crate::session::Session;
use crate::session::file_uri;

fn position_params(path: &Path, position: Position) -> Result<TextDocumentPositionParams> {
    Ok(TextDocumentPositionParams {
        text_document: TextDocumentIdentifier {
            uri: file_uri(path)?,
        },
        position,
    })
}

impl Session {
    /// Capability check per the LSP convention: a boolean capability must be
    /// true, a provider object merely has to be present and non-null.
    fn require_capability(&self, name: &str) -> Result<()> {
        if self.capability(name) {
            Ok(())
        } else {
            Err(LspErr::NotSupported)
        }
    }

    async fn request_checked<P: Serialize>(&self, method: &str, params: P) -> Result<Vec<u8>> {
        let payload = self.send_request(method, params).await?;
        decode::check_error(&payload)?;
        Ok(payload)
    }

    pub async fn completion(&self, path: &Path, position: Position) -> Result<Vec<CompletionItem>> {
        self.require_capability("completionProvider")?;
        let params = CompletionParams {
            text_document_position: position_params(path, position)?,
            context: Some(CompletionContext {
                trigger_kind: CompletionTriggerKind::INVOKED,
                trigger_character: None,
            }),
            work_done_progress_params: Default::default(),
            partial_result_params: Default::default(),
        };
        let payload = self.request_checked("textDocument/completion", params).await?;
        decode::completion_items(&payload)
    }

    /// Hover text at a position, reduced to a plain string.
    pub async fn hover(&self, path: &Path, position: Position) -> Result<String> {
        self.require_capability("hoverProvider")?;
        let params = position_params(path, position)?;
        let payload = self.request_checked("textDocument/hover", params).await?;
        decode::hover_text(&payload)
    }

    pub async fn document_format(
        &self,
        path: &Path,
        options: FormattingOptions,
    ) -> Result<Vec<TextEdit>> {
        self.require_capability("documentFormattingProvider")?;
        let params = DocumentFormattingParams {
            text_document: TextDocumentIdentifier {
                uri: file_uri(path)?,
            },
            options,
            work_done_progress_params: Default::default(),
        };
        let payload = self.request_checked("textDocument/formatting", params).await?;
        decode::text_edits(&payload)
    }

    pub async fn document_range_format(
        &self,
        path: &Path,
        range: Range,
        options: FormattingOptions,
    ) -> Result<Vec<TextEdit>> {
        self.require_capability("documentRangeFormattingProvider")?;
        let params = DocumentRangeFormattingParams {
            text_document: TextDocumentIdentifier {
                uri: file_uri(path)?,
            },
            range,
            options,
            work_done_progress_params: Default::default(),
        };
        let payload = self
            .request_checked("textDocument/rangeFormatting", params)
            .await?;
        decode::text_edits(&payload)
    }

    pub async fn get_definition(&self, path: &Path, position: Position) -> Result<Vec<Location>> {
        self.require_capability("definitionProvider")?;
        let params = position_params(path, position)?;
        let payload = self.request_checked("textDocument/definition", params).await?;
        decode::locations(&payload)
    }

    pub async fn get_declaration(&self, path: &Path, position: Position) -> Result<Vec<Location>> {
        self.require_capability("declarationProvider")?;
        let params = position_params(path, position)?;
        let payload = self
            .request_checked("textDocument/declaration", params)
            .await?;
        decode::locations(&payload)
    }

    pub async fn get_type_definition(
        &self,
        path: &Path,
        position: Position,
    ) -> Result<Vec<Location>> {
        self.require_capability("typeDefinitionProvider")?;
        let params = position_params(path, position)?;
        let payload = self
            .request_checked("textDocument/typeDefinition", params)
            .await?;
        decode::locations(&payload)
    }

    pub async fn find_references(&self, path: &Path, position: Position) -> Result<Vec<Location>> {
        self.require_capability("referencesProvider")?;
        let params = ReferenceParams {
            text_document_position: position_params(path, position)?,
            context: ReferenceContext {
                include_declaration: true,
            },
            work_done_progress_params: Default::default(),
            partial_result_params: Default::default(),
        };
        let payload = self
            .request_checked("textDocument/references", params)
            .await?;
        decode::locations(&payload)
    }

    /// Prepare-rename: whether the symbol at `position` is renameable, and
    /// with which range or placeholder.
    pub async fn get_rename_symbol(&self, path: &Path, position: Position) -> Result<RenameSymbol> {
        self.require_capability("renameProvider")?;
        let params = position_params(path, position)?;
        let payload = self
            .request_checked("textDocument/prepareRename", params)
            .await?;
        decode::prepare_rename(&payload)
    }

    pub async fn rename_symbol(
        &self,
        path: &Path,
        position: Position,
        new_name: &str,
    ) -> Result<WorkspaceEdit> {
        self.require_capability("renameProvider")?;
        let params = RenameParams {
            text_document_position: position_params(path, position)?,
            new_name: new_name.to_string(),
            work_done_progress_params: Default::default(),
        };
        let payload = self.request_checked("textDocument/rename", params).await?;
        decode::workspace_edit(&payload)
    }
}
