//! Invoice extraction pipeline.
//!
//! validate → resolve prompt → stage → invoke model → normalize.
//! The staged copy is removed right after the model call, and by the
//! [`StagedFile`](crate::staging::StagedFile) guard on every other exit path.

use crate::document::Document;
use crate::error::ExtractError;
use crate::gemini::ModelClient;
use crate::normalize::normalize;
use crate::prompts::PromptCatalog;
use crate::staging::Stager;
use crate::validation::{validate, validate_content_type};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info};

/// Extraction pipeline orchestrator.
#[derive(Clone)]
pub struct InvoicePipeline {
    catalog: PromptCatalog,
    stager: Stager,
    model: Arc<dyn ModelClient>,
}

impl InvoicePipeline {
    pub fn new(catalog: PromptCatalog, stager: Stager, model: Arc<dyn ModelClient>) -> Self {
        Self {
            catalog,
            stager,
            model,
        }
    }

    pub fn catalog(&self) -> &PromptCatalog {
        &self.catalog
    }

    /// Run one document through the pipeline.
    ///
    /// With `invoice_type: None` only the content type is validated and the
    /// generic prompt is used.
    pub async fn process(
        &self,
        document: Document,
        invoice_type: Option<&str>,
    ) -> Result<Value, ExtractError> {
        let (content_type, prompt) = match invoice_type {
            Some(label) => validate(&document.content_type, label, &self.catalog)?,
            None => (
                validate_content_type(&document.content_type)?,
                self.catalog.generic(),
            ),
        };

        info!(
            "Processing {} ({} bytes, {}) with prompt {} via {}",
            document.display_name(),
            document.data.len(),
            content_type,
            prompt.name,
            self.model.name()
        );

        let mut staged = self.stager.stage(&document, content_type).await?;
        drop(document);

        let raw = self.model.generate(&staged, &prompt).await;
        staged.cleanup();
        let raw = raw?;

        debug!("Raw model response length: {} chars", raw.len());

        let value = normalize(&raw)?;

        info!("Extraction complete for prompt {}", prompt.name);
        Ok(value)
    }
}
