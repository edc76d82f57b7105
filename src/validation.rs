//! Input validation: content-type allow-list and invoice-type lookup.

use crate::document::ContentType;
use crate::prompts::{InvoiceType, Prompt, PromptCatalog};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("File type '{0}' not allowed. Please provide a file of type: {allowed}", allowed = ContentType::allowed_list())]
    UnsupportedContentType(String),

    /// Unrecognized label, missing prompt file, and undecodable prompt file
    /// all surface as this variant.
    #[error("Invalid invoice type '{0}'. Please select a valid invoice type.")]
    UnknownInvoiceType(String),
}

/// Check a declared content type against the allow-list.
pub fn validate_content_type(content_type: &str) -> Result<ContentType, ValidationError> {
    ContentType::from_mime(content_type)
        .ok_or_else(|| ValidationError::UnsupportedContentType(content_type.to_string()))
}

/// Validate both inputs and resolve the prompt.
///
/// The content type is checked first, and the label is checked against the
/// closed set before the catalog touches the filesystem.
pub fn validate(
    content_type: &str,
    invoice_type_label: &str,
    catalog: &PromptCatalog,
) -> Result<(ContentType, Prompt), ValidationError> {
    let content_type = validate_content_type(content_type)?;

    let unknown = || ValidationError::UnknownInvoiceType(invoice_type_label.to_string());
    let invoice_type = InvoiceType::from_label(invoice_type_label).ok_or_else(unknown)?;
    let prompt = catalog.lookup(invoice_type).ok_or_else(unknown)?;

    Ok((content_type, prompt))
}
