//! Prompt catalog.
//!
//! One prompt file per supported invoice vendor lives in the prompts directory
//! as `<label>.txt`. Files are read on every lookup; the directory is treated
//! as read-only for the lifetime of the process. File paths are built from the
//! closed [`InvoiceType`] set only, never from caller-supplied text.

use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, warn};

/// Fallback instructions used when the caller does not name an invoice type.
const GENERIC_PROMPT: &str = r#"Extract all data from this invoice and return it as a single JSON object with this structure:
{
  "invoice_number": "string or null",
  "invoice_date": "YYYY-MM-DD or null",
  "currency": "ISO 4217 code or null",
  "payment_terms": "string or null",
  "supplier": {
    "name": "string or null",
    "tax_id": "VAT / tax registration number or null",
    "address": "string or null"
  },
  "customer": {
    "name": "string or null",
    "tax_id": "VAT / tax registration number or null",
    "address": "string or null"
  },
  "line_items": [
    {
      "description_ar": "Arabic description as printed, or null",
      "description_en": "English description as printed or translated",
      "quantity": number,
      "unit": "string or null",
      "unit_price": number,
      "tax": number or null,
      "total_price": number
    }
  ],
  "subtotal": number or null,
  "tax_total": number or null,
  "grand_total": number or null
}

Rules:
- Copy numbers exactly as printed, converting Arabic-Indic digits to Western digits.
- Use null for anything that is not present on the invoice.
- Return ONLY the JSON object."#;

/// Supported invoice vendors. Each one selects its own prompt file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InvoiceType {
    AlDrsoni,
    AlOthman,
    AlIfari,
    Almarai,
    AlsafiDanone,
    Sadafco,
}

impl InvoiceType {
    pub const ALL: [InvoiceType; 6] = [
        Self::AlDrsoni,
        Self::AlOthman,
        Self::AlIfari,
        Self::Almarai,
        Self::AlsafiDanone,
        Self::Sadafco,
    ];

    /// Parse an external label. Matching is exact and case-sensitive.
    pub fn from_label(label: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.label() == label)
    }

    /// The external label, also the prompt file stem.
    pub fn label(self) -> &'static str {
        match self {
            Self::AlDrsoni => "Al-Drsoni",
            Self::AlOthman => "Al-Othman",
            Self::AlIfari => "Al-Ifari",
            Self::Almarai => "Almarai",
            Self::AlsafiDanone => "AlsafiDanone",
            Self::Sadafco => "sadafco",
        }
    }
}

impl std::fmt::Display for InvoiceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Instruction text forwarded verbatim to the model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prompt {
    /// Invoice type label, or `"generic"`.
    pub name: &'static str,
    text: String,
}

impl Prompt {
    pub fn as_str(&self) -> &str {
        &self.text
    }
}

#[derive(Debug, Error)]
pub enum PromptError {
    /// Missing file, unreadable file, or invalid UTF-8.
    #[error("cannot read prompt {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("prompt {0:?} is empty")]
    Empty(PathBuf),
}

/// Read-only catalog of prompt files.
#[derive(Debug, Clone)]
pub struct PromptCatalog {
    dir: PathBuf,
}

impl PromptCatalog {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Look up the prompt for an invoice type. Any load failure collapses to
    /// `None`; the cause is logged.
    pub fn lookup(&self, invoice_type: InvoiceType) -> Option<Prompt> {
        match self.load(invoice_type) {
            Ok(prompt) => Some(prompt),
            Err(e) => {
                warn!("Prompt lookup failed for {}: {}", invoice_type, e);
                None
            }
        }
    }

    /// Load the prompt file for an invoice type, keeping the failure cause.
    pub fn load(&self, invoice_type: InvoiceType) -> Result<Prompt, PromptError> {
        let path = self.dir.join(format!("{}.txt", invoice_type.label()));

        let content = std::fs::read_to_string(&path).map_err(|source| PromptError::Read {
            path: path.clone(),
            source,
        })?;

        let text = content.trim();
        if text.is_empty() {
            return Err(PromptError::Empty(path));
        }

        debug!("Loaded prompt {} ({} chars)", invoice_type, text.len());

        Ok(Prompt {
            name: invoice_type.label(),
            text: text.to_string(),
        })
    }

    /// The built-in generic extraction prompt.
    pub fn generic(&self) -> Prompt {
        Prompt {
            name: "generic",
            text: GENERIC_PROMPT.to_string(),
        }
    }

    /// Invoice types whose prompt currently loads.
    pub fn available(&self) -> Vec<InvoiceType> {
        InvoiceType::ALL
            .into_iter()
            .filter(|t| self.load(*t).is_ok())
            .collect()
    }
}
