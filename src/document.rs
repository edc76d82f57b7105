//! Inbound documents and the MIME allow-list.

/// A document as received from the caller, before validation.
#[derive(Debug, Clone)]
pub struct Document {
    pub data: Vec<u8>,
    /// Declared MIME type, exactly as the caller sent it.
    pub content_type: String,
    /// Original filename, kept for logging only. Never used to build paths.
    pub filename: Option<String>,
}

impl Document {
    pub fn new(data: Vec<u8>, content_type: impl Into<String>, filename: Option<String>) -> Self {
        Self {
            data,
            content_type: content_type.into(),
            filename,
        }
    }

    /// Name used in log lines.
    pub fn display_name(&self) -> &str {
        self.filename.as_deref().unwrap_or("document")
    }
}

/// A content type that passed the allow-list check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContentType {
    Pdf,
    PlainText,
    Html,
    Csv,
    Xml,
    Rtf,
    Jpeg,
    Png,
    Gif,
    Webp,
    Heic,
    Heif,
}

impl ContentType {
    pub const ALL: [ContentType; 12] = [
        Self::Pdf,
        Self::PlainText,
        Self::Html,
        Self::Csv,
        Self::Xml,
        Self::Rtf,
        Self::Jpeg,
        Self::Png,
        Self::Gif,
        Self::Webp,
        Self::Heic,
        Self::Heif,
    ];

    /// Exact match against the allow-list. Parameters such as `; charset=`
    /// are not stripped, so `text/plain; charset=utf-8` is rejected.
    pub fn from_mime(mime: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|ct| ct.mime() == mime)
    }

    pub fn mime(self) -> &'static str {
        match self {
            Self::Pdf => "application/pdf",
            Self::PlainText => "text/plain",
            Self::Html => "text/html",
            Self::Csv => "text/csv",
            Self::Xml => "text/xml",
            Self::Rtf => "text/rtf",
            Self::Jpeg => "image/jpeg",
            Self::Png => "image/png",
            Self::Gif => "image/gif",
            Self::Webp => "image/webp",
            Self::Heic => "image/heic",
            Self::Heif => "image/heif",
        }
    }

    /// File extension for staged copies, without the dot.
    pub fn extension(self) -> &'static str {
        match self {
            Self::Pdf => "pdf",
            Self::PlainText => "txt",
            Self::Html => "html",
            Self::Csv => "csv",
            Self::Xml => "xml",
            Self::Rtf => "rtf",
            Self::Jpeg => "jpg",
            Self::Png => "png",
            Self::Gif => "gif",
            Self::Webp => "webp",
            Self::Heic => "heic",
            Self::Heif => "heif",
        }
    }

    /// Comma-separated list of every allowed MIME type, for error messages.
    pub fn allowed_list() -> String {
        Self::ALL
            .iter()
            .map(|ct| ct.mime())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl std::fmt::Display for ContentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.mime())
    }
}
