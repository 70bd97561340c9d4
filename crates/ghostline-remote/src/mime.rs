//! Content type detection for outbound attachments and avatars

/// Fallback when the content is not recognized
pub const OCTET_STREAM: &str = "application/octet-stream";

/// Detected content type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileType {
    /// MIME type, [`OCTET_STREAM`] when unrecognized
    pub mime_type: &'static str,
    /// Conventional extension without the dot
    pub extension: Option<&'static str>,
}

/// Detect the content type of a file from its leading bytes
pub fn sniff(data: &[u8]) -> FileType {
    match infer::get(data) {
        Some(kind) => FileType {
            mime_type: kind.mime_type(),
            extension: Some(kind.extension()),
        },
        None => FileType {
            mime_type: OCTET_STREAM,
            extension: None,
        },
    }
}
