//! Part composition: turning pending text and attachment input into an
//! ordered part list.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;

use crate::error::CompositionError;
use crate::models::Part;

/// A binary attachment as supplied by the UI: MIME type plus the decoded
/// payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttachmentInput {
    pub mime_type: String,
    pub data: Vec<u8>,
}

impl AttachmentInput {
    #[must_use]
    pub fn new(mime_type: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            mime_type: mime_type.into(),
            data,
        }
    }
}

/// Build the ordered part list for a submission: all attachments first, in
/// submission order, then one text part iff the trimmed text is non-empty.
///
/// Rejects the submission outright when there is no content; callers must
/// not have mutated any history before this point.
pub fn compose(
    text: &str,
    attachments: &[AttachmentInput],
) -> Result<Vec<Part>, CompositionError> {
    let trimmed = text.trim();
    if trimmed.is_empty() && attachments.is_empty() {
        return Err(CompositionError::EmptySubmission);
    }

    let mut parts: Vec<Part> = attachments
        .iter()
        .map(|attachment| {
            Part::attachment(
                attachment.mime_type.clone(),
                BASE64.encode(&attachment.data),
            )
        })
        .collect();

    if !trimmed.is_empty() {
        parts.push(Part::text(trimmed));
    }

    Ok(parts)
}
