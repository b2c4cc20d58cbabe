use weavedrop_protocol::Tag;
use weavedrop_protocol::constants::{APP_NAME_TAG, CONTENT_TYPE_TAG, DEFAULT_CONTENT_TYPE};

use crate::TransferError;

/// Maximum combined size of tag names and values on one transfer.
pub const MAX_TAG_BYTES: usize = 2048;

/// Validates a single tag.
///
/// Rejects:
/// - Empty or whitespace-only names
/// - Empty values
/// - Control characters in the name
pub fn validate_tag(tag: &Tag) -> Result<(), TransferError> {
    if tag.name.trim().is_empty() {
        return Err(TransferError::InvalidTag("empty tag name".into()));
    }
    if tag.value.is_empty() {
        return Err(TransferError::InvalidTag(format!(
            "empty value for tag {}",
            tag.name
        )));
    }
    if tag.name.chars().any(char::is_control) {
        return Err(TransferError::InvalidTag(format!(
            "control character in tag name {:?}",
            tag.name
        )));
    }
    Ok(())
}

/// Builds the final tag set for a transfer.
///
/// `Content-Type` comes first, `App-Name` second, then the caller's tags in
/// their original order. Content type precedence is: explicit option, then a
/// `Content-Type` tag among `tags`, then the payload's declared type, then
/// `application/octet-stream`. A caller-supplied `App-Name` tag replaces
/// `app_name`. Supplying either reserved tag more than once is an error.
pub fn resolve_tags(
    content_type: Option<&str>,
    tags: &[Tag],
    payload_content_type: Option<&str>,
    app_name: Option<&str>,
) -> Result<Vec<Tag>, TransferError> {
    let mut tag_content_type = None;
    let mut tag_app_name = None;
    let mut rest = Vec::with_capacity(tags.len());

    for tag in tags {
        validate_tag(tag)?;
        if tag.is_named(CONTENT_TYPE_TAG) {
            if tag_content_type.replace(tag.value.as_str()).is_some() {
                return Err(TransferError::DuplicateReservedTag(CONTENT_TYPE_TAG.into()));
            }
        } else if tag.is_named(APP_NAME_TAG) {
            if tag_app_name.replace(tag.value.as_str()).is_some() {
                return Err(TransferError::DuplicateReservedTag(APP_NAME_TAG.into()));
            }
        } else {
            rest.push(tag.clone());
        }
    }

    let content_type = content_type
        .map(str::trim)
        .filter(|ct| !ct.is_empty())
        .or(tag_content_type)
        .or(payload_content_type)
        .unwrap_or(DEFAULT_CONTENT_TYPE);

    let mut resolved = Vec::with_capacity(rest.len() + 2);
    resolved.push(Tag::new(CONTENT_TYPE_TAG, content_type));
    if let Some(app) = tag_app_name.or(app_name.filter(|a| !a.is_empty())) {
        resolved.push(Tag::new(APP_NAME_TAG, app));
    }
    resolved.extend(rest);

    let size: usize = resolved
        .iter()
        .map(|t| t.name.len() + t.value.len())
        .sum();
    if size > MAX_TAG_BYTES {
        return Err(TransferError::TagsTooLarge(size));
    }

    Ok(resolved)
}
