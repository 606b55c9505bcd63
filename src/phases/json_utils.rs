//! Extraction helpers for free-text model answers.

/// Extract a JSON object from model output.
///
/// Handles three patterns:
/// 1. JSON wrapped in ```json ... ``` code blocks
/// 2. A plain ``` ... ``` block whose body is an object
/// 3. Raw JSON objects (first { to last })
pub fn extract_json_block(text: &str) -> Option<&str> {
    if let Some(start) = text.find("```json") {
        let content_start = start + 7;
        if let Some(end) = text[content_start..].find("```") {
            return Some(text[content_start..content_start + end].trim());
        }
    }

    if let Some((_, body)) = extract_fenced_block(text)
        && body.starts_with('{')
    {
        return Some(body);
    }

    if let Some(start) = text.find('{')
        && let Some(end) = text.rfind('}')
        && start < end
    {
        return Some(&text[start..=end]);
    }

    None
}

/// First fenced code block as `(language tag, body)`.
///
/// The language tag is the word right after the opening fence, if any.
pub fn extract_fenced_block(text: &str) -> Option<(Option<&str>, &str)> {
    let start = text.find("```")?;
    let after_fence = &text[start + 3..];
    let line_end = after_fence.find('\n')?;

    let tag = after_fence[..line_end].trim();
    let body_start = line_end + 1;
    let end = after_fence[body_start..].find("```")?;
    let body = after_fence[body_start..body_start + end].trim();

    let language = (!tag.is_empty()).then_some(tag);
    Some((language, body))
}
