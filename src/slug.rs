//! Directory names for exported runs.

use chrono::{DateTime, Utc};

/// Maximum length of the request-derived part of a slug
const MAX_SLUG_LENGTH: usize = 40;

/// Convert a string to a URL-friendly slug (basic conversion).
///
/// Does NOT truncate - use `slugify_truncate` for length-limited slugs.
pub fn slugify(title: &str) -> String {
    let slug: String = title
        .to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { '-' })
        .collect();

    // Collapse consecutive dashes and trim leading/trailing dashes
    let mut result = String::new();
    let mut prev_dash = true;
    for c in slug.chars() {
        if c == '-' {
            if !prev_dash {
                result.push(c);
            }
            prev_dash = true;
        } else {
            result.push(c);
            prev_dash = false;
        }
    }

    if result.ends_with('-') {
        result.pop();
    }

    result
}

/// Slug limited to MAX_SLUG_LENGTH characters, cut at a word boundary when possible.
pub fn slugify_truncate(text: &str) -> String {
    let slug = slugify(text);
    if slug.chars().count() <= MAX_SLUG_LENGTH {
        return slug;
    }

    let mut result: String = slug.chars().take(MAX_SLUG_LENGTH).collect();
    let cut_on_boundary = slug.chars().nth(MAX_SLUG_LENGTH) == Some('-');
    if !cut_on_boundary
        && let Some(pos) = result.rfind('-')
    {
        result.truncate(pos);
    }

    while result.ends_with('-') {
        result.pop();
    }

    result
}

/// Unique directory name for one run: request slug plus UTC timestamp.
pub fn run_slug(request: &str) -> String {
    run_slug_at(request, Utc::now())
}

fn run_slug_at(request: &str, at: DateTime<Utc>) -> String {
    let stamp = at.format("%Y%m%d-%H%M%S");
    match slugify_truncate(request) {
        slug if slug.is_empty() => format!("run-{}", stamp),
        slug => format!("{}-{}", slug, stamp),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_slugify_basic() {
        assert_eq!(slugify("Hello World"), "hello-world");
        assert_eq!(slugify("Test 123!"), "test-123");
        assert_eq!(slugify("  Multiple   Spaces  "), "multiple-spaces");
    }

    #[test]
    fn test_slugify_truncate_long_input() {
        let long_request = "Research the latest trends in AI agent frameworks, then write a beginner-friendly summary";
        let slug = slugify_truncate(long_request);
        assert!(slug.chars().count() <= MAX_SLUG_LENGTH);
        assert!(!slug.ends_with('-'));
        assert_eq!(slug, "research-the-latest-trends-in-ai-agent");
    }

    #[test]
    fn test_slugify_truncate_short_input() {
        assert_eq!(slugify_truncate("Write a haiku"), "write-a-haiku");
    }

    #[test]
    fn test_run_slug_has_timestamp() {
        let at = Utc.with_ymd_and_hms(2026, 3, 4, 5, 6, 7).unwrap();
        assert_eq!(run_slug_at("Write a haiku", at), "write-a-haiku-20260304-050607");
        assert_eq!(run_slug_at("???", at), "run-20260304-050607");
    }
}
