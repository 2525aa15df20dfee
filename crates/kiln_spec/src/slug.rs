//! Slug and subdomain sanitization.

use crate::error::{SpecError, SpecResult};

/// Longest project name produced by [`project_slug`].
pub const MAX_PROJECT_SLUG_LEN: usize = 50;

/// Name used when the request text yields no usable characters.
pub const DEFAULT_PROJECT_SLUG: &str = "game-project";

/// Convert text to a lowercase `[a-z0-9-]` slug with no leading, trailing or
/// repeated hyphens, cut to at most `max_len` characters.
pub fn slugify(text: &str, max_len: usize) -> String {
    let joined = text
        .to_lowercase()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '-' })
        .collect::<String>()
        .split('-')
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("-");

    if joined.len() <= max_len {
        return joined;
    }

    // ASCII only at this point, byte slicing is safe
    joined[..max_len].trim_end_matches('-').to_string()
}

/// Package-registry-safe project name derived from free request text.
pub fn project_slug(text: &str) -> String {
    let slug = slugify(text, MAX_PROJECT_SLUG_LEN);
    if slug.is_empty() {
        DEFAULT_PROJECT_SLUG.to_string()
    } else {
        slug
    }
}

/// Check the slug invariant: lowercase `[a-z0-9-]`, no leading, trailing or
/// doubled hyphens, not empty.
pub fn is_valid_slug(s: &str) -> bool {
    !s.is_empty()
        && s.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
        && !s.starts_with('-')
        && !s.ends_with('-')
        && !s.contains("--")
}

/// Reduce a requested subdomain to its alphanumeric-and-hyphen subset,
/// lowercased and truncated to `max_len`.
///
/// An empty result is an input error: there is nothing left to deploy under.
pub fn sanitize_subdomain(raw: &str, max_len: usize) -> SpecResult<String> {
    let kept: String = raw
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '-')
        .map(|c| c.to_ascii_lowercase())
        .take(max_len)
        .collect();
    let sanitized = kept.trim_matches('-').to_string();

    if sanitized.is_empty() {
        return Err(SpecError::InvalidSubdomain {
            raw: raw.to_string(),
            reason: "no alphanumeric characters remain after sanitization".to_string(),
        });
    }

    Ok(sanitized)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("Space Shooter!", 50), "space-shooter");
        assert_eq!(slugify("  Multiple   Spaces  ", 50), "multiple-spaces");
        assert_eq!(slugify("--Already--Slugged--", 50), "already-slugged");
        assert_eq!(slugify("Ünïcode game", 50), "n-code-game");
    }

    #[test]
    fn test_slugify_truncation_does_not_leave_hyphen() {
        let slug = slugify("abcd efgh", 5);
        assert_eq!(slug, "abcd");
        assert!(is_valid_slug(&slug));
    }

    #[test]
    fn test_project_slug_fallback() {
        assert_eq!(project_slug("!!!"), DEFAULT_PROJECT_SLUG);
        let long = "a very long description of a game ".repeat(5);
        let slug = project_slug(&long);
        assert!(slug.len() <= MAX_PROJECT_SLUG_LEN);
        assert!(is_valid_slug(&slug));
    }

    #[test]
    fn test_is_valid_slug() {
        assert!(is_valid_slug("my-game-2"));
        assert!(!is_valid_slug("My-Game"));
        assert!(!is_valid_slug("-game"));
        assert!(!is_valid_slug("game--two"));
        assert!(!is_valid_slug(""));
    }

    #[test]
    fn test_sanitize_subdomain() {
        assert_eq!(sanitize_subdomain("Space Game!@#2024", 63).unwrap(), "spacegame2024");
        assert_eq!(sanitize_subdomain("my_cool-game", 63).unwrap(), "mycool-game");
        assert_eq!(sanitize_subdomain("abcdefghij", 4).unwrap(), "abcd");
    }

    #[test]
    fn test_sanitize_subdomain_empty_is_error() {
        let err = sanitize_subdomain("!!!___", 63).unwrap_err();
        assert!(matches!(err, SpecError::InvalidSubdomain { .. }));
    }
}
