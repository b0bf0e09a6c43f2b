//! Input validation for names and NATS subject patterns.
//! All checks run before the registry or the filesystem is touched.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::{ConfError, ConfResult};

pub const MAX_NAME_LEN: usize = 128;

static NAME_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z0-9_\-][A-Za-z0-9_.\-]*$").expect("static name regex")
});

/// Validate a resource name (identity, template, account or snapshot).
/// Names double as file names under the data root, so path separators and a
/// leading dot are rejected.
pub fn validate_name(field: &str, name: &str) -> ConfResult<()> {
    if name.is_empty() {
        return Err(ConfError::validation(field, "must not be empty"));
    }
    if name.len() > MAX_NAME_LEN {
        return Err(ConfError::validation(field, format!("longer than {} characters", MAX_NAME_LEN)));
    }
    if !NAME_RE.is_match(name) {
        return Err(ConfError::validation(
            field,
            format!("'{}' may only contain letters, digits, '_', '-', '.' and must not start with '.'", name),
        ));
    }
    Ok(())
}

/// Validate a single subject pattern: dot-separated non-empty tokens, `*` only as
/// a whole token, `>` only as the whole last token, no whitespace.
pub fn validate_subject(field: &str, subject: &str) -> ConfResult<()> {
    if subject.is_empty() {
        return Err(ConfError::validation(field, "empty subject"));
    }
    if subject.chars().any(char::is_whitespace) {
        return Err(ConfError::validation(field, format!("subject '{}' contains whitespace", subject)));
    }
    let tokens: Vec<&str> = subject.split('.').collect();
    let last = tokens.len() - 1;
    for (i, tok) in tokens.iter().enumerate() {
        if tok.is_empty() {
            return Err(ConfError::validation(field, format!("subject '{}' has an empty token", subject)));
        }
        if tok.len() > 1 && (tok.contains('*') || tok.contains('>')) {
            return Err(ConfError::validation(
                field,
                format!("subject '{}': wildcards must be a whole token", subject),
            ));
        }
        if *tok == ">" && i != last {
            return Err(ConfError::validation(
                field,
                format!("subject '{}': '>' is only allowed as the last token", subject),
            ));
        }
    }
    Ok(())
}

/// Validate a pattern list and collapse duplicates, keeping first-occurrence order.
pub fn normalize_subjects(field: &str, subjects: Vec<String>) -> ConfResult<Vec<String>> {
    let mut out: Vec<String> = Vec::with_capacity(subjects.len());
    for s in subjects {
        validate_subject(field, &s)?;
        if !out.contains(&s) {
            out.push(s);
        }
    }
    Ok(out)
}

/// Normalize an optional reference: absent and empty both mean "no reference".
pub fn normalize_ref(field: &str, value: Option<String>) -> ConfResult<Option<String>> {
    match value {
        None => Ok(None),
        Some(v) if v.is_empty() => Ok(None),
        Some(v) => {
            validate_name(field, &v)?;
            Ok(Some(v))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names() {
        assert!(validate_name("name", "user-a").is_ok());
        assert!(validate_name("name", "with.dots_and-dash9").is_ok());
        assert!(validate_name("name", "").is_err());
        assert!(validate_name("name", ".hidden").is_err());
        assert!(validate_name("name", "../etc").is_err());
        assert!(validate_name("name", "a/b").is_err());
        assert!(validate_name("name", &"x".repeat(MAX_NAME_LEN + 1)).is_err());
    }

    #[test]
    fn subjects() {
        for ok in ["foo", "foo.bar", "foo.*", "foo.>", ">", "*.bar.>", "_INBOX.>"] {
            assert!(validate_subject("publish.allow", ok).is_ok(), "{}", ok);
        }
        for bad in ["", "foo..bar", ".foo", "foo.", "foo bar", "foo*", "a.>.b", "fo>"] {
            assert!(validate_subject("publish.allow", bad).is_err(), "{}", bad);
        }
    }

    #[test]
    fn normalize_dedups_in_order() {
        let got = normalize_subjects("s", vec!["b".into(), "a".into(), "b".into()]).unwrap();
        assert_eq!(got, vec!["b".to_string(), "a".to_string()]);
    }

    #[test]
    fn empty_ref_is_none() {
        assert_eq!(normalize_ref("account", Some(String::new())).unwrap(), None);
        assert_eq!(normalize_ref("account", Some("foo".into())).unwrap(), Some("foo".into()));
        assert!(normalize_ref("account", Some("a/b".into())).is_err());
    }
}
