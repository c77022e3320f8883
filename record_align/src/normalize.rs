use crate::config::{Domain, Value};

/// Maps a raw cell string to a normalized value for the field's domain.
///
/// This function is pure and total: every input yields exactly one of
/// {valid payload, `Missing`, `Unparseable`} and never panics.
/// Blank or whitespace-only cells are always `Missing`.
pub fn normalize_response(raw: &str, domain: &Domain) -> Value {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Value::Missing;
    }
    // Form exports occasionally smear a timestamp into an answer column.
    // Treat those cells as blank rather than flagging every one of them.
    if looks_like_timestamp(trimmed) {
        return Value::Missing;
    }
    match domain {
        Domain::Likert(vocabulary) | Domain::Categorical(vocabulary) => {
            match vocabulary.lookup(trimmed) {
                Some(code) => Value::Code(code),
                None => Value::Unparseable,
            }
        }
        Domain::Count => match trimmed.parse::<u64>() {
            Ok(n) => Value::Count(n),
            Err(_) => Value::Unparseable,
        },
        Domain::FreeText => Value::Text(normalize_token(trimmed)),
    }
}

/// Canonical form for vocabulary keys and free-text payloads: trimmed,
/// case folded, edge punctuation stripped, internal whitespace collapsed.
pub(crate) fn normalize_token(s: &str) -> String {
    let stripped = s
        .trim()
        .trim_matches(|c: char| matches!(c, '.' | ',' | ';' | '!' | '?'))
        .trim();
    let mut out = String::with_capacity(stripped.len());
    let mut pending_space = false;
    for c in stripped.chars() {
        if c.is_whitespace() {
            pending_space = !out.is_empty();
        } else {
            if pending_space {
                out.push(' ');
                pending_space = false;
            }
            out.extend(c.to_lowercase());
        }
    }
    out
}

fn looks_like_timestamp(s: &str) -> bool {
    s.contains('/') && s.contains(':')
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Vocabulary;

    fn agreement() -> Domain {
        Domain::Likert(Vocabulary::new(&[
            ("Strongly Disagree", 0),
            ("Disagree", 1),
            ("Neutral", 2),
            ("Agree", 3),
            ("Strongly Agree", 4),
        ]))
    }

    #[test]
    fn blank_is_missing() {
        assert_eq!(normalize_response("", &agreement()), Value::Missing);
        assert_eq!(normalize_response("   ", &agreement()), Value::Missing);
        assert_eq!(normalize_response("\t \n", &agreement()), Value::Missing);
    }

    #[test]
    fn likert_lookup_is_forgiving_about_formatting() {
        assert_eq!(normalize_response("Strongly Agree", &agreement()), Value::Code(4));
        assert_eq!(normalize_response("  strongly   agree ", &agreement()), Value::Code(4));
        assert_eq!(normalize_response("Agree.", &agreement()), Value::Code(3));
        assert_eq!(normalize_response("STRONGLY DISAGREE", &agreement()), Value::Code(0));
    }

    #[test]
    fn typo_is_unparseable_not_missing() {
        assert_eq!(
            normalize_response("Strongly Disagreeee", &agreement()),
            Value::Unparseable
        );
        assert_ne!(
            normalize_response("Strongly Disagreeee", &agreement()),
            normalize_response("", &agreement())
        );
    }

    #[test]
    fn categorical_is_case_insensitive() {
        let level = Domain::Categorical(Vocabulary::new(&[
            ("PGY1", 0),
            ("PGY2", 1),
            ("PGY3", 2),
        ]));
        assert_eq!(normalize_response("pgy2", &level), Value::Code(1));
        assert_eq!(normalize_response("PGY4", &level), Value::Unparseable);
    }

    #[test]
    fn count_parses_integers_only() {
        assert_eq!(normalize_response("3", &Domain::Count), Value::Count(3));
        assert_eq!(normalize_response("three", &Domain::Count), Value::Unparseable);
        assert_eq!(normalize_response("", &Domain::Count), Value::Missing);
    }

    #[test]
    fn free_text_carries_through_lowercased() {
        assert_eq!(
            normalize_response("  Hopeful ", &Domain::FreeText),
            Value::Text("hopeful".to_string())
        );
    }

    #[test]
    fn timestamps_are_treated_as_blank() {
        assert_eq!(
            normalize_response("10/21/2022 9:55:00", &agreement()),
            Value::Missing
        );
        // A plain slash or colon alone is not a timestamp.
        let level = Domain::Categorical(Vocabulary::new(&[("pulm/crit", 10)]));
        assert_eq!(normalize_response("Pulm/Crit", &level), Value::Code(10));
    }
}
