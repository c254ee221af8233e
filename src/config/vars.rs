//! Environment variable interpolation for config files.
//!
//! Supported forms:
//! - `$VAR` and `${VAR}` substitute the value; an unset variable is an error
//! - `${VAR:-fallback}` uses the fallback when VAR is unset or empty
//! - `${VAR-fallback}` uses the fallback only when VAR is unset
//! - `$$` is a literal `$`

use regex::{Captures, Regex};
use std::env;
use std::sync::LazyLock;

static VARIABLE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?x)
        (?P<escape>\$\$)
        |
        \$\{ (?P<braced>[A-Za-z_][A-Za-z0-9_]*) (?: (?P<op>:?-) (?P<fallback>[^}]*) )? \}
        |
        \$(?P<bare>[A-Za-z_][A-Za-z0-9_]*)
        ",
    )
    .expect("variable pattern is valid")
});

/// Substitute environment variables in `input`.
///
/// Every problem is collected so a config with several missing variables
/// reports all of them at once.
pub fn interpolate(input: &str) -> Result<String, Vec<String>> {
    let mut problems = Vec::new();

    let text = VARIABLE.replace_all(input, |caps: &Captures| {
        if caps.name("escape").is_some() {
            return "$".to_string();
        }
        let whole = &caps[0];
        let name = caps
            .name("braced")
            .or_else(|| caps.name("bare"))
            .map_or("", |m| m.as_str());
        let fallback = caps.name("fallback").map(|m| m.as_str());
        let empty_uses_fallback = caps.name("op").is_some_and(|m| m.as_str() == ":-");

        match (env::var(name), fallback) {
            (Ok(value), _) if value.contains(['\n', '\r']) => {
                problems.push(format!(
                    "environment variable '{name}' contains newlines, which is not allowed"
                ));
                whole.to_string()
            }
            (Ok(value), Some(fallback)) if value.is_empty() && empty_uses_fallback => {
                fallback.to_string()
            }
            (Ok(value), _) => value,
            (Err(_), Some(fallback)) => fallback.to_string(),
            (Err(_), None) => {
                problems.push(format!("environment variable '{name}' is not set"));
                whole.to_string()
            }
        }
    });

    if problems.is_empty() {
        Ok(text.into_owned())
    } else {
        Err(problems)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Each test uses its own variable names, so parallel tests never race.
    fn set(key: &str, value: Option<&str>) {
        // SAFETY: keys are unique per test and never read by other threads.
        match value {
            Some(v) => unsafe { env::set_var(key, v) },
            None => unsafe { env::remove_var(key) },
        }
    }

    #[test]
    fn test_bare_and_braced_substitution() {
        set("HEARTH_TEST_BARE", Some("raw.csv"));
        set("HEARTH_TEST_BRACED", Some("warehouse.db"));
        let text = interpolate("a: $HEARTH_TEST_BARE, b: ${HEARTH_TEST_BRACED}").unwrap();
        assert_eq!(text, "a: raw.csv, b: warehouse.db");
    }

    #[test]
    fn test_all_missing_variables_reported() {
        set("HEARTH_TEST_MISS1", None);
        set("HEARTH_TEST_MISS2", None);
        let problems = interpolate("a: $HEARTH_TEST_MISS1, b: ${HEARTH_TEST_MISS2}").unwrap_err();
        assert_eq!(problems.len(), 2);
        assert!(problems[0].contains("HEARTH_TEST_MISS1"));
        assert!(problems[1].contains("not set"));
    }

    #[test]
    fn test_fallbacks() {
        set("HEARTH_TEST_UNSET", None);
        set("HEARTH_TEST_EMPTY", Some(""));
        assert_eq!(
            interpolate("${HEARTH_TEST_UNSET:-data/raw}").unwrap(),
            "data/raw"
        );
        assert_eq!(interpolate("${HEARTH_TEST_EMPTY:-x}").unwrap(), "x");
        assert_eq!(interpolate("${HEARTH_TEST_EMPTY-x}").unwrap(), "");
    }

    #[test]
    fn test_escape_sequence() {
        assert_eq!(interpolate("price: $$100").unwrap(), "price: $100");
    }

    #[test]
    fn test_newline_injection_blocked() {
        set("HEARTH_TEST_NEWLINE", Some("a\nb"));
        let problems = interpolate("value: $HEARTH_TEST_NEWLINE").unwrap_err();
        assert!(problems[0].contains("newlines"));
    }
}
