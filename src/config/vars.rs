//! Environment variable interpolation for config files.
//!
//! Supports:
//! - `$VAR` or `${VAR}` - substitute with env var value, error if missing
//! - `${VAR:-default}` - use default if VAR is unset OR empty
//! - `${VAR-default}` - use default only if VAR is unset
//! - `$$` - escape sequence for a literal `$`

use regex::{Captures, Regex};
use std::env;
use std::sync::LazyLock;

static VAR_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?x)
        \$\$                           # escape sequence $$
        |
        \$\{
            ([A-Za-z_][A-Za-z0-9_]*)   # braced variable name (group 1)
            (?:
                (:?-)                  # :- or - (group 2)
                ([^}]*)                # default value (group 3)
            )?
        \}
        |
        \$([A-Za-z_][A-Za-z0-9_]*)     # unbraced $VAR (group 4)
        ",
    )
    .expect("invalid interpolation pattern")
});

/// Interpolate environment variables in the given text.
///
/// All missing-variable errors are accumulated so the user sees every
/// problem at once instead of fixing them one by one.
pub fn interpolate(input: &str) -> Result<String, Vec<String>> {
    let mut errors = Vec::new();

    let text = VAR_PATTERN.replace_all(input, |caps: &Captures| {
        if &caps[0] == "$$" {
            return "$".to_string();
        }

        let name = caps
            .get(1)
            .or_else(|| caps.get(4))
            .map(|m| m.as_str())
            .unwrap_or_default();
        let dash = caps.get(2).map(|m| m.as_str());
        let default = caps.get(3).map(|m| m.as_str());

        match (env::var(name), dash, default) {
            // ${VAR:-default}: empty counts as unset
            (Ok(v), Some(":-"), Some(d)) if v.is_empty() => d.to_string(),
            (Ok(v), _, _) => v,
            (Err(_), Some(_), Some(d)) => d.to_string(),
            (Err(_), _, _) => {
                errors.push(format!("missing environment variable: {name}"));
                String::new()
            }
        }
    });

    if errors.is_empty() {
        Ok(text.into_owned())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Serialize env mutation across tests with unique var names per test.

    #[test]
    fn substitutes_braced_and_unbraced() {
        env::set_var("RELAY_TEST_HOST", "vpsa.example.com");
        let out = interpolate("host: ${RELAY_TEST_HOST} backup: $RELAY_TEST_HOST").unwrap();
        assert_eq!(out, "host: vpsa.example.com backup: vpsa.example.com");
    }

    #[test]
    fn default_used_when_unset() {
        env::remove_var("RELAY_TEST_UNSET");
        let out = interpolate("${RELAY_TEST_UNSET:-fallback}").unwrap();
        assert_eq!(out, "fallback");
    }

    #[test]
    fn colon_default_used_when_empty() {
        env::set_var("RELAY_TEST_EMPTY", "");
        assert_eq!(interpolate("${RELAY_TEST_EMPTY:-x}").unwrap(), "x");
        // Plain dash keeps the empty value.
        assert_eq!(interpolate("${RELAY_TEST_EMPTY-x}").unwrap(), "");
    }

    #[test]
    fn dollar_escape() {
        assert_eq!(interpolate("cost: $$5").unwrap(), "cost: $5");
    }

    #[test]
    fn missing_variables_accumulate() {
        env::remove_var("RELAY_TEST_MISSING_A");
        env::remove_var("RELAY_TEST_MISSING_B");
        let errors = interpolate("${RELAY_TEST_MISSING_A} ${RELAY_TEST_MISSING_B}").unwrap_err();
        assert_eq!(errors.len(), 2);
    }
}
