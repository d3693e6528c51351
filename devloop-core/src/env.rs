//! Literal `${NAME}` / `$NAME` substitution against an environment map.
//!
//! This is textual replacement, not shell expansion: there are no defaults,
//! no nesting, and references to unknown names are left untouched.

use std::collections::HashMap;

use once_cell::sync::Lazy;
use regex::{Captures, Regex};

static RE_ENV_REF: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}|\$([A-Za-z_][A-Za-z0-9_]*)")
        .expect("static env reference pattern")
});

/// Replace every known `${NAME}` and `$NAME` in `s` with its value.
pub fn substitute_env(s: &str, env: &HashMap<String, String>) -> String {
    if env.is_empty() || !s.contains('$') {
        return s.to_string();
    }
    RE_ENV_REF
        .replace_all(s, |caps: &Captures<'_>| {
            let name = caps
                .get(1)
                .or_else(|| caps.get(2))
                .map(|m| m.as_str())
                .unwrap_or_default();
            match env.get(name) {
                Some(value) => value.clone(),
                None => caps[0].to_string(),
            }
        })
        .into_owned()
}
