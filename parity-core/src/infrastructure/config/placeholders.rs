// parity-core/src/infrastructure/config/placeholders.rs

use regex::{Captures, Regex};
use std::sync::OnceLock;

use crate::domain::error::DomainError;

fn re_placeholder() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)(?::-([^}]*))?\}").unwrap_or_else(|_| {
            // Hardcoded pattern; the fallback matches nothing.
            Regex::new("$^").unwrap_or_else(|_| unreachable!())
        })
    })
}

/// Replaces `${VAR}` and `${VAR:-default}` using `lookup`. Any placeholder
/// left without a value is an error: rules never reach the engine half-resolved.
pub fn substitute<F>(text: &str, location: &str, lookup: F) -> Result<String, DomainError>
where
    F: Fn(&str) -> Option<String>,
{
    let mut missing: Option<String> = None;
    let resolved = re_placeholder().replace_all(text, |caps: &Captures| {
        let name = &caps[1];
        match lookup(name).or_else(|| caps.get(2).map(|d| d.as_str().to_string())) {
            Some(value) => value,
            None => {
                missing.get_or_insert_with(|| caps[0].to_string());
                String::new()
            }
        }
    });

    match missing {
        Some(placeholder) => Err(DomainError::UnresolvedPlaceholder {
            placeholder,
            location: location.to_string(),
        }),
        None => Ok(resolved.into_owned()),
    }
}
