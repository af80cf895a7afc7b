//! Shared configuration helpers for tokenwatch crates.

use std::env;
use std::fmt::Display;
use std::str::FromStr;

/// Parse an override from an environment variable.
///
/// Returns `None` when the variable is unset, empty, or cannot be parsed; a
/// parse failure is logged so a typo does not go unnoticed.
pub fn env_override<T>(var: &str) -> Option<T>
where
    T: FromStr,
    T::Err: Display,
{
    let value = env::var(var).ok()?;
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return None;
    }
    trimmed
        .parse::<T>()
        .inspect_err(|error| {
            tracing::warn!(%var, %value, %error, "invalid override, ignoring");
        })
        .ok()
}

/// Resolve a value from an environment variable, falling back to `default`.
pub fn env_or<T>(var: &str, default: T) -> T
where
    T: FromStr,
    T::Err: Display,
{
    env_override(var).unwrap_or(default)
}

/// Overwrite `slot` in place when the environment carries an override.
pub fn apply_override<T>(var: &str, slot: &mut T)
where
    T: FromStr,
    T::Err: Display,
{
    if let Some(value) = env_override(var) {
        tracing::debug!(%var, "applying environment override");
        *slot = value;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn falls_back_when_unset_or_invalid() {
        env::remove_var("COMMON_CONFIG_TEST_UNSET");
        assert_eq!(env_or("COMMON_CONFIG_TEST_UNSET", 7u16), 7);

        env::set_var("COMMON_CONFIG_TEST_INVALID", "seven");
        assert_eq!(env_or("COMMON_CONFIG_TEST_INVALID", 7u16), 7);

        env::set_var("COMMON_CONFIG_TEST_BLANK", "   ");
        assert_eq!(env_override::<u16>("COMMON_CONFIG_TEST_BLANK"), None);
    }

    #[test]
    fn applies_valid_override() {
        env::set_var("COMMON_CONFIG_TEST_VALID", " 250 ");
        let mut tick_ms = 1000u64;
        apply_override("COMMON_CONFIG_TEST_VALID", &mut tick_ms);
        assert_eq!(tick_ms, 250);
    }
}
