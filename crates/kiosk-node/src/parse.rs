//! Tolerant decoding of persisted values.
//!
//! A missing, corrupt or out-of-range stored value never stops an instance
//! from starting: the field falls back to its default and the outcome is
//! reported as [`Parsed::UsedDefault`] so callers and tests can see it.

use serde::de::DeserializeOwned;

/// Why a default was used instead of the stored value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DefaultReason {
    /// Nothing stored under the key
    Missing,
    /// Stored bytes are not valid JSON of the expected shape
    Corrupt(String),
    /// Stored value parsed but failed validation
    Rejected,
}

/// Outcome of [`parse_or_default`].
#[derive(Debug, Clone, PartialEq)]
pub enum Parsed<T> {
    /// The stored value, decoded and validated
    Value(T),
    /// The default, with the reason it was used
    UsedDefault { value: T, reason: DefaultReason },
}

impl<T> Parsed<T> {
    /// The value, whichever way it was obtained.
    pub fn into_inner(self) -> T {
        match self {
            Parsed::Value(value) | Parsed::UsedDefault { value, .. } => value,
        }
    }

    /// True if the default was used.
    pub fn used_default(&self) -> bool {
        matches!(self, Parsed::UsedDefault { .. })
    }

    /// The fallback reason, if any.
    pub fn reason(&self) -> Option<&DefaultReason> {
        match self {
            Parsed::Value(_) => None,
            Parsed::UsedDefault { reason, .. } => Some(reason),
        }
    }
}

/// Decode `raw` as JSON and validate it, falling back to `default`.
pub fn parse_or_default<T, F>(raw: Option<&[u8]>, default: T, validate: F) -> Parsed<T>
where
    T: DeserializeOwned,
    F: FnOnce(&T) -> bool,
{
    let Some(raw) = raw else {
        return Parsed::UsedDefault {
            value: default,
            reason: DefaultReason::Missing,
        };
    };
    match serde_json::from_slice::<T>(raw) {
        Ok(value) if validate(&value) => Parsed::Value(value),
        Ok(_) => Parsed::UsedDefault {
            value: default,
            reason: DefaultReason::Rejected,
        },
        Err(e) => Parsed::UsedDefault {
            value: default,
            reason: DefaultReason::Corrupt(e.to_string()),
        },
    }
}
