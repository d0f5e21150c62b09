use crate::error::{Error, ErrorKind};
use std::{fmt, str::FromStr};
use toml::Value;

/// Handling of metrics which already exist in the `server-timing` header.
///
/// Only the first instance of a parameter is considered by user agents,
/// so duplicate metrics are never appended. Merging is atomic per metric:
/// an existing `a;desc="..."` and a new `a;dur=...` are never combined.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OverwritePolicy {
    /// Leaves an existing header untouched and discards the new metrics.
    #[default]
    Disabled,
    /// Replaces existing metrics of the same name with the new ones.
    Replace,
    /// Retains existing metrics, ignoring new ones of the same name.
    Retain,
}

impl OverwritePolicy {
    /// Parses the policy from a TOML value. An empty string, `false` or `0` disables the policy.
    pub fn from_toml(value: &Value) -> Result<Self, Error> {
        match value {
            Value::String(s) => s.parse(),
            Value::Boolean(false) => Ok(Self::Disabled),
            Value::Integer(0) => Ok(Self::Disabled),
            _ => Err(invalid_policy(&format!("{value:?}"))),
        }
    }

    /// Returns the policy as `&str`. The disabled policy is displayed as `none`,
    /// which is not accepted when parsing.
    #[inline]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Disabled => "none",
            Self::Replace => "replace",
            Self::Retain => "retain",
        }
    }
}

impl FromStr for OverwritePolicy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "replace" => Ok(Self::Replace),
            "retain" => Ok(Self::Retain),
            "" => Ok(Self::Disabled),
            _ => Err(invalid_policy(s)),
        }
    }
}

impl fmt::Display for OverwritePolicy {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn invalid_policy(value: &str) -> Error {
    let message = format!(
        "the overwrite behavior `{value}` should be one of `replace`, `retain` or a falsy value"
    );
    Error::with_kind(ErrorKind::InvalidOverwritePolicy, message)
}
