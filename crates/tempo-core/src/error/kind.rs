use std::fmt;

/// Classification of an [`Error`](super::Error).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum ErrorKind {
    /// A metric name is not a valid header token.
    InvalidMetricName,
    /// A tracked call site is not a valid identifier path.
    InvalidCallSite,
    /// The overwrite behavior is neither `replace`, `retain` nor a falsy value.
    InvalidOverwritePolicy,
    /// The configuration table has an unexpected shape.
    InvalidConfig,
    /// An existing `server-timing` header could not be parsed.
    MalformedHeader,
    /// Any other error.
    Other,
}

impl ErrorKind {
    /// Returns `true` if the kind is raised while building the configuration.
    #[inline]
    pub fn is_configuration_error(self) -> bool {
        matches!(
            self,
            Self::InvalidMetricName
                | Self::InvalidCallSite
                | Self::InvalidOverwritePolicy
                | Self::InvalidConfig
        )
    }

    /// Returns the kind as `&str`.
    #[inline]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::InvalidMetricName => "invalid metric name",
            Self::InvalidCallSite => "invalid call site",
            Self::InvalidOverwritePolicy => "invalid overwrite policy",
            Self::InvalidConfig => "invalid config",
            Self::MalformedHeader => "malformed header",
            Self::Other => "other",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
