use crate::{
    SharedString,
    error::{Error, ErrorKind},
};
use regex::Regex;
use std::{
    fmt,
    hash::{Hash, Hasher},
    sync::LazyLock,
};

/// Name and optional description of a `Server-Timing` metric.
///
/// The name must be a token as defined in
/// [RFC 7230, Section 3.2.6](https://httpwg.org/specs/rfc7230.html#rule.token.separators):
/// US-ASCII, visible characters only, and no delimiters.
/// The description is emitted as a quoted string, so any text is permitted.
///
/// Two names are equal if and only if their `name` parts are equal;
/// the description is metadata and does not take part in the identity.
#[derive(Debug, Clone)]
pub struct MetricName {
    /// Metric name.
    name: SharedString,
    /// Optional description.
    description: Option<SharedString>,
}

impl MetricName {
    /// Creates a new instance without a description.
    #[inline]
    pub fn new(name: impl Into<SharedString>) -> Result<Self, Error> {
        let name = name.into();
        validate_token(&name)?;
        Ok(Self {
            name,
            description: None,
        })
    }

    /// Creates a new instance with a description.
    #[inline]
    pub fn with_description(
        name: impl Into<SharedString>,
        description: impl Into<SharedString>,
    ) -> Result<Self, Error> {
        let mut metric = Self::new(name)?;
        metric.description = Some(description.into());
        Ok(metric)
    }

    /// Returns the name.
    #[inline]
    pub fn name(&self) -> &str {
        self.name.as_ref()
    }

    /// Returns the description.
    #[inline]
    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }
}

impl PartialEq for MetricName {
    #[inline]
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl Eq for MetricName {}

impl Hash for MetricName {
    #[inline]
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.name.hash(state);
    }
}

impl fmt::Display for MetricName {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Delimiters which are not allowed in a token.
static DELIMITER_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"[ "(),/:;<=>?@\[\\\]{}]"#).expect("fail to create the delimiter pattern")
});

/// Returns `true` if the string is a non-empty header token.
pub(crate) fn is_token(s: &str) -> bool {
    validate_token(s).is_ok()
}

/// Validates a token. Checks are applied in a fixed order so that the error
/// message names the first rule being violated.
fn validate_token(name: &str) -> Result<(), Error> {
    if name.is_empty() {
        let message = "the metric name should not be empty";
        return Err(Error::with_kind(ErrorKind::InvalidMetricName, message));
    }
    if !name.is_ascii() {
        let message = format!("the metric name `{name}` should be US-ASCII characters");
        return Err(Error::with_kind(ErrorKind::InvalidMetricName, message));
    }
    if name.bytes().any(|b| b.is_ascii_control()) {
        let message = format!("the metric name `{}` should be printable", name.escape_debug());
        return Err(Error::with_kind(ErrorKind::InvalidMetricName, message));
    }
    if DELIMITER_PATTERN.is_match(name) {
        let message = format!("the metric name `{name}` should not contain delimiters");
        return Err(Error::with_kind(ErrorKind::InvalidMetricName, message));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::MetricName;
    use crate::error::ErrorKind;
    use std::collections::HashSet;

    #[test]
    fn it_accepts_visible_ascii_tokens() {
        let visible = (0x21u8..0x7f)
            .map(char::from)
            .filter(|ch| !" \"(),/:;<=>?@[\\]{}".contains(*ch));
        for ch in visible {
            let name = format!("m{ch}");
            assert!(MetricName::new(name.clone()).is_ok(), "`{name}` is a token");
        }
        let metric = MetricName::with_description("db-query_1.total", "Query \"users\"").unwrap();
        assert_eq!(metric.name(), "db-query_1.total");
        assert_eq!(metric.description(), Some("Query \"users\""));
    }

    #[test]
    fn it_rejects_delimiters() {
        for ch in " \"(),/:;<=>?@[\\]{}".chars() {
            let name = format!("db{ch}query");
            let err = MetricName::new(name.clone()).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::InvalidMetricName, "`{name}` has a delimiter");
        }
    }

    #[test]
    fn it_applies_rules_in_order() {
        let err = MetricName::new("").unwrap_err();
        assert!(err.message().contains("empty"));

        let err = MetricName::new("caché (hit)").unwrap_err();
        assert!(err.message().contains("US-ASCII"));

        let err = MetricName::new("tab\there").unwrap_err();
        assert!(err.message().contains("printable"));

        let err = MetricName::new("\u{7f}").unwrap_err();
        assert!(err.message().contains("printable"));

        let err = MetricName::new("a b").unwrap_err();
        assert!(err.message().contains("delimiters"));
    }

    #[test]
    fn it_compares_names_only() {
        let plain = MetricName::new("db").unwrap();
        let described = MetricName::with_description("db", "Database").unwrap();
        assert_eq!(plain, described);

        let names = [plain, described, MetricName::new("cache").unwrap()]
            .into_iter()
            .collect::<HashSet<_>>();
        assert_eq!(names.len(), 2);
    }
}
