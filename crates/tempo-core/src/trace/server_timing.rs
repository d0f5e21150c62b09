use super::{
    OverwritePolicy, TimingMetric, is_quoted_string, metric_name::is_token, quote, split_unquoted,
    unquote,
};
use crate::error::{Error, ErrorKind};
use smallvec::SmallVec;
use std::fmt;

/// Parameters of a metric as a list of unquoted key-value pairs.
type Params = SmallVec<[(String, String); 2]>;

/// Performance metrics for the request-response cycle.
/// See [W3C Server Timing](https://w3c.github.io/server-timing).
///
/// It is a mapping from metric names to their parameters which preserves
/// the first-seen order of the metrics.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServerTiming {
    /// Server timing metrics.
    metrics: SmallVec<[(String, Params); 4]>,
}

impl ServerTiming {
    /// Creates a new instance.
    #[inline]
    pub fn new() -> Self {
        Self {
            metrics: SmallVec::new(),
        }
    }

    /// Parses the `server-timing` header value, skipping malformed segments.
    ///
    /// A metric without a valid name is dropped entirely, and a parameter without `=`
    /// or with an unterminated quoted string is dropped from its metric.
    /// If a metric appears more than once, only its first instance is kept as a whole;
    /// if a parameter appears more than once within a metric, the first instance wins.
    pub fn parse(header_value: &str) -> Self {
        let mut server_timing = Self::new();
        server_timing.parse_into(header_value, false).ok();
        server_timing
    }

    /// Parses the `server-timing` header value, failing on the first malformed segment.
    pub fn try_parse(header_value: &str) -> Result<Self, Error> {
        let mut server_timing = Self::new();
        server_timing.parse_into(header_value, true)?;
        Ok(server_timing)
    }

    fn parse_into(&mut self, header_value: &str, strict: bool) -> Result<(), Error> {
        for segment in split_unquoted(header_value, ',') {
            let segment = segment.trim();
            if segment.is_empty() {
                continue;
            }

            let mut parts = split_unquoted(segment, ';').into_iter();
            let name = parts.next().unwrap_or_default().trim();
            if !is_token(name) {
                let message = format!("invalid metric name in the segment `{segment}`");
                if strict {
                    return Err(Error::with_kind(ErrorKind::MalformedHeader, message));
                }
                tracing::warn!(segment, "{message}");
                continue;
            }

            if self.contains(name) {
                tracing::debug!(segment, "repeated metric `{name}` is ignored");
                continue;
            }

            let index = self.position_or_insert(name);
            for part in parts {
                let param = part.trim();
                if param.is_empty() {
                    continue;
                }
                let Some((key, value)) = param
                    .split_once('=')
                    .map(|(key, value)| (key.trim(), value.trim()))
                    .filter(|(key, value)| {
                        is_token(key) && (!value.starts_with('"') || is_quoted_string(value))
                    })
                else {
                    let message = format!("invalid parameter `{param}` for the metric `{name}`");
                    if strict {
                        return Err(Error::with_kind(ErrorKind::MalformedHeader, message));
                    }
                    tracing::warn!(segment, "{message}");
                    continue;
                };

                let key = key.to_ascii_lowercase();
                let params = &mut self.metrics[index].1;
                if !params.iter().any(|(k, _)| *k == key) {
                    params.push((key, unquote(value)));
                }
            }
        }
        Ok(())
    }

    /// Pushes an entry into the list of metrics.
    /// If a metric with the same name already exists, its parameters are replaced.
    #[inline]
    pub fn push(&mut self, metric: &TimingMetric) {
        self.insert(metric.name(), metric.params());
    }

    /// Inserts a metric with the parameters. If a metric with the same name already exists,
    /// all of its parameters are replaced and the position is kept.
    pub fn insert(&mut self, name: &str, params: impl IntoIterator<Item = (String, String)>) {
        let index = self.position_or_insert(name);
        self.metrics[index].1 = params.into_iter().collect();
    }

    /// Merges the metrics into `self` according to the overwrite policy,
    /// returning the number of metrics which have been written.
    pub fn merge<'a>(
        &mut self,
        metrics: impl IntoIterator<Item = &'a TimingMetric>,
        policy: OverwritePolicy,
    ) -> usize {
        let mut num_written = 0;
        for metric in metrics {
            let written = match policy {
                OverwritePolicy::Disabled => false,
                OverwritePolicy::Replace => true,
                OverwritePolicy::Retain => !self.contains(metric.name()),
            };
            if written {
                self.push(metric);
                num_written += 1;
            }
        }
        num_written
    }

    /// Returns `true` if the metric exists.
    #[inline]
    pub fn contains(&self, name: &str) -> bool {
        self.position(name).is_some()
    }

    /// Returns the parameters of the metric.
    #[inline]
    pub fn get(&self, name: &str) -> Option<&[(String, String)]> {
        self.position(name)
            .map(|index| self.metrics[index].1.as_slice())
    }

    /// Returns the unquoted value of a metric parameter.
    #[inline]
    pub fn get_param(&self, name: &str, key: &str) -> Option<&str> {
        self.get(name)?
            .iter()
            .find_map(|(k, v)| k.eq_ignore_ascii_case(key).then_some(v.as_str()))
    }

    /// Returns an iterator over the metric names.
    #[inline]
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.metrics.iter().map(|(name, _)| name.as_str())
    }

    /// Returns the number of metrics.
    #[inline]
    pub fn len(&self) -> usize {
        self.metrics.len()
    }

    /// Returns `true` if there are no metrics.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.metrics.is_empty()
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.metrics.iter().position(|(n, _)| n == name)
    }

    fn position_or_insert(&mut self, name: &str) -> usize {
        self.position(name).unwrap_or_else(|| {
            self.metrics.push((name.to_owned(), Params::new()));
            self.metrics.len() - 1
        })
    }
}

impl<'a> FromIterator<&'a TimingMetric> for ServerTiming {
    fn from_iter<T: IntoIterator<Item = &'a TimingMetric>>(iter: T) -> Self {
        let mut server_timing = Self::new();
        for metric in iter {
            server_timing.push(metric);
        }
        server_timing
    }
}

impl fmt::Display for ServerTiming {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        for (index, (name, params)) in self.metrics.iter().enumerate() {
            if index > 0 {
                f.write_str(",")?;
            }
            f.write_str(name)?;
            for (key, value) in params {
                if key == "desc" || !is_token(value) {
                    write!(f, ";{key}={}", quote(value))?;
                } else {
                    write!(f, ";{key}={value}")?;
                }
            }
        }
        Ok(())
    }
}
