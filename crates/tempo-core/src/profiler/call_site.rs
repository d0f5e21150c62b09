use crate::{
    SharedString,
    error::{Error, ErrorKind},
};
use ahash::AHashSet;
use regex::Regex;
use std::{borrow::Borrow, fmt, sync::LazyLock};

/// A stable identifier of a tracked call, such as `app::db::query`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CallSite(SharedString);

impl CallSite {
    /// Creates a new instance. The identifier must be a path of Rust identifiers
    /// separated by `::`.
    pub fn new(path: impl Into<SharedString>) -> Result<Self, Error> {
        let path = path.into();
        if !CALL_SITE_PATTERN.is_match(&path) {
            let message = format!(
                "the call site `{path}` should be a path of identifiers like `app::db::query`"
            );
            return Err(Error::with_kind(ErrorKind::InvalidCallSite, message));
        }
        Ok(Self(path))
    }

    /// Returns the identifier as `&str`.
    #[inline]
    pub fn as_str(&self) -> &str {
        self.0.as_ref()
    }
}

impl Borrow<str> for CallSite {
    #[inline]
    fn borrow(&self) -> &str {
        self.as_str()
    }
}

impl fmt::Display for CallSite {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A set of call sites whose timings are aggregated into one metric.
#[derive(Debug, Clone, Default)]
pub struct CallGroup {
    /// Call sites.
    call_sites: AHashSet<CallSite>,
}

impl CallGroup {
    /// Creates a new instance.
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses the call sites and collects them into a group.
    pub fn try_from_paths<I, S>(paths: I) -> Result<Self, Error>
    where
        I: IntoIterator<Item = S>,
        S: Into<SharedString>,
    {
        paths
            .into_iter()
            .map(CallSite::new)
            .collect::<Result<AHashSet<_>, _>>()
            .map(|call_sites| Self { call_sites })
    }

    /// Inserts a call site, returning `false` if it is already present.
    #[inline]
    pub fn insert(&mut self, call_site: CallSite) -> bool {
        self.call_sites.insert(call_site)
    }

    /// Returns `true` if the group contains the call site.
    #[inline]
    pub fn contains(&self, call_site: &str) -> bool {
        self.call_sites.contains(call_site)
    }

    /// Returns an iterator over the call sites in an arbitrary order.
    #[inline]
    pub fn iter(&self) -> impl Iterator<Item = &CallSite> {
        self.call_sites.iter()
    }

    /// Returns the number of call sites.
    #[inline]
    pub fn len(&self) -> usize {
        self.call_sites.len()
    }

    /// Returns `true` if the group has no call sites.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.call_sites.is_empty()
    }
}

impl FromIterator<CallSite> for CallGroup {
    #[inline]
    fn from_iter<T: IntoIterator<Item = CallSite>>(iter: T) -> Self {
        Self {
            call_sites: iter.into_iter().collect(),
        }
    }
}

/// Pattern of a path of identifiers.
static CALL_SITE_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*(::[A-Za-z_][A-Za-z0-9_]*)*$")
        .expect("fail to create the call site pattern")
});

#[cfg(test)]
mod tests {
    use super::{CallGroup, CallSite};
    use crate::error::ErrorKind;

    #[test]
    fn it_validates_call_sites() {
        for path in ["query", "app::db::query", "_private::fn2"] {
            assert_eq!(CallSite::new(path).unwrap().as_str(), path);
        }
        for path in ["", "app::", "::query", "app:db", "app::1query", "a b", "app.query", "r#async"] {
            let err = CallSite::new(path).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::InvalidCallSite, "`{path}` is invalid");
        }
    }

    #[test]
    fn it_collects_call_groups() {
        let group = CallGroup::try_from_paths(["app::render", "app::encode", "app::render"]).unwrap();
        assert_eq!(group.len(), 2);
        assert!(group.contains("app::render"));
        assert!(!group.contains("app::db::query"));

        let err = CallGroup::try_from_paths(["app::render", "not callable"]).unwrap_err();
        assert!(err.is_configuration_error());
    }
}
