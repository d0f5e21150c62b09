//! HTTP headers for performance metrics.

mod metric_name;
mod overwrite_policy;
mod server_timing;
mod timing_metric;

pub use metric_name::MetricName;
pub use overwrite_policy::OverwritePolicy;
pub use server_timing::ServerTiming;
pub use timing_metric::TimingMetric;

/// Formats the text as a quoted string, escaping `"` and `\`.
fn quote(text: &str) -> String {
    let mut quoted = String::with_capacity(text.len() + 2);
    quoted.push('"');
    for ch in text.chars() {
        if matches!(ch, '"' | '\\') {
            quoted.push('\\');
        }
        quoted.push(ch);
    }
    quoted.push('"');
    quoted
}

/// Removes the surrounding quotes and the escapes of a quoted string.
/// Values which are not quoted are returned unchanged.
fn unquote(value: &str) -> String {
    let Some(inner) = value
        .strip_prefix('"')
        .and_then(|s| s.strip_suffix('"'))
    else {
        return value.to_owned();
    };
    let mut text = String::with_capacity(inner.len());
    let mut escaped = false;
    for ch in inner.chars() {
        if escaped {
            text.push(ch);
            escaped = false;
        } else if ch == '\\' {
            escaped = true;
        } else {
            text.push(ch);
        }
    }
    text
}

/// Returns `true` if the value is a complete quoted string.
fn is_quoted_string(value: &str) -> bool {
    let Some(inner) = value
        .strip_prefix('"')
        .and_then(|s| s.strip_suffix('"'))
    else {
        return false;
    };
    let mut escaped = false;
    for ch in inner.chars() {
        if escaped {
            escaped = false;
        } else if ch == '\\' {
            escaped = true;
        } else if ch == '"' {
            return false;
        }
    }
    !escaped
}

/// Splits the header value on the delimiter, ignoring delimiters inside quoted strings.
///
/// A quote which is never closed only extends to the next delimiter,
/// so the parts after it are split as usual.
fn split_unquoted(value: &str, delimiter: char) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut start = 0;
    let mut quote_start = 0;
    let mut in_quotes = false;
    let mut escaped = false;
    for (index, ch) in value.char_indices() {
        if escaped {
            escaped = false;
        } else if in_quotes && ch == '\\' {
            escaped = true;
        } else if ch == '"' {
            in_quotes = !in_quotes;
            quote_start = index;
        } else if ch == delimiter && !in_quotes {
            parts.push(&value[start..index]);
            start = index + ch.len_utf8();
        }
    }
    if in_quotes {
        if let Some(offset) = value[quote_start..].find(delimiter) {
            let end = quote_start + offset;
            parts.push(&value[start..end]);
            parts.extend(split_unquoted(&value[end + delimiter.len_utf8()..], delimiter));
            return parts;
        }
    }
    parts.push(&value[start..]);
    parts
}

#[cfg(test)]
mod tests {
    use super::{is_quoted_string, quote, split_unquoted, unquote};

    #[test]
    fn it_quotes_and_unquotes_text() {
        assert_eq!(quote("plain"), "\"plain\"");
        assert_eq!(quote(r#"a "b" \c"#), r#""a \"b\" \\c""#);
        assert_eq!(unquote(r#""a \"b\" \\c""#), r#"a "b" \c"#);
        assert_eq!(unquote("token"), "token");
        assert_eq!(unquote("\""), "\"");
    }

    #[test]
    fn it_splits_outside_quotes() {
        assert_eq!(split_unquoted("a;b", ';'), ["a", "b"]);
        assert_eq!(
            split_unquoted(r#"db;desc="a, b",cache"#, ','),
            [r#"db;desc="a, b""#, "cache"]
        );
        assert_eq!(
            split_unquoted(r#"db;desc="x\";y";dur=1"#, ';'),
            ["db", r#"desc="x\";y""#, "dur=1"]
        );
        assert_eq!(split_unquoted("", ','), [""]);
        assert_eq!(
            split_unquoted(r#"a;desc="oops, b;dur=1, c"#, ','),
            [r#"a;desc="oops"#, " b;dur=1", " c"]
        );
        assert_eq!(split_unquoted(r#"a;desc="oops"#, ';'), ["a", r#"desc="oops"#]);
    }

    #[test]
    fn it_checks_quoted_strings() {
        assert!(is_quoted_string(r#""""#));
        assert!(is_quoted_string(r#""a \"b\"""#));
        assert!(!is_quoted_string("token"));
        assert!(!is_quoted_string(r#""oops"#));
        assert!(!is_quoted_string(r#""a"b""#));
        assert!(!is_quoted_string(r#""a\""#));
        assert!(!is_quoted_string("\""));
    }
}
