//! URI classification and cache filename encoding
//!
//! Pure string helpers that decide whether a reference points at local or
//! remote storage, and that percent-encode the handful of characters that
//! cannot appear verbatim in cache filenames.
//!
//! A reference without `://` has no scheme. Both classifiers answer `false`
//! for it; [`is_remote_reference`] logs that at debug level while
//! [`is_local_reference`] logs a warning.

use std::path::Path;

use tracing::{debug, warn};

use crate::constants::uri::{
    BRACKET_SCHEME_MARKER, ENCODING_TABLE, FILE_SCHEME, NULL_SENTINEL, SCHEME_SEPARATOR,
};

/// Extract the scheme of `uri`, if it has one.
///
/// The bracket-prefixed variant `[label]:http://host/x` yields `http`.
pub fn scheme(uri: &str) -> Option<&str> {
    let end = uri.find(SCHEME_SEPARATOR)?;
    let prefix = &uri[..end];
    match prefix.find(BRACKET_SCHEME_MARKER) {
        Some(marker) => Some(&prefix[marker + BRACKET_SCHEME_MARKER.len()..]),
        None => Some(prefix),
    }
}

/// Everything after the first `://`, or the whole string when there is no scheme
pub fn strip_scheme(uri: &str) -> &str {
    match uri.find(SCHEME_SEPARATOR) {
        Some(end) => &uri[end + SCHEME_SEPARATOR.len()..],
        None => uri,
    }
}

/// Last path component of a reference, with any scheme and directories removed
pub fn bare_file_name(uri: &str) -> &str {
    let rest = strip_scheme(uri);
    rest.rsplit(['/', '\\']).next().unwrap_or(rest)
}

/// True when `uri` has a scheme other than `file`
pub fn is_remote_reference(uri: &str) -> bool {
    match scheme(uri) {
        Some(scheme) => scheme != FILE_SCHEME,
        None => {
            debug!("No scheme in reference {}, treating as local", uri);
            false
        }
    }
}

/// True when `uri` uses the `file` scheme.
///
/// References without a scheme are reported as not local, with a warning.
pub fn is_local_reference(uri: &str) -> bool {
    match scheme(uri) {
        Some(scheme) => scheme == FILE_SCHEME,
        None => {
            warn!("No scheme in reference {}, location unknown", uri);
            false
        }
    }
}

/// Check whether the local file behind `uri` exists
pub fn local_file_exists(uri: &str) -> bool {
    Path::new(strip_scheme(uri)).exists()
}

/// Percent-encode the characters that cannot appear verbatim in cache filenames.
///
/// Returns `"(null)"` when no string is given.
pub fn encode_uri(uri: Option<&str>) -> String {
    let Some(uri) = uri else {
        return NULL_SENTINEL.to_string();
    };

    ENCODING_TABLE
        .iter()
        .fold(uri.to_string(), |acc, (raw, encoded)| acc.replace(raw, encoded))
}

/// Reverse [`encode_uri`], undoing the substitutions in the opposite order
pub fn decode_uri(uri: &str) -> String {
    ENCODING_TABLE
        .iter()
        .rev()
        .fold(uri.to_string(), |acc, (raw, encoded)| acc.replace(encoded, raw))
}
