//! Host-path / `file://` URI conversion
//!
//! Absolute paths become `file://` URIs with percent-encoded segments;
//! on Windows the drive letter follows the (empty) authority as `/C:/…`.
//! Both directions are exposed so callers can reason about
//! server-reported URIs without re-deriving the rules themselves.

use lsp_support::Error;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use url::Url;

/// Convert our internal `url::Url` to the `lsp_types::Uri` the wire
/// protocol types require.
pub fn to_lsp_uri(uri: &Url) -> Result<lsp_types::Uri, Error> {
    lsp_types::Uri::from_str(uri.as_str()).map_err(|e| Error::InvalidConfig {
        field: "uri".into(),
        reason: format!("cannot convert {uri} to an LSP URI: {e}"),
    })
}

/// Convert an absolute host path to a `file://` URI.
pub fn path_to_uri(path: &Path) -> Result<Url, Error> {
    if !path.is_absolute() {
        return Err(Error::InvalidConfig {
            field: "path".into(),
            reason: format!("{} is not absolute", path.display()),
        });
    }
    Url::from_file_path(path)
        .map_err(|()| Error::InvalidConfig {
            field: "path".into(),
            reason: format!("cannot convert {} to a file URI", path.display()),
        })
}

/// Convert a `file://` URI back to a host path.
pub fn uri_to_path(uri: &Url) -> Result<PathBuf, Error> {
    if uri.scheme() != "file" {
        return Err(Error::InvalidConfig {
            field: "uri".into(),
            reason: format!("{uri} is not a file:// URI"),
        });
    }
    uri.to_file_path()
        .map_err(|()| Error::InvalidConfig {
            field: "uri".into(),
            reason: format!("cannot convert {uri} to a path"),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[cfg(unix)]
    #[test]
    fn round_trip_absolute_unix_path() {
        let path = PathBuf::from("/abs/a.py");
        let uri = path_to_uri(&path).unwrap();
        assert_eq!(uri.scheme(), "file");
        let back = uri_to_path(&uri).unwrap();
        assert_eq!(back, path);
    }

    #[test]
    fn relative_path_is_rejected() {
        let err = path_to_uri(Path::new("rel/a.py")).unwrap_err();
        assert!(matches!(err, Error::InvalidConfig { .. }));
    }

    #[test]
    fn non_file_scheme_is_rejected() {
        let uri = Url::parse("https://example.com/a.py").unwrap();
        let err = uri_to_path(&uri).unwrap_err();
        assert!(matches!(err, Error::InvalidConfig { .. }));
    }
}
