//! Playback URL -> file path handed to the access core.

/// URL schemes this host routes to the CCNx access core.
pub const SCHEMES: [&str; 2] = ["ccnx1.0", "ccn1.0"];

#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum LocationError {
    #[error("unsupported scheme: {0}")]
    Scheme(String),
    #[error("empty location")]
    Empty,
}

/// Strip a `ccnx1.0://` or `ccn1.0://` scheme. Bare paths pass through unchanged.
pub fn parse(url: &str) -> Result<String, LocationError> {
    let path = match url.split_once("://") {
        Some((scheme, rest)) => {
            if !SCHEMES.iter().any(|s| s.eq_ignore_ascii_case(scheme)) {
                return Err(LocationError::Scheme(scheme.to_string()));
            }
            rest
        }
        None => url,
    };
    if path.split('/').all(|c| c.is_empty()) {
        return Err(LocationError::Empty);
    }
    Ok(path.to_string())
}
