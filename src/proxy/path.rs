//! Reversible encoding of remote paths for use in URLs.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use streamctl_common::{Error, Result};

pub fn encode_path(path: &str) -> String {
    URL_SAFE_NO_PAD.encode(path.as_bytes())
}

pub fn decode_path(encoded: &str) -> Result<String> {
    let bytes = URL_SAFE_NO_PAD
        .decode(encoded.trim_end_matches('='))
        .map_err(|_| Error::Validation("malformed media path".into()))?;
    let path =
        String::from_utf8(bytes).map_err(|_| Error::Validation("malformed media path".into()))?;
    if !path.starts_with('/') || path.contains('\0') {
        return Err(Error::Validation("media path must be absolute".into()));
    }
    Ok(path)
}
