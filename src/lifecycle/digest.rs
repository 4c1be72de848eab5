//! HTTP digest authentication (RFC 2617, MD5 with optional `qop=auth`).

use md5::{Digest, Md5};
use rand::Rng;

/// Parameters from a `WWW-Authenticate: Digest ...` challenge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DigestChallenge {
    pub realm: String,
    pub nonce: String,
    pub opaque: Option<String>,
    /// Whether the server offered `qop=auth`.
    pub qop_auth: bool,
}

impl DigestChallenge {
    /// Parse a challenge header value. Returns `None` for other schemes or
    /// when `realm` or `nonce` is missing.
    pub fn parse(header: &str) -> Option<Self> {
        let (scheme, params) = header.trim().split_once(char::is_whitespace)?;
        if !scheme.eq_ignore_ascii_case("digest") {
            return None;
        }

        let mut realm = None;
        let mut nonce = None;
        let mut opaque = None;
        let mut qop_auth = false;

        for (key, value) in split_params(params) {
            match key.to_ascii_lowercase().as_str() {
                "realm" => realm = Some(value),
                "nonce" => nonce = Some(value),
                "opaque" => opaque = Some(value),
                "qop" => {
                    qop_auth = value
                        .split(',')
                        .any(|q| q.trim().eq_ignore_ascii_case("auth"))
                }
                "algorithm" if !value.eq_ignore_ascii_case("md5") => {
                    tracing::debug!(algorithm = %value, "Unsupported digest algorithm, trying MD5");
                }
                _ => {}
            }
        }

        Some(Self {
            realm: realm?,
            nonce: nonce?,
            opaque,
            qop_auth,
        })
    }

    /// Build the `Authorization` header value for one request.
    pub fn authorization(&self, username: &str, password: &str, method: &str, uri: &str) -> String {
        let cnonce = format!("{:016x}", rand::thread_rng().gen::<u64>());
        self.authorization_with_cnonce(username, password, method, uri, &cnonce)
    }

    fn authorization_with_cnonce(
        &self,
        username: &str,
        password: &str,
        method: &str,
        uri: &str,
        cnonce: &str,
    ) -> String {
        const NC: &str = "00000001";
        let ha1 = md5_hex(&format!("{username}:{}:{password}", self.realm));
        let ha2 = md5_hex(&format!("{method}:{uri}"));
        let response = if self.qop_auth {
            md5_hex(&format!("{ha1}:{}:{NC}:{cnonce}:auth:{ha2}", self.nonce))
        } else {
            md5_hex(&format!("{ha1}:{}:{ha2}", self.nonce))
        };

        let mut header = format!(
            "Digest username=\"{username}\", realm=\"{}\", nonce=\"{}\", uri=\"{uri}\", \
             algorithm=MD5, response=\"{response}\"",
            self.realm, self.nonce
        );
        if let Some(opaque) = &self.opaque {
            header.push_str(&format!(", opaque=\"{opaque}\""));
        }
        if self.qop_auth {
            header.push_str(&format!(", qop=auth, nc={NC}, cnonce=\"{cnonce}\""));
        }
        header
    }
}

fn md5_hex(input: &str) -> String {
    format!("{:x}", Md5::digest(input.as_bytes()))
}

/// Split `key=value, key="quoted, value"` pairs.
fn split_params(params: &str) -> Vec<(String, String)> {
    let mut out = Vec::new();
    let mut rest = params.trim();

    while !rest.is_empty() {
        let Some(eq) = rest.find('=') else { break };
        let key = rest[..eq].trim().trim_start_matches(',').trim().to_string();
        rest = rest[eq + 1..].trim_start();

        let value = if let Some(quoted) = rest.strip_prefix('"') {
            let end = quoted.find('"').unwrap_or(quoted.len());
            let value = quoted[..end].to_string();
            rest = quoted.get(end + 1..).unwrap_or("");
            value
        } else {
            let end = rest.find(',').unwrap_or(rest.len());
            let value = rest[..end].trim().to_string();
            rest = &rest[end..];
            value
        };

        rest = rest.trim_start().trim_start_matches(',').trim_start();
        if !key.is_empty() {
            out.push((key, value));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_quoted_params_with_commas() {
        let c = DigestChallenge::parse(
            r#"Digest realm="engine", qop="auth,auth-int", nonce="abc123", opaque="xyz""#,
        )
        .unwrap();
        assert_eq!(c.realm, "engine");
        assert_eq!(c.nonce, "abc123");
        assert_eq!(c.opaque.as_deref(), Some("xyz"));
        assert!(c.qop_auth);
    }

    #[test]
    fn rejects_basic_and_incomplete_challenges() {
        assert!(DigestChallenge::parse(r#"Basic realm="x""#).is_none());
        assert!(DigestChallenge::parse(r#"Digest realm="x""#).is_none());
    }

    #[test]
    fn rfc2617_example_response() {
        // Worked example from RFC 2617 section 3.5.
        let c = DigestChallenge {
            realm: "testrealm@host.com".into(),
            nonce: "dcd98b7102dd2f0e8b11d0f600bfb0c093".into(),
            opaque: Some("5ccc069c403ebaf9f0171e9517f40e41".into()),
            qop_auth: true,
        };
        let header = c.authorization_with_cnonce(
            "Mufasa",
            "Circle Of Life",
            "GET",
            "/dir/index.html",
            "0a4f113b",
        );
        assert!(header.contains("response=\"6629fae49393a05397450978507c4ef1\""));
        assert!(header.contains("qop=auth, nc=00000001, cnonce=\"0a4f113b\""));
    }

    #[test]
    fn legacy_response_without_qop() {
        let c = DigestChallenge {
            realm: "r".into(),
            nonce: "n".into(),
            opaque: None,
            qop_auth: false,
        };
        let header = c.authorization("u", "p", "GET", "/x");
        let ha1 = md5_hex("u:r:p");
        let ha2 = md5_hex("GET:/x");
        let expected = md5_hex(&format!("{ha1}:n:{ha2}"));
        assert!(header.contains(&format!("response=\"{expected}\"")));
        assert!(!header.contains("qop="));
    }
}
