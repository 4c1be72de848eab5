//! Tenant bearer tokens: `<login>.<expiry>.<hex hmac-sha256>`.

use chrono::Utc;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use streamctl_common::{Error, Result};

type HmacSha256 = Hmac<Sha256>;

/// Issues and verifies tenant tokens with a shared secret.
#[derive(Clone)]
pub struct TokenSigner {
    secret: Vec<u8>,
}

impl std::fmt::Debug for TokenSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenSigner").finish_non_exhaustive()
    }
}

impl TokenSigner {
    pub fn new(secret: &str) -> Self {
        Self {
            secret: secret.as_bytes().to_vec(),
        }
    }

    fn mac(&self, login: &str, expiry: i64) -> Result<HmacSha256> {
        let mut mac = HmacSha256::new_from_slice(&self.secret)
            .map_err(|e| Error::Internal(format!("invalid token secret: {e}")))?;
        mac.update(format!("{login}.{expiry}").as_bytes());
        Ok(mac)
    }

    /// Token for `login` valid for `ttl_secs` from now.
    pub fn issue(&self, login: &str, ttl_secs: u64) -> Result<String> {
        let ttl = i64::try_from(ttl_secs).unwrap_or(i64::MAX);
        self.issue_until(login, Utc::now().timestamp().saturating_add(ttl))
    }

    /// Token for `login` expiring at the unix timestamp `expiry`.
    pub fn issue_until(&self, login: &str, expiry: i64) -> Result<String> {
        if login.is_empty() || login.contains('.') {
            return Err(Error::Validation(format!("login '{login}' cannot be signed")));
        }
        let sig = self.mac(login, expiry)?.finalize().into_bytes();
        Ok(format!("{login}.{expiry}.{}", hex::encode(sig)))
    }

    /// Login carried by a valid, unexpired token.
    pub fn verify(&self, token: &str) -> Result<String> {
        self.verify_at(token, Utc::now().timestamp())
    }

    pub fn verify_at(&self, token: &str, now: i64) -> Result<String> {
        let invalid = || Error::Unauthorized("invalid token".into());

        let mut parts = token.splitn(3, '.');
        let (Some(login), Some(expiry), Some(sig)) = (parts.next(), parts.next(), parts.next())
        else {
            return Err(invalid());
        };
        let expiry: i64 = expiry.parse().map_err(|_| invalid())?;
        let sig = hex::decode(sig).map_err(|_| invalid())?;

        self.mac(login, expiry)?
            .verify_slice(&sig)
            .map_err(|_| invalid())?;

        if expiry < now {
            return Err(Error::Unauthorized("token expired".into()));
        }
        Ok(login.to_string())
    }
}
