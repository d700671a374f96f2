//! Turns a request's network origin into the key used by the poster ledger.
//!
//! Without a configured secret the identity is the textual client address.
//! With one, it is a hex-encoded Argon2id hash of the 16-byte address salted
//! with the secret, so the ledger never stores a reversible address.

use std::net::{IpAddr, SocketAddr};

use actix_web::HttpRequest;
use argon2::{Algorithm, Argon2, Params, Version};
use secrecy::{ExposeSecret, SecretString};
use tracing::warn;

use crate::config::{BoardConfig, IdentityHashParams};
use crate::error::{BoardError, Result};

/// Argon2 refuses salts shorter than this.
pub const MIN_SECRET_LEN: usize = 8;

pub const FORWARDED_FOR: &str = "X-Forwarded-For";

pub struct IdentityDeriver {
    mode: Mode,
}

enum Mode {
    Raw,
    Anonymized { hasher: Argon2<'static>, secret: SecretString, output_len: usize },
}

impl IdentityDeriver {
    pub fn raw() -> Self {
        Self { mode: Mode::Raw }
    }

    pub fn anonymized(secret: SecretString, params: IdentityHashParams) -> Result<Self> {
        if secret.expose_secret().len() < MIN_SECRET_LEN {
            return Err(BoardError::invalid(format!("identity secret shorter than {MIN_SECRET_LEN} bytes")));
        }
        let argon_params = Params::new(params.memory_cost, params.time_cost, params.parallelism, Some(params.output_len))
            .map_err(|e| BoardError::invalid(format!("identity hash parameters: {e}")))?;
        Ok(Self {
            mode: Mode::Anonymized {
                hasher: Argon2::new(Algorithm::Argon2id, Version::V0x13, argon_params),
                secret,
                output_len: params.output_len,
            },
        })
    }

    pub fn from_config(cfg: &BoardConfig) -> Result<Self> {
        match &cfg.identity_secret {
            Some(secret) => {
                Self::anonymized(SecretString::from(secret.expose_secret().to_string()), cfg.identity_hash)
            }
            None => Ok(Self::raw()),
        }
    }

    pub fn is_anonymized(&self) -> bool {
        matches!(self.mode, Mode::Anonymized { .. })
    }

    /// Resolves the client address. The forwarded-for header is only honoured
    /// when the peer itself is loopback, i.e. a local reverse proxy.
    pub fn client_addr(peer: IpAddr, forwarded_for: Option<&str>) -> IpAddr {
        let peer = peer.to_canonical();
        if !peer.is_loopback() {
            return peer;
        }
        let Some(header) = forwarded_for else { return peer };
        let first = header.split(',').next().unwrap_or_default().trim();
        match parse_addr(first) {
            Some(addr) => addr.to_canonical(),
            None => {
                warn!(header = %header, "unparsable forwarded-for header, using peer address");
                peer
            }
        }
    }

    pub fn derive(&self, peer: IpAddr, forwarded_for: Option<&str>) -> Result<String> {
        self.identity_of(Self::client_addr(peer, forwarded_for))
    }

    pub fn identity_of(&self, addr: IpAddr) -> Result<String> {
        match &self.mode {
            Mode::Raw => Ok(addr.to_string()),
            Mode::Anonymized { hasher, secret, output_len } => {
                let octets = match addr {
                    IpAddr::V4(v4) => v4.to_ipv6_mapped().octets(),
                    IpAddr::V6(v6) => v6.octets(),
                };
                let mut out = vec![0u8; *output_len];
                hasher
                    .hash_password_into(&octets, secret.expose_secret().as_bytes(), &mut out)
                    .map_err(BoardError::Hash)?;
                Ok(hex::encode(out))
            }
        }
    }

    pub fn derive_request(&self, req: &HttpRequest) -> Result<String> {
        let peer = req.peer_addr().ok_or_else(|| BoardError::invalid("request without peer address"))?;
        let forwarded = req.headers().get(FORWARDED_FOR).and_then(|v| v.to_str().ok());
        self.derive(peer.ip(), forwarded)
    }
}

fn parse_addr(raw: &str) -> Option<IpAddr> {
    raw.parse::<IpAddr>()
        .ok()
        .or_else(|| raw.parse::<SocketAddr>().ok().map(|s| s.ip()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn forwarded_header_needs_loopback_peer() {
        let local: IpAddr = "127.0.0.1".parse().unwrap();
        let remote: IpAddr = "198.51.100.7".parse().unwrap();
        let hdr = Some("203.0.113.5, 10.0.0.1");

        assert_eq!(IdentityDeriver::client_addr(local, hdr), "203.0.113.5".parse::<IpAddr>().unwrap());
        assert_eq!(IdentityDeriver::client_addr(remote, hdr), remote);
        assert_eq!(IdentityDeriver::client_addr(local, Some("garbage")), local);
        assert_eq!(
            IdentityDeriver::client_addr(local, Some("[2001:db8::1]:443")),
            "2001:db8::1".parse::<IpAddr>().unwrap()
        );
    }

    #[test]
    fn mapped_v4_peer_is_canonicalised() {
        let mapped: IpAddr = "::ffff:192.0.2.1".parse().unwrap();
        let id = IdentityDeriver::raw().derive(mapped, None).unwrap();
        assert_eq!(id, "192.0.2.1");
    }
}
