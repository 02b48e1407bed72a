//! `Authorization` header values for Basic and Digest schemes.
//!
//! Digest follows RFC 7616 (MD5 and SHA-256, `qop=auth` and `auth-int`),
//! falling back to the RFC 2069 form when the challenge carries no qop.

use std::collections::HashMap;
use std::sync::OnceLock;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use rand::distributions::Alphanumeric;
use rand::Rng;
use regex::Regex;
use sha2::{Digest, Sha256};

use crate::http::types::Method;

/// `Basic <base64(user:pass)>`
pub fn basic_authorization(username: &str, password: &str) -> String {
    format!("Basic {}", STANDARD.encode(format!("{}:{}", username, password)))
}

/// Hash function named by a challenge's `algorithm`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DigestAlgorithm {
    Md5,
    Sha256,
}

impl DigestAlgorithm {
    fn from_token(token: &str) -> Option<Self> {
        match token.to_ascii_uppercase().as_str() {
            "MD5" => Some(DigestAlgorithm::Md5),
            "SHA-256" => Some(DigestAlgorithm::Sha256),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DigestAlgorithm::Md5 => "MD5",
            DigestAlgorithm::Sha256 => "SHA-256",
        }
    }

    fn hex(&self, data: &[u8]) -> String {
        match self {
            DigestAlgorithm::Md5 => format!("{:x}", md5::compute(data)),
            DigestAlgorithm::Sha256 => Sha256::digest(data).iter().map(|b| format!("{:02x}", b)).collect(),
        }
    }
}

/// Parameters of a `WWW-Authenticate: Digest ...` (or `Proxy-Authenticate`) challenge.
#[derive(Debug, Clone)]
pub struct DigestChallenge {
    pub realm: String,
    pub nonce: String,
    pub opaque: Option<String>,
    pub algorithm: DigestAlgorithm,
    /// Offered qop options, e.g. `["auth", "auth-int"]`.
    pub qop: Vec<String>,
}

fn param_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r#"(\w+)=(?:"([^"]*)"|([^,\s]*))"#).unwrap_or_else(|e| unreachable!("static pattern: {e}"))
    })
}

impl DigestChallenge {
    /// Parse a challenge header value. `None` for non-digest schemes,
    /// unsupported algorithms, or a challenge missing realm/nonce.
    pub fn parse(value: &str) -> Option<Self> {
        let value = value.trim();
        let (scheme, rest) = value.split_once(char::is_whitespace)?;
        if !scheme.eq_ignore_ascii_case("digest") {
            return None;
        }

        let params: HashMap<String, String> = param_pattern()
            .captures_iter(rest)
            .filter_map(|c| {
                let key = c.get(1)?.as_str().to_ascii_lowercase();
                let val = c.get(2).or_else(|| c.get(3))?.as_str().to_string();
                Some((key, val))
            })
            .collect();

        let algorithm = match params.get("algorithm") {
            Some(a) => DigestAlgorithm::from_token(a)?,
            None => DigestAlgorithm::Md5,
        };
        Some(Self {
            realm: params.get("realm")?.clone(),
            nonce: params.get("nonce")?.clone(),
            opaque: params.get("opaque").cloned(),
            algorithm,
            qop: params
                .get("qop")
                .map(|q| q.split(',').map(|s| s.trim().to_string()).filter(|s| !s.is_empty()).collect())
                .unwrap_or_default(),
        })
    }

    /// Prefer `auth`, then `auth-int`; `None` when the server offered neither.
    fn chosen_qop(&self) -> Option<&'static str> {
        if self.qop.iter().any(|q| q == "auth") {
            Some("auth")
        } else if self.qop.iter().any(|q| q == "auth-int") {
            Some("auth-int")
        } else {
            None
        }
    }
}

/// Random client nonce.
pub fn random_cnonce() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(16)
        .map(char::from)
        .collect()
}

/// Credentials plus per-request inputs for one digest response.
#[derive(Debug, Clone, Copy)]
pub struct DigestInput<'a> {
    pub username: &'a str,
    pub password: &'a str,
    pub method: &'a Method,
    pub uri: &'a str,
    /// Nonce count, sent as eight hex digits.
    pub nc: u32,
    pub cnonce: &'a str,
    /// Request body, hashed only for `qop=auth-int`.
    pub body: &'a [u8],
}

/// Build the `Digest ...` header value answering `challenge`.
pub fn digest_authorization(challenge: &DigestChallenge, input: &DigestInput<'_>) -> String {
    let algo = challenge.algorithm;
    let qop = challenge.chosen_qop();
    let nc = format!("{:08x}", input.nc);

    let ha1 = algo.hex(format!("{}:{}:{}", input.username, challenge.realm, input.password).as_bytes());
    let ha2 = match qop {
        Some("auth-int") => algo.hex(
            format!("{}:{}:{}", input.method, input.uri, algo.hex(input.body)).as_bytes(),
        ),
        _ => algo.hex(format!("{}:{}", input.method, input.uri).as_bytes()),
    };
    let response = match qop {
        Some(q) => algo.hex(format!("{}:{}:{}:{}:{}:{}", ha1, challenge.nonce, nc, input.cnonce, q, ha2).as_bytes()),
        None => algo.hex(format!("{}:{}:{}", ha1, challenge.nonce, ha2).as_bytes()),
    };

    let mut header = format!(
        "Digest username=\"{}\", realm=\"{}\", nonce=\"{}\", uri=\"{}\", algorithm={}",
        input.username,
        challenge.realm,
        challenge.nonce,
        input.uri,
        algo.as_str()
    );
    if let Some(q) = qop {
        header.push_str(&format!(", qop={}, nc={}, cnonce=\"{}\"", q, nc, input.cnonce));
    }
    header.push_str(&format!(", response=\"{}\"", response));
    if let Some(opaque) = &challenge.opaque {
        header.push_str(&format!(", opaque=\"{}\"", opaque));
    }
    header
}

#[cfg(test)]
mod tests {
    use super::*;

    const RFC2617_CHALLENGE: &str = r#"Digest realm="testrealm@host.com", qop="auth,auth-int", nonce="dcd98b7102dd2f0e8b11d0f600bfb0c093", opaque="5ccc069c403ebaf9f0171e9517f40e41""#;

    #[test]
    fn basic_encodes_credentials() {
        assert_eq!(basic_authorization("Aladdin", "open sesame"), "Basic QWxhZGRpbjpvcGVuIHNlc2FtZQ==");
    }

    #[test]
    fn parses_quoted_and_bare_params() {
        let ch = DigestChallenge::parse(RFC2617_CHALLENGE).unwrap();
        assert_eq!(ch.realm, "testrealm@host.com");
        assert_eq!(ch.nonce, "dcd98b7102dd2f0e8b11d0f600bfb0c093");
        assert_eq!(ch.opaque.as_deref(), Some("5ccc069c403ebaf9f0171e9517f40e41"));
        assert_eq!(ch.qop, vec!["auth", "auth-int"]);
        assert_eq!(ch.algorithm, DigestAlgorithm::Md5);

        let sha = DigestChallenge::parse(r#"Digest realm="r", nonce="n", algorithm=SHA-256"#).unwrap();
        assert_eq!(sha.algorithm, DigestAlgorithm::Sha256);
    }

    #[test]
    fn rejects_other_schemes_and_incomplete_challenges() {
        assert!(DigestChallenge::parse(r#"Basic realm="x""#).is_none());
        assert!(DigestChallenge::parse(r#"Digest realm="x""#).is_none());
        assert!(DigestChallenge::parse(r#"Digest realm="x", nonce="y", algorithm=SHA-512-256"#).is_none());
    }

    #[test]
    fn md5_auth_matches_rfc2617_example() {
        let ch = DigestChallenge::parse(RFC2617_CHALLENGE).unwrap();
        let header = digest_authorization(
            &ch,
            &DigestInput {
                username: "Mufasa",
                password: "Circle Of Life",
                method: &Method::Get,
                uri: "/dir/index.html",
                nc: 1,
                cnonce: "0a4f113b",
                body: b"",
            },
        );
        assert!(header.contains("response=\"6629fae49393a05397450978507c4ef1\""), "{}", header);
        assert!(header.contains("qop=auth, nc=00000001, cnonce=\"0a4f113b\""));
        assert!(header.ends_with("opaque=\"5ccc069c403ebaf9f0171e9517f40e41\""));
    }

    #[test]
    fn challenge_without_qop_uses_legacy_form() {
        let ch = DigestChallenge::parse(r#"Digest realm="r", nonce="n""#).unwrap();
        let header = digest_authorization(
            &ch,
            &DigestInput {
                username: "u",
                password: "p",
                method: &Method::Get,
                uri: "/",
                nc: 1,
                cnonce: "c",
                body: b"",
            },
        );
        assert!(!header.contains("qop="));
        let ha1 = format!("{:x}", md5::compute("u:r:p"));
        let ha2 = format!("{:x}", md5::compute("GET:/"));
        let expected = format!("{:x}", md5::compute(format!("{}:n:{}", ha1, ha2)));
        assert!(header.contains(&expected));
    }

    #[test]
    fn cnonce_is_random_alphanumeric() {
        let a = random_cnonce();
        assert_eq!(a.len(), 16);
        assert!(a.chars().all(|c| c.is_ascii_alphanumeric()));
        assert_ne!(a, random_cnonce());
    }
}
