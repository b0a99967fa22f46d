use core::fmt;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use log::{debug, warn};

use crate::{
    env::{RandomSource, ThreadRandom},
    hash::{hex8, hex_encode, md5_hex, Hex8, Md5Hex},
    Result, SipError,
};

/// Parameters of a `WWW-Authenticate` / `Proxy-Authenticate` challenge.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AuthChallenge {
    pub realm: String,
    pub nonce: String,
    pub qop: Option<String>,
    pub opaque: Option<String>,
    pub algorithm: Option<String>,
}

#[derive(Clone, PartialEq, Eq)]
pub struct AuthCredentials {
    pub username: String,
    pub password: String,
}

impl AuthCredentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for AuthCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthCredentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DigestResponse {
    pub uri: String,
    pub username: String,
    pub response: Md5Hex,
    /// Only with `qop=auth`.
    pub nc: Option<Hex8>,
    /// Only with `qop=auth`.
    pub cnonce: Option<String>,
}

/// Computes digest responses and owns the `nc` counter shared by every
/// `qop=auth` answer it produces.
pub struct DigestAuthenticator {
    nonce_count: AtomicU32,
    random: Arc<dyn RandomSource>,
}

impl Default for DigestAuthenticator {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for DigestAuthenticator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DigestAuthenticator")
            .field("nonce_count", &self.nonce_count())
            .finish_non_exhaustive()
    }
}

impl DigestAuthenticator {
    pub fn new() -> Self {
        Self::with_random(Arc::new(ThreadRandom))
    }

    pub fn with_random(random: Arc<dyn RandomSource>) -> Self {
        Self {
            nonce_count: AtomicU32::new(0),
            random,
        }
    }

    /// Last `nc` value handed out; 0 before the first `qop=auth` answer.
    pub fn nonce_count(&self) -> u32 {
        self.nonce_count.load(Ordering::SeqCst)
    }

    pub fn compute_digest(
        &self,
        creds: &AuthCredentials,
        challenge: &AuthChallenge,
        method: &str,
        uri: &str,
        client_nonce: Option<&str>,
    ) -> Result<DigestResponse> {
        let realm = strip_quotes(&challenge.realm);
        if realm.is_empty() {
            warn!("digest challenge without realm");
            return Err(SipError::MalformedChallenge("realm"));
        }
        let nonce = strip_quotes(&challenge.nonce);
        if nonce.is_empty() {
            warn!("digest challenge without nonce");
            return Err(SipError::MalformedChallenge("nonce"));
        }

        let ha1 = md5_hex(format!("{}:{}:{}", creds.username, realm, creds.password).as_bytes());
        let ha2 = md5_hex(format!("{}:{}", method, uri).as_bytes());

        let qop = challenge
            .qop
            .as_deref()
            .map(strip_quotes)
            .unwrap_or_default();

        if qop.is_empty() {
            debug!("digest for realm {} without qop", realm);
            let response = md5_hex(format!("{}:{}:{}", ha1, nonce, ha2).as_bytes());
            return Ok(DigestResponse {
                uri: uri.to_owned(),
                username: creds.username.clone(),
                response,
                nc: None,
                cnonce: None,
            });
        }

        if qop != "auth" {
            warn!("rejecting digest challenge with qop {:?}", qop);
            return Err(SipError::UnsupportedQop(qop));
        }

        let nc = hex8(self.next_nonce_count());
        let cnonce = match client_nonce {
            Some(c) => c.to_owned(),
            None => self.generate_cnonce(),
        };
        debug!("digest for realm {} with qop=auth nc={}", realm, nc);

        let response = md5_hex(
            format!("{}:{}:{}:{}:auth:{}", ha1, nonce, nc, cnonce, ha2).as_bytes(),
        );

        Ok(DigestResponse {
            uri: uri.to_owned(),
            username: creds.username.clone(),
            response,
            nc: Some(nc),
            cnonce: Some(cnonce),
        })
    }

    fn next_nonce_count(&self) -> u32 {
        self.nonce_count.fetch_add(1, Ordering::SeqCst).wrapping_add(1)
    }

    fn generate_cnonce(&self) -> String {
        let mut bytes = [0u8; 8];
        self.random.fill_bytes(&mut bytes);
        hex_encode(&bytes)
    }
}

/// Removes every `"`, not only the surrounding pair.
pub fn strip_quotes(value: &str) -> String {
    value.replace('"', "")
}

/// Parses the value of a `WWW-Authenticate` or `Proxy-Authenticate` header.
pub fn parse_www_authenticate(input: &str) -> Result<AuthChallenge> {
    let mut parts = input.trim().splitn(2, ' ');
    let scheme = parts.next().ok_or(SipError::Invalid("auth scheme"))?;
    if !scheme.eq_ignore_ascii_case("digest") {
        return Err(SipError::Invalid("auth scheme"));
    }
    let params = parts.next().ok_or(SipError::Invalid("auth params"))?;

    let mut challenge = AuthChallenge::default();
    let mut realm = None;
    let mut nonce = None;

    for param in split_params(params) {
        let param = param.trim();
        if param.is_empty() {
            continue;
        }
        let mut kv = param.splitn(2, '=');
        let key = kv.next().ok_or(SipError::Invalid("auth key"))?.trim();
        let val = kv
            .next()
            .ok_or(SipError::Invalid("auth value"))?
            .trim()
            .trim_matches('"')
            .to_owned();
        match key.to_ascii_lowercase().as_str() {
            "realm" => realm = Some(val),
            "nonce" => nonce = Some(val),
            "qop" => challenge.qop = Some(val),
            "opaque" => challenge.opaque = Some(val),
            "algorithm" => challenge.algorithm = Some(val),
            _ => {}
        }
    }

    challenge.realm = realm.ok_or(SipError::MalformedChallenge("realm"))?;
    challenge.nonce = nonce.ok_or(SipError::MalformedChallenge("nonce"))?;
    Ok(challenge)
}

// Splits on commas outside quoted strings.
fn split_params(input: &str) -> Vec<&str> {
    let mut out = Vec::new();
    let mut in_quotes = false;
    let mut start = 0;
    for (i, c) in input.char_indices() {
        match c {
            '"' => in_quotes = !in_quotes,
            ',' if !in_quotes => {
                out.push(&input[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    out.push(&input[start..]);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    struct PatternRandom;

    impl RandomSource for PatternRandom {
        fn fill_bytes(&self, dest: &mut [u8]) {
            dest.fill(0xa5);
        }
    }

    fn asterisk_challenge() -> AuthChallenge {
        AuthChallenge {
            realm: "asterisk".into(),
            nonce: "1585558405/882990811414b00b05f596211615f58c".into(),
            qop: Some("auth".into()),
            opaque: Some("66706dec78339972".into()),
            algorithm: None,
        }
    }

    fn asterisk_creds() -> AuthCredentials {
        AuthCredentials::new("+4915758093134", "pHZD3uHt%tw$DV7L")
    }

    const CNONCE: &str = "L-Q3J80qGDu3n-ZZx1I.8nqvRsJvbIlg";
    const URI: &str = "sip:i4hearth.hopto.org:5061";

    #[test]
    fn digest_without_qop_matches_rfc2617_reference() {
        let challenge = parse_www_authenticate(
            r#"Digest realm="testrealm@host.com", nonce="dcd98b7102dd2f0e8b11d0f600bfb0c093", algorithm=MD5"#,
        )
        .unwrap();
        let creds = AuthCredentials::new("Mufasa", "Circle Of Life");
        let auth = DigestAuthenticator::new();
        let digest = auth
            .compute_digest(&creds, &challenge, "GET", "/dir/index.html", None)
            .unwrap();
        assert_eq!(digest.response.as_str(), "670fd8c2df070c60b045671b8b24ff02");
        assert!(digest.nc.is_none());
        assert!(digest.cnonce.is_none());
        assert_eq!(auth.nonce_count(), 0);
    }

    #[test]
    fn digest_without_qop_is_md5_of_ha1_nonce_ha2() {
        let mut challenge = asterisk_challenge();
        challenge.qop = None;
        let digest = DigestAuthenticator::new()
            .compute_digest(&asterisk_creds(), &challenge, "REGISTER", URI, None)
            .unwrap();
        let ha1 = md5_hex(b"+4915758093134:asterisk:pHZD3uHt%tw$DV7L");
        let ha2 = md5_hex(b"REGISTER:sip:i4hearth.hopto.org:5061");
        let expected = md5_hex(
            format!("{}:1585558405/882990811414b00b05f596211615f58c:{}", ha1, ha2).as_bytes(),
        );
        assert_eq!(digest.response, expected);
        assert_eq!(digest.response.as_str(), "0114a370664b34f384fb05dcc373399b");
    }

    #[test]
    fn qop_auth_matches_asterisk_vector() {
        let auth = DigestAuthenticator::new();
        let digest = auth
            .compute_digest(
                &asterisk_creds(),
                &asterisk_challenge(),
                "REGISTER",
                URI,
                Some(CNONCE),
            )
            .unwrap();
        assert_eq!(digest.response.as_str(), "08937ec91dfed2d6a1c969269990cd38");
        assert_eq!(digest.nc.as_deref(), Some("00000001"));
        assert_eq!(digest.cnonce.as_deref(), Some(CNONCE));
        assert_eq!(digest.uri, URI);
        assert_eq!(digest.username, "+4915758093134");
    }

    #[test]
    fn quotes_are_stripped_everywhere() {
        let challenge = AuthChallenge {
            realm: "\"aste\"risk\"".into(),
            nonce: "\"1585558405/882990811414b00b05f596211615f58c\"".into(),
            qop: Some("\"auth\"".into()),
            ..AuthChallenge::default()
        };
        let digest = DigestAuthenticator::new()
            .compute_digest(&asterisk_creds(), &challenge, "REGISTER", URI, Some(CNONCE))
            .unwrap();
        assert_eq!(digest.response.as_str(), "08937ec91dfed2d6a1c969269990cd38");
    }

    #[test]
    fn nonce_count_advances_once_per_qop_auth_answer() {
        let auth = DigestAuthenticator::new();
        let creds = asterisk_creds();
        let challenge = asterisk_challenge();

        let first = auth
            .compute_digest(&creds, &challenge, "REGISTER", URI, Some(CNONCE))
            .unwrap();
        let second = auth
            .compute_digest(&creds, &challenge, "REGISTER", URI, Some(CNONCE))
            .unwrap();
        assert_eq!(first.nc.as_deref(), Some("00000001"));
        assert_eq!(second.nc.as_deref(), Some("00000002"));
        assert_eq!(second.response.as_str(), "d7ed300d2da36dd289085b82d9455573");

        // Neither qop-less answers nor failures touch the counter.
        let mut plain = challenge.clone();
        plain.qop = Some(String::new());
        auth.compute_digest(&creds, &plain, "REGISTER", URI, None).unwrap();
        let mut bad = challenge.clone();
        bad.qop = Some("auth-int".into());
        assert!(auth.compute_digest(&creds, &bad, "REGISTER", URI, None).is_err());
        assert_eq!(auth.nonce_count(), 2);

        // Counters are per instance.
        let other = DigestAuthenticator::new();
        let third = other
            .compute_digest(&creds, &challenge, "REGISTER", URI, Some(CNONCE))
            .unwrap();
        assert_eq!(third.nc.as_deref(), Some("00000001"));
    }

    #[test]
    fn nonce_count_is_unique_across_threads() {
        let auth = DigestAuthenticator::new();
        let creds = asterisk_creds();
        let challenge = asterisk_challenge();

        let mut seen: Vec<String> = std::thread::scope(|s| {
            let handles: Vec<_> = (0..4)
                .map(|_| {
                    s.spawn(|| {
                        (0..25)
                            .map(|_| {
                                auth.compute_digest(&creds, &challenge, "INVITE", URI, None)
                                    .unwrap()
                                    .nc
                                    .unwrap()
                                    .to_string()
                            })
                            .collect::<Vec<_>>()
                    })
                })
                .collect();
            handles
                .into_iter()
                .flat_map(|h| h.join().unwrap())
                .collect()
        });
        seen.sort();
        seen.dedup();
        assert_eq!(seen.len(), 100);
        assert_eq!(auth.nonce_count(), 100);
        assert_eq!(seen.last().map(String::as_str), Some("00000064"));
    }

    #[test]
    fn generated_cnonce_is_sixteen_hex_digits() {
        let auth = DigestAuthenticator::with_random(Arc::new(PatternRandom));
        let digest = auth
            .compute_digest(&asterisk_creds(), &asterisk_challenge(), "REGISTER", URI, None)
            .unwrap();
        assert_eq!(digest.cnonce.as_deref(), Some("a5a5a5a5a5a5a5a5"));
    }

    #[test]
    fn malformed_challenges_are_rejected() {
        let auth = DigestAuthenticator::new();
        let creds = asterisk_creds();

        let no_realm = AuthChallenge {
            realm: String::new(),
            nonce: "n".into(),
            ..AuthChallenge::default()
        };
        assert!(matches!(
            auth.compute_digest(&creds, &no_realm, "REGISTER", URI, None),
            Err(SipError::MalformedChallenge("realm"))
        ));

        let quoted_empty_nonce = AuthChallenge {
            realm: "r".into(),
            nonce: "\"\"".into(),
            ..AuthChallenge::default()
        };
        assert!(matches!(
            auth.compute_digest(&creds, &quoted_empty_nonce, "REGISTER", URI, None),
            Err(SipError::MalformedChallenge("nonce"))
        ));
    }

    #[test]
    fn unsupported_qop_is_rejected() {
        let challenge = AuthChallenge {
            realm: "r".into(),
            nonce: "n".into(),
            qop: Some("digest".into()),
            ..AuthChallenge::default()
        };
        let err = DigestAuthenticator::new()
            .compute_digest(&asterisk_creds(), &challenge, "REGISTER", URI, None)
            .unwrap_err();
        assert!(matches!(err, SipError::UnsupportedQop(ref q) if q == "digest"));

        // Case-sensitive.
        let upper = AuthChallenge {
            qop: Some("AUTH".into()),
            ..challenge
        };
        assert!(DigestAuthenticator::new()
            .compute_digest(&asterisk_creds(), &upper, "REGISTER", URI, None)
            .is_err());
    }

    #[test]
    fn parses_challenge_with_quoted_commas() {
        let challenge = parse_www_authenticate(
            r#"Digest realm="asterisk",nonce="1585558405/88299", opaque="66706dec", qop="auth,auth-int", algorithm=MD5"#,
        )
        .unwrap();
        assert_eq!(challenge.realm, "asterisk");
        assert_eq!(challenge.nonce, "1585558405/88299");
        assert_eq!(challenge.opaque.as_deref(), Some("66706dec"));
        assert_eq!(challenge.qop.as_deref(), Some("auth,auth-int"));
        assert_eq!(challenge.algorithm.as_deref(), Some("MD5"));
    }

    #[test]
    fn parse_rejects_other_schemes_and_missing_fields() {
        assert!(matches!(
            parse_www_authenticate("Basic realm=\"x\""),
            Err(SipError::Invalid("auth scheme"))
        ));
        assert!(matches!(
            parse_www_authenticate("Digest realm=\"x\""),
            Err(SipError::MalformedChallenge("nonce"))
        ));
    }

    #[test]
    fn credentials_debug_hides_password() {
        let shown = format!("{:?}", asterisk_creds());
        assert!(shown.contains("+4915758093134"));
        assert!(!shown.contains("pHZD3uHt"));
    }
}
