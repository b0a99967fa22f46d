use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use log::debug;

use crate::{
    auth::{strip_quotes, AuthChallenge, AuthCredentials, DigestAuthenticator},
    config::BuilderSettings,
    env::{Clock, RandomSource, SystemClock, ThreadRandom},
    message::{
        Authorization, CSeq, Contact, Header, Headers, Method, NameAddr, Request, Rport, Version,
        Via, BRANCH_MAGIC_COOKIE,
    },
    Result,
};

/// Builds REGISTER, INVITE and BYE requests.
///
/// Every build gets a new Via branch (and, for REGISTER/INVITE, a new
/// Call-ID) even when the arguments are identical, so a retry carrying
/// credentials is a new transaction.
pub struct MessageBuilder {
    settings: BuilderSettings,
    clock: Arc<dyn Clock>,
    random: Arc<dyn RandomSource>,
    sequence: AtomicU32,
}

impl Default for MessageBuilder {
    fn default() -> Self {
        Self::new(BuilderSettings::default())
    }
}

impl core::fmt::Debug for MessageBuilder {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("MessageBuilder")
            .field("settings", &self.settings)
            .field("sequence", &self.sequence.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

struct TransactionIds {
    branch: String,
    call_id: String,
}

impl MessageBuilder {
    pub fn new(settings: BuilderSettings) -> Self {
        Self {
            settings,
            clock: Arc::new(SystemClock),
            random: Arc::new(ThreadRandom),
            sequence: AtomicU32::new(0),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_random(mut self, random: Arc<dyn RandomSource>) -> Self {
        self.random = random;
        self
    }

    pub fn settings(&self) -> &BuilderSettings {
        &self.settings
    }

    /// REGISTER binding `contact` at the registrar. `expires` falls back to
    /// the configured default.
    #[allow(clippy::too_many_arguments)]
    pub fn build_register(
        &self,
        destination_uri: &str,
        host: &str,
        port: u16,
        contact: &Contact,
        user_agent: &str,
        seq: u32,
        expires: Option<u32>,
    ) -> Request {
        let ids = self.next_ids(host);
        let expires = expires.unwrap_or(self.settings.default_expires);

        let mut req = Request::new(Method::Register, destination_uri);
        req.add_header(build_via(host, port, &ids.branch));
        req.add_header(Header::MaxForwards(self.settings.max_forwards));
        req.add_header(Header::From(
            NameAddr::from_contact(contact).with_tag(self.new_tag()),
        ));
        // The registrar adds the To tag.
        req.add_header(Header::To(NameAddr::from_contact(contact)));
        req.add_header(Header::CallId(ids.call_id));
        req.add_header(cseq(seq, Method::Register));
        req.add_header(Header::UserAgent(user_agent.to_owned()));
        req.add_header(Header::Contact(vec![contact.clone()]));
        req.add_header(Header::Expires(expires));
        req.add_header(Header::Allow(self.settings.register_allow.clone()));
        req.add_header(Header::ContentLength(0));

        debug!("built REGISTER for {} branch {}", destination_uri, ids.branch);
        req
    }

    #[allow(clippy::too_many_arguments)]
    pub fn build_invite(
        &self,
        destination_uri: &str,
        host: &str,
        port: u16,
        contact: &Contact,
        user_agent: &str,
        seq: u32,
        from_tag: &str,
        sdp_payload: &str,
    ) -> Request {
        let ids = self.next_ids(host);

        let mut req = Request::new(Method::Invite, destination_uri);
        req.add_header(build_via(host, port, &ids.branch));
        req.add_header(Header::MaxForwards(self.settings.max_forwards));
        req.add_header(Header::From(
            NameAddr::uri(format!("sip:{}:{}", host, port)).with_tag(from_tag),
        ));
        // The callee adds the To tag.
        req.add_header(Header::To(NameAddr::uri(destination_uri)));
        req.add_header(Header::CallId(ids.call_id));
        req.add_header(cseq(seq, Method::Invite));
        req.add_header(Header::UserAgent(user_agent.to_owned()));
        req.add_header(Header::Contact(vec![contact.clone()]));
        req.add_header(Header::Allow(self.settings.invite_allow.clone()));
        req.add_header(Header::Supported(self.settings.invite_supported.clone()));
        req.add_header(Header::ContentType("application/sdp".into()));
        req.add_header(Header::ContentLength(sdp_payload.len()));
        req.set_body(sdp_payload);

        debug!("built INVITE for {} branch {}", destination_uri, ids.branch);
        req
    }

    /// BYE for an existing dialog; Call-ID and both tags come from that
    /// dialog.
    #[allow(clippy::too_many_arguments)]
    pub fn build_bye(
        &self,
        destination_uri: &str,
        host: &str,
        port: u16,
        contact: &Contact,
        user_agent: &str,
        seq: u32,
        call_id: &str,
        from_tag: &str,
        to_tag: &str,
    ) -> Request {
        let ids = self.next_ids(host);

        let mut req = Request::new(Method::Bye, destination_uri);
        req.add_header(build_via(host, port, &ids.branch));
        req.add_header(Header::MaxForwards(self.settings.max_forwards));
        req.add_header(Header::From(NameAddr::from_contact(contact).with_tag(from_tag)));
        req.add_header(Header::To(NameAddr::from_contact(contact).with_tag(to_tag)));
        req.add_header(Header::CallId(call_id.to_owned()));
        req.add_header(cseq(seq, Method::Bye));
        req.add_header(Header::UserAgent(user_agent.to_owned()));
        req.add_header(Header::Reason(self.settings.bye_reason.clone()));
        req.add_header(Header::ContentLength(0));

        debug!("built BYE for {} call {} branch {}", destination_uri, call_id, ids.branch);
        req
    }

    /// Answers a 401/407 challenge for `request`: returns a copy of its
    /// headers carrying an `Authorization` header. `request` is untouched.
    pub fn augment_with_authorization(
        &self,
        request: &Request,
        authenticator: &DigestAuthenticator,
        creds: &AuthCredentials,
        challenge: &AuthChallenge,
    ) -> Result<Headers> {
        let digest = authenticator.compute_digest(
            creds,
            challenge,
            request.method.as_str(),
            &request.uri,
            None,
        )?;

        let qop = challenge
            .qop
            .as_deref()
            .map(strip_quotes)
            .filter(|q| !q.is_empty());
        let authorization = Authorization {
            username: digest.username,
            realm: strip_quotes(&challenge.realm),
            nonce: strip_quotes(&challenge.nonce),
            uri: digest.uri,
            response: digest.response.to_string(),
            algorithm: challenge.algorithm.as_deref().map(strip_quotes),
            opaque: challenge.opaque.as_deref().map(strip_quotes),
            qop,
            nc: digest.nc.map(|nc| nc.to_string()),
            cnonce: digest.cnonce,
        };

        let mut headers = request.headers.clone();
        headers.set(Header::Authorization(authorization));
        Ok(headers)
    }

    fn next_ids(&self, host: &str) -> TransactionIds {
        let millis = self.clock.now_millis();
        let n = self.sequence.fetch_add(1, Ordering::Relaxed);
        TransactionIds {
            branch: format!("{}{}{:08x}", BRANCH_MAGIC_COOKIE, millis, n),
            call_id: format!("{}-{:x}@{}", millis, n, host),
        }
    }

    /// Random UUID-shaped tag.
    fn new_tag(&self) -> String {
        let mut bytes = [0u8; 16];
        self.random.fill_bytes(&mut bytes);
        uuid::Builder::from_random_bytes(bytes)
            .into_uuid()
            .to_string()
    }
}

fn build_via(host: &str, port: u16, branch: &str) -> Header {
    Header::Via(Via {
        version: Version::SIP_2_0,
        protocol: "UDP".into(),
        host: host.to_owned(),
        port,
        rport: Rport::Requested,
        branch: branch.to_owned(),
    })
}

fn cseq(seq: u32, method: Method) -> Header {
    Header::CSeq(CSeq { seq, method })
}
