use core::fmt;
use core::str::FromStr;

use crate::{Result, SipError};

/// First seven characters of every RFC 3261 branch parameter.
pub const BRANCH_MAGIC_COOKIE: &str = "z9hG4bK";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Register,
    Invite,
    Bye,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Register => "REGISTER",
            Method::Invite => "INVITE",
            Method::Bye => "BYE",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Method {
    type Err = SipError;

    fn from_str(input: &str) -> Result<Self> {
        match input {
            "REGISTER" => Ok(Method::Register),
            "INVITE" => Ok(Method::Invite),
            "BYE" => Ok(Method::Bye),
            _ => Err(SipError::Invalid("unknown method")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Version {
    pub major: u8,
    pub minor: u8,
}

impl Version {
    pub const SIP_2_0: Version = Version { major: 2, minor: 0 };
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

/// A display name and SIP URI, e.g. `sip:user@host:port`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Contact {
    pub name: String,
    pub uri: String,
}

impl Contact {
    pub fn new(name: impl Into<String>, uri: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            uri: uri.into(),
        }
    }
}

impl fmt::Display for Contact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.name.is_empty() {
            write!(f, "<{}>", self.uri)
        } else {
            write!(f, "\"{}\" <{}>", self.name, self.uri)
        }
    }
}

/// Value of a From or To header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NameAddr {
    pub name: Option<String>,
    pub uri: String,
    pub tag: Option<String>,
}

impl NameAddr {
    pub fn uri(uri: impl Into<String>) -> Self {
        Self {
            name: None,
            uri: uri.into(),
            tag: None,
        }
    }

    pub fn from_contact(contact: &Contact) -> Self {
        Self {
            name: Some(contact.name.clone()).filter(|n| !n.is_empty()),
            uri: contact.uri.clone(),
            tag: None,
        }
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = Some(tag.into());
        self
    }
}

impl fmt::Display for NameAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.name {
            Some(name) => write!(f, "\"{}\" <{}>", name, self.uri)?,
            None => write!(f, "<{}>", self.uri)?,
        }
        if let Some(tag) = &self.tag {
            write!(f, ";tag={}", tag)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Rport {
    #[default]
    Absent,
    /// Bare `;rport`, asking the server to fill in the source port.
    Requested,
    Value(u16),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Via {
    pub version: Version,
    pub protocol: String,
    pub host: String,
    pub port: u16,
    pub rport: Rport,
    pub branch: String,
}

impl fmt::Display for Via {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "SIP/{}/{} {}:{}",
            self.version, self.protocol, self.host, self.port
        )?;
        match self.rport {
            Rport::Absent => {}
            Rport::Requested => f.write_str(";rport")?,
            Rport::Value(port) => write!(f, ";rport={}", port)?,
        }
        write!(f, ";branch={}", self.branch)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CSeq {
    pub seq: u32,
    pub method: Method,
}

impl fmt::Display for CSeq {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.seq, self.method)
    }
}

/// Digest credentials answering a challenge. Values are stored unquoted;
/// `Display` applies the quoting rules.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Authorization {
    pub username: String,
    pub realm: String,
    pub nonce: String,
    pub uri: String,
    pub response: String,
    pub algorithm: Option<String>,
    pub opaque: Option<String>,
    pub qop: Option<String>,
    pub nc: Option<String>,
    pub cnonce: Option<String>,
}

impl fmt::Display for Authorization {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Digest username=\"{}\", realm=\"{}\", nonce=\"{}\", uri=\"{}\", response=\"{}\"",
            self.username, self.realm, self.nonce, self.uri, self.response
        )?;
        if let Some(algorithm) = &self.algorithm {
            write!(f, ", algorithm={}", algorithm)?;
        }
        if let Some(cnonce) = &self.cnonce {
            write!(f, ", cnonce=\"{}\"", cnonce)?;
        }
        if let Some(opaque) = &self.opaque {
            write!(f, ", opaque=\"{}\"", opaque)?;
        }
        // qop and nc are tokens, never quoted.
        if let Some(qop) = &self.qop {
            write!(f, ", qop={}", qop)?;
        }
        if let Some(nc) = &self.nc {
            write!(f, ", nc={}", nc)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Header {
    Via(Via),
    MaxForwards(u8),
    From(NameAddr),
    To(NameAddr),
    CallId(String),
    CSeq(CSeq),
    UserAgent(String),
    Contact(Vec<Contact>),
    Expires(u32),
    Allow(String),
    Supported(String),
    ContentType(String),
    ContentLength(usize),
    Reason(String),
    Authorization(Authorization),
    Extension { name: String, value: String },
}

impl Header {
    pub fn new(name: &str, value: &str) -> Self {
        Header::Extension {
            name: name.to_owned(),
            value: value.to_owned(),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Header::Via(_) => "Via",
            Header::MaxForwards(_) => "Max-Forwards",
            Header::From(_) => "From",
            Header::To(_) => "To",
            Header::CallId(_) => "Call-ID",
            Header::CSeq(_) => "CSeq",
            Header::UserAgent(_) => "User-Agent",
            Header::Contact(_) => "Contact",
            Header::Expires(_) => "Expires",
            Header::Allow(_) => "Allow",
            Header::Supported(_) => "Supported",
            Header::ContentType(_) => "Content-Type",
            Header::ContentLength(_) => "Content-Length",
            Header::Reason(_) => "Reason",
            Header::Authorization(_) => "Authorization",
            Header::Extension { name, .. } => name.as_str(),
        }
    }

    /// Wire form of the header value, without the name.
    pub fn value(&self) -> String {
        match self {
            Header::Via(via) => via.to_string(),
            Header::MaxForwards(n) => n.to_string(),
            Header::From(addr) | Header::To(addr) => addr.to_string(),
            Header::CallId(v)
            | Header::UserAgent(v)
            | Header::Allow(v)
            | Header::Supported(v)
            | Header::ContentType(v)
            | Header::Reason(v) => v.clone(),
            Header::CSeq(cseq) => cseq.to_string(),
            Header::Contact(contacts) => contacts
                .iter()
                .map(Contact::to_string)
                .collect::<Vec<_>>()
                .join(", "),
            Header::Expires(n) => n.to_string(),
            Header::ContentLength(n) => n.to_string(),
            Header::Authorization(auth) => auth.to_string(),
            Header::Extension { value, .. } => value.clone(),
        }
    }
}

impl fmt::Display for Header {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.name(), self.value())
    }
}

/// Ordered header set. At most one header per (case-insensitive) name.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Headers(Vec<Header>);

impl Headers {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    /// Inserts `header`, replacing in place any header with the same name.
    pub fn set(&mut self, header: Header) {
        match self
            .0
            .iter_mut()
            .find(|h| h.name().eq_ignore_ascii_case(header.name()))
        {
            Some(slot) => *slot = header,
            None => self.0.push(header),
        }
    }

    pub fn get(&self, name: &str) -> Option<&Header> {
        self.0.iter().find(|h| h.name().eq_ignore_ascii_case(name))
    }

    pub fn remove(&mut self, name: &str) -> Option<Header> {
        let pos = self
            .0
            .iter()
            .position(|h| h.name().eq_ignore_ascii_case(name))?;
        Some(self.0.remove(pos))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Header> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn via(&self) -> Option<&Via> {
        self.0.iter().find_map(|h| match h {
            Header::Via(v) => Some(v),
            _ => None,
        })
    }

    pub fn from_addr(&self) -> Option<&NameAddr> {
        self.0.iter().find_map(|h| match h {
            Header::From(v) => Some(v),
            _ => None,
        })
    }

    pub fn to_addr(&self) -> Option<&NameAddr> {
        self.0.iter().find_map(|h| match h {
            Header::To(v) => Some(v),
            _ => None,
        })
    }

    pub fn call_id(&self) -> Option<&str> {
        self.0.iter().find_map(|h| match h {
            Header::CallId(v) => Some(v.as_str()),
            _ => None,
        })
    }

    pub fn cseq(&self) -> Option<&CSeq> {
        self.0.iter().find_map(|h| match h {
            Header::CSeq(v) => Some(v),
            _ => None,
        })
    }

    pub fn authorization(&self) -> Option<&Authorization> {
        self.0.iter().find_map(|h| match h {
            Header::Authorization(v) => Some(v),
            _ => None,
        })
    }
}

impl<'a> IntoIterator for &'a Headers {
    type Item = &'a Header;
    type IntoIter = core::slice::Iter<'a, Header>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl FromIterator<Header> for Headers {
    fn from_iter<I: IntoIterator<Item = Header>>(iter: I) -> Self {
        let mut headers = Headers::new();
        for header in iter {
            headers.set(header);
        }
        headers
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub method: Method,
    pub uri: String,
    pub version: Version,
    pub headers: Headers,
    pub content: Option<String>,
}

impl Request {
    pub fn new(method: Method, uri: &str) -> Self {
        Self {
            method,
            uri: uri.to_owned(),
            version: Version::SIP_2_0,
            headers: Headers::new(),
            content: None,
        }
    }

    pub fn add_header(&mut self, header: Header) {
        self.headers.set(header);
    }

    pub fn set_body(&mut self, body: &str) {
        self.content = Some(body.to_owned());
    }

    /// Same request line and body, different header set.
    pub fn with_headers(&self, headers: Headers) -> Self {
        Self {
            headers,
            ..self.clone()
        }
    }

    pub fn render(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} SIP/{}\r\n", self.method, self.uri, self.version)?;
        for header in &self.headers {
            write!(f, "{}\r\n", header)?;
        }
        write!(f, "\r\n{}", self.content.as_deref().unwrap_or(""))
    }
}
