//! Single-codec audio answer for an already-parsed SDP offer.

use core::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use log::{debug, warn};
use thiserror::Error;

/// RTP/AVP static payload type for G.711 µ-law.
pub const PCMU: u8 = 0;

const CRLF: &str = "\r\n";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SdpError {
    #[error("no audio media offering PCMU")]
    NoCompatibleMedia,
}

pub type Result<T> = std::result::Result<T, SdpError>;

/// `o=` line fields the negotiator reads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Origin {
    pub address: String,
}

/// `c=` line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Connection {
    pub address: String,
}

/// One `m=` line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaDescription {
    pub media: String,
    pub port: u16,
    pub fmt: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaOffer {
    pub origin: Origin,
    pub connection: Option<Connection>,
    pub media: Vec<MediaDescription>,
}

impl MediaOffer {
    /// Where the remote side wants media sent: the session `c=` address,
    /// or the origin address when the offer has none.
    pub fn remote_address(&self) -> &str {
        self.connection
            .as_ref()
            .map(|c| c.address.as_str())
            .unwrap_or(self.origin.address.as_str())
    }
}

/// Session id and version for the `o=` line of a fresh session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionDescriptor {
    pub id: u64,
    pub version: u64,
}

impl SessionDescriptor {
    pub fn from_millis(millis: u64) -> Self {
        Self {
            id: millis,
            version: millis,
        }
    }

    pub fn now() -> Self {
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);
        Self::from_millis(millis)
    }
}

/// The answer we send back: one sendrecv PCMU stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionDescription {
    pub session: SessionDescriptor,
    pub session_name: String,
    pub connection_address: String,
    pub media_port: u16,
    pub payload_type: u8,
    pub rtpmap: String,
    pub ptime_ms: u32,
}

impl SessionDescription {
    pub fn answer(session: SessionDescriptor, local_address: &str, local_port: u16) -> Self {
        Self {
            session,
            session_name: "-".into(),
            connection_address: local_address.to_owned(),
            media_port: local_port,
            payload_type: PCMU,
            rtpmap: "PCMU/8000".into(),
            ptime_ms: 20,
        }
    }
}

impl fmt::Display for SessionDescription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let lines = [
            "v=0".to_string(),
            format!(
                "o=- {} {} IN IP4 {}",
                self.session.id, self.session.version, self.connection_address
            ),
            format!("s={}", self.session_name),
            format!("c=IN IP4 {}", self.connection_address),
            "t=0 0".to_string(),
            format!("m=audio {} RTP/AVP {}", self.media_port, self.payload_type),
            "a=sendrecv".to_string(),
            format!("a=rtpmap:{} {}", self.payload_type, self.rtpmap),
            format!("a=ptime:{}", self.ptime_ms),
            String::new(),
        ];
        f.write_str(&lines.join(CRLF))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NegotiatedMedia {
    pub remote_address: String,
    pub remote_port: u16,
    pub sdp_answer: String,
}

/// Picks the first audio stream offering PCMU and answers it from
/// `local_address:local_port`. A fresh session id/version is taken from the
/// wall clock.
///
/// No match is a hard failure: the caller decides whether to reject the
/// call (e.g. 488) or retry with a different offer.
pub fn negotiate(local_address: &str, local_port: u16, offer: &MediaOffer) -> Result<NegotiatedMedia> {
    negotiate_with_session(local_address, local_port, offer, SessionDescriptor::now())
}

pub fn negotiate_with_session(
    local_address: &str,
    local_port: u16,
    offer: &MediaOffer,
    session: SessionDescriptor,
) -> Result<NegotiatedMedia> {
    let Some(media) = offer
        .media
        .iter()
        .find(|m| m.media == "audio" && m.fmt.contains(&PCMU))
    else {
        warn!("offer from {} has no PCMU audio stream", offer.origin.address);
        return Err(SdpError::NoCompatibleMedia);
    };

    let remote_address = offer.remote_address().to_owned();
    debug!(
        "negotiated PCMU: remote {}:{}, local {}:{}",
        remote_address, media.port, local_address, local_port
    );

    Ok(NegotiatedMedia {
        remote_address,
        remote_port: media.port,
        sdp_answer: SessionDescription::answer(session, local_address, local_port).to_string(),
    })
}
