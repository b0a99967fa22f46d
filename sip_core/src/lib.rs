//! SIP request templating and digest credentials.
//!
//! Builds REGISTER/INVITE/BYE requests as structured values and answers
//! 401/407 digest challenges. No sockets, timers or dialog state live here;
//! sending and parsing wire text is left to the caller.

pub mod auth;
pub mod builder;
pub mod config;
pub mod env;
pub mod hash;
pub mod message;

pub use auth::{
    parse_www_authenticate, AuthChallenge, AuthCredentials, DigestAuthenticator, DigestResponse,
};
pub use builder::MessageBuilder;
pub use config::BuilderSettings;
pub use env::{Clock, FixedClock, RandomSource, SystemClock, ThreadRandom};
pub use message::{
    Authorization, CSeq, Contact, Header, Headers, Method, NameAddr, Request, Rport, Version, Via,
};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SipError {
    #[error("malformed challenge: missing {0}")]
    MalformedChallenge(&'static str),
    #[error("unsupported quality of protection: '{0}'")]
    UnsupportedQop(String),
    #[error("invalid: {0}")]
    Invalid(&'static str),
}

pub type Result<T> = std::result::Result<T, SipError>;
