//! `livy-http` is the transport layer a notebook uses to talk to a Livy-style
//! job server.
//!
//! [`ReliableHttpClient`] issues GET/POST/DELETE requests against an
//! [`Endpoint`], retrying network failures and transient statuses according
//! to a [`RetryPolicy`], authenticating with the endpoint's [`AuthKind`] and
//! keeping the session cookie the server hands out after the first
//! successful exchange.
//!
//! ```no_run
//! use livy_http::{ClientFactory, ClientConfig, Endpoint, EndpointRegistry};
//!
//! # async fn run() -> livy_http::Result<()> {
//! let mut endpoints = EndpointRegistry::new();
//! let endpoint = endpoints.add(Endpoint::parse("https://livy:8998", "Kerberos", "", "")?);
//!
//! let client = ClientFactory::new(ClientConfig::from_env()?)?.client_for(endpoint);
//! let sessions = client.get("/sessions", &[200]).await?;
//! println!("{}", sessions.body);
//! # Ok(())
//! # }
//! ```

mod auth;
mod client;
mod endpoint;
mod error;
#[cfg(feature = "kerberos")]
mod gssapi;
mod options;
mod retry;
mod types;

pub use auth::{
    AuthKind, Credential, KerberosCredential, KlistTicketCache, MutualAuthentication,
    NegotiateContext, Negotiation, TicketCache,
};
pub use client::{compose_url, ClientFactory, ReliableHttpClient};
pub use endpoint::{Endpoint, EndpointRegistry, SessionCookie};
pub use error::LivyHttpError;
#[cfg(feature = "kerberos")]
pub use gssapi::GssapiTicketCache;
pub use options::{default_headers, ClientConfig, DEFAULT_SESSION_COOKIE};
pub use retry::{
    is_transient_status, ConfigurableRetryPolicy, ConstantRetryPolicy, ExponentialRetryPolicy,
    RetryPolicy, RetryPolicyConfig,
};
pub use types::HttpResponse;

pub type Result<T> = std::result::Result<T, LivyHttpError>;
