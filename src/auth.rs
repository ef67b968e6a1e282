use std::{fmt, str::FromStr, time::Duration};

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use reqwest::{
    header::{self, HeaderMap},
    RequestBuilder,
};
use serde::Deserialize;
use tokio::process::Command;

use crate::{Endpoint, LivyHttpError, Result};

/// Upper bound on a single `klist` run.
const KLIST_TIMEOUT: Duration = Duration::from_secs(10);

/// Authentication scheme spoken by an endpoint.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Deserialize)]
#[serde(try_from = "String")]
pub enum AuthKind {
    #[default]
    None,
    /// HTTP Basic credentials (`LDAP` in notebook configuration).
    Basic,
    /// Username/password pair sent as a plain credential tuple (`SSL` in
    /// notebook configuration).
    ClientCert,
    /// SPNEGO against the local Kerberos ticket cache.
    Kerberos,
}

impl AuthKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::None => "None",
            Self::Basic => "Basic",
            Self::ClientCert => "SSL",
            Self::Kerberos => "Kerberos",
        }
    }
}

impl fmt::Display for AuthKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AuthKind {
    type Err = LivyHttpError;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "none" => Ok(Self::None),
            "basic" | "basic_access" | "ldap" => Ok(Self::Basic),
            "ssl" => Ok(Self::ClientCert),
            "kerberos" => Ok(Self::Kerberos),
            _ => Err(LivyHttpError::UnsupportedAuth(value.to_owned())),
        }
    }
}

impl TryFrom<String> for AuthKind {
    type Error = LivyHttpError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

/// How strictly the server's reply token is checked on Kerberos requests.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MutualAuthentication {
    /// A successful response must carry a `Negotiate` token that completes
    /// the context.
    #[default]
    Required,
    /// A token is verified when present; its absence is accepted.
    Optional,
    Disabled,
}

/// Client half of a started SPNEGO exchange.
pub trait NegotiateContext: Send {
    /// Completes the context with the server's reply token, proving the
    /// server's identity.
    fn finish(self: Box<Self>, server_token: &[u8]) -> Result<()>;
}

/// First leg of a SPNEGO exchange.
pub struct Negotiation {
    /// Base64 token for `Authorization: Negotiate`.
    pub token: String,
    pub context: Box<dyn NegotiateContext>,
}

/// Source of Kerberos identity for SPNEGO authentication.
#[async_trait]
pub trait TicketCache: Send + Sync {
    /// Principal of the current default ticket.
    async fn principal(&self) -> Result<String>;

    /// Starts a security context as `principal` for `HTTP@<service_host>`.
    async fn initiate(&self, principal: &str, service_host: &str) -> Result<Negotiation> {
        Err(LivyHttpError::Auth(format!(
            "no SPNEGO provider for {principal} -> HTTP@{service_host}; \
             build with the `kerberos` feature or supply a TicketCache"
        )))
    }
}

/// Reads the default principal by running `klist`.
#[derive(Clone, Debug)]
pub struct KlistTicketCache {
    program: String,
}

impl KlistTicketCache {
    pub fn new() -> Self {
        Self::with_program("klist")
    }

    /// Runs `program` instead of `klist` from `PATH`.
    pub fn with_program(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl Default for KlistTicketCache {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TicketCache for KlistTicketCache {
    async fn principal(&self) -> Result<String> {
        let run = Command::new(&self.program).kill_on_drop(true).output();
        let output = tokio::time::timeout(KLIST_TIMEOUT, run)
            .await
            .map_err(|_| {
                LivyHttpError::Auth(format!(
                    "{} did not finish within {}s",
                    self.program,
                    KLIST_TIMEOUT.as_secs()
                ))
            })?
            .map_err(|err| LivyHttpError::Auth(format!("could not run {}: {err}", self.program)))?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(LivyHttpError::Auth(format!(
                "{} exited with {}: {}",
                self.program,
                output.status,
                stderr.trim()
            )));
        }
        parse_klist_principal(&String::from_utf8_lossy(&output.stdout)).ok_or_else(|| {
            LivyHttpError::Auth(format!("no principal in {} output", self.program))
        })
    }
}

/// Last field of the first `Principal:` line; covers both MIT
/// (`Default principal: x`) and Heimdal (`Principal: x`) output.
pub(crate) fn parse_klist_principal(output: &str) -> Option<String> {
    output
        .lines()
        .find(|line| line.contains("Principal:") || line.contains("principal:"))
        .and_then(|line| line.split_whitespace().last())
        .filter(|field| !field.ends_with(':'))
        .map(str::to_owned)
}

pub struct KerberosCredential {
    pub principal: String,
    pub mutual_authentication: MutualAuthentication,
    token: String,
    context: Box<dyn NegotiateContext>,
}

impl fmt::Debug for KerberosCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KerberosCredential")
            .field("principal", &self.principal)
            .field("mutual_authentication", &self.mutual_authentication)
            .field("token", &"<redacted>")
            .finish()
    }
}

/// Resolved authentication for one attempt.
pub enum Credential {
    None,
    Basic { username: String, password: String },
    Tuple { username: String, password: String },
    Kerberos(KerberosCredential),
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => f.write_str("None"),
            Self::Basic { username, .. } => f
                .debug_struct("Basic")
                .field("username", username)
                .field("password", &"<redacted>")
                .finish(),
            Self::Tuple { username, .. } => f
                .debug_struct("Tuple")
                .field("username", username)
                .field("password", &"<redacted>")
                .finish(),
            Self::Kerberos(credential) => fmt::Debug::fmt(credential, f),
        }
    }
}

impl Credential {
    /// Builds the credential for `endpoint`. For Kerberos this queries the
    /// ticket cache and starts a SPNEGO context; failure there is an auth
    /// error, never a fallback to unauthenticated.
    pub async fn resolve(
        endpoint: &Endpoint,
        service_host: &str,
        tickets: &dyn TicketCache,
        mutual_authentication: MutualAuthentication,
    ) -> Result<Self> {
        match endpoint.auth() {
            AuthKind::None => Ok(Self::None),
            AuthKind::Basic => Ok(Self::Basic {
                username: endpoint.username().to_owned(),
                password: endpoint.password().to_owned(),
            }),
            AuthKind::ClientCert => Ok(Self::Tuple {
                username: endpoint.username().to_owned(),
                password: endpoint.password().to_owned(),
            }),
            AuthKind::Kerberos => {
                let principal = tickets.principal().await?;
                if principal.is_empty() {
                    return Err(LivyHttpError::Auth("ticket cache has no principal".to_owned()));
                }
                let Negotiation { token, context } =
                    tickets.initiate(&principal, service_host).await?;
                Ok(Self::Kerberos(KerberosCredential {
                    principal,
                    mutual_authentication,
                    token,
                    context,
                }))
            }
        }
    }

    pub fn is_none(&self) -> bool {
        matches!(self, Self::None)
    }

    /// Kerberos tokens are always sent preemptively.
    pub(crate) fn apply(&self, request: RequestBuilder) -> RequestBuilder {
        match self {
            Self::None => request,
            Self::Basic { username, password } => request.basic_auth(username, Some(password)),
            Self::Tuple { username, password } => {
                let encoded = STANDARD.encode(format!("{username}:{password}"));
                request.header(header::AUTHORIZATION, format!("Basic {encoded}"))
            }
            Self::Kerberos(credential) => {
                request.header(header::AUTHORIZATION, format!("Negotiate {}", credential.token))
            }
        }
    }

    /// Checks the server side of a Kerberos exchange on an accepted response.
    ///
    /// A server that recognised the session cookie skips SPNEGO and sends no
    /// token; that is accepted when `cookie_sent` is set.
    pub(crate) fn verify_mutual(
        self,
        status: u16,
        headers: &HeaderMap,
        cookie_sent: bool,
    ) -> Result<()> {
        let Self::Kerberos(credential) = self else {
            return Ok(());
        };
        if credential.mutual_authentication == MutualAuthentication::Disabled {
            return Ok(());
        }

        match negotiate_token(headers) {
            Some(token) => {
                let server_token = STANDARD.decode(token).map_err(|err| {
                    LivyHttpError::Auth(format!("undecodable Negotiate token from server: {err}"))
                })?;
                credential.context.finish(&server_token)
            }
            None if credential.mutual_authentication == MutualAuthentication::Required
                && status < 400
                && !cookie_sent =>
            {
                Err(LivyHttpError::Auth(format!(
                    "mutual authentication failed: no Negotiate token in response for {}",
                    credential.principal
                )))
            }
            None => Ok(()),
        }
    }
}

fn negotiate_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get_all(header::WWW_AUTHENTICATE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .find_map(|value| {
            let (scheme, token) = value.trim().split_once(' ')?;
            scheme
                .eq_ignore_ascii_case("negotiate")
                .then_some(token.trim())
                .filter(|token| !token.is_empty())
        })
}
