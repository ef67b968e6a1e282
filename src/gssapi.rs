use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use cross_krb5::{ClientCtx, InitiateFlags, PendingClientCtx};

use crate::{KlistTicketCache, LivyHttpError, NegotiateContext, Negotiation, Result, TicketCache};

/// SPNEGO through the system GSSAPI (or SSPI on Windows) library.
///
/// The principal still comes from `klist`, so a missing ticket fails before
/// any GSSAPI call.
#[derive(Clone, Debug, Default)]
pub struct GssapiTicketCache {
    klist: KlistTicketCache,
}

impl GssapiTicketCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_klist(klist: KlistTicketCache) -> Self {
        Self { klist }
    }
}

#[async_trait]
impl TicketCache for GssapiTicketCache {
    async fn principal(&self) -> Result<String> {
        self.klist.principal().await
    }

    async fn initiate(&self, principal: &str, service_host: &str) -> Result<Negotiation> {
        let principal = principal.to_owned();
        let target = format!("HTTP/{service_host}");

        // The GSSAPI calls may read the credential cache and contact the KDC.
        tokio::task::spawn_blocking(move || -> Result<Negotiation> {
            let (pending, token) =
                ClientCtx::new(InitiateFlags::empty(), Some(&principal), &target, None)
                    .map_err(|err| {
                        LivyHttpError::Auth(format!(
                            "no security context for {principal} -> {target}: {err:#}"
                        ))
                    })?;
            Ok(Negotiation {
                token: STANDARD.encode(&*token),
                context: Box::new(GssapiContext(pending)),
            })
        })
        .await
        .map_err(|err| LivyHttpError::Auth(format!("security context task failed: {err}")))?
    }
}

struct GssapiContext(PendingClientCtx);

impl NegotiateContext for GssapiContext {
    fn finish(self: Box<Self>, server_token: &[u8]) -> Result<()> {
        self.0
            .finish(server_token)
            .map(drop)
            .map_err(|err| LivyHttpError::Auth(format!("server token rejected: {err:#}")))
    }
}
