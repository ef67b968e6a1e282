use std::{fmt, sync::Arc, time::Duration};

use reqwest::{header, header::HeaderMap, Method, Url};
use serde::Serialize;

// tokio::time::sleep yields the task instead of blocking the thread; retry
// ordering is the same as a blocking wait.
use tokio::time::sleep;

use crate::{
    default_headers, ClientConfig, Credential, Endpoint, HttpResponse, LivyHttpError,
    MutualAuthentication, Result, RetryPolicy, SessionCookie, TicketCache,
};

/// Joins `relative_url` onto `base_url` with exactly one `/` between them.
///
/// Example: `("http://livy:8998/", "/sessions/")` → `"http://livy:8998/sessions"`
pub fn compose_url(base_url: &str, relative_url: &str) -> String {
    format!(
        "{}/{}",
        base_url.trim_end_matches('/'),
        relative_url.trim_matches('/')
    )
}

/// HTTP client bound to one [`Endpoint`] that retries transient failures and
/// keeps the endpoint's session cookie.
///
/// Clones share the endpoint, the connection pool and the retry policy.
/// Concurrent calls through clients of the same endpoint are safe, but the
/// first session cookie to arrive wins.
#[derive(Clone)]
pub struct ReliableHttpClient {
    http: reqwest::Client,
    endpoint: Arc<Endpoint>,
    headers: HeaderMap,
    retry_policy: Arc<dyn RetryPolicy>,
    tickets: Arc<dyn TicketCache>,
    mutual_authentication: MutualAuthentication,
    timeout: Duration,
    session_cookie_name: String,
}

/// A response that made it back, with the session cookie it set and whether
/// the request carried the endpoint's cookie.
struct Exchange {
    response: HttpResponse,
    cookie: Option<SessionCookie>,
    cookie_sent: bool,
}

impl fmt::Debug for ReliableHttpClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReliableHttpClient")
            .field("endpoint", &self.endpoint)
            .field("headers", &self.headers.keys().collect::<Vec<_>>())
            .field("retry_policy", &self.retry_policy)
            .field("mutual_authentication", &self.mutual_authentication)
            .field("timeout", &self.timeout)
            .field("session_cookie_name", &self.session_cookie_name)
            .finish()
    }
}

impl ReliableHttpClient {
    /// Creates a client for `endpoint` with the retry policy, timeout and TLS
    /// settings from `config`, [`default_headers`] and the default ticket
    /// cache.
    pub fn new(endpoint: Arc<Endpoint>, config: &ClientConfig) -> Result<Self> {
        Ok(ClientFactory::new(config.clone())?.client_for(endpoint))
    }

    /// Replaces the headers sent with every request.
    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }

    pub fn with_retry_policy(mut self, policy: impl RetryPolicy + 'static) -> Self {
        self.retry_policy = Arc::new(policy);
        self
    }

    /// Replaces the Kerberos ticket source, e.g. with one that can mint
    /// SPNEGO tokens.
    pub fn with_ticket_cache(mut self, tickets: impl TicketCache + 'static) -> Self {
        self.tickets = Arc::new(tickets);
        self
    }

    pub fn endpoint(&self) -> &Arc<Endpoint> {
        &self.endpoint
    }

    /// Full URL for `relative_url` on this client's endpoint.
    pub fn compose_url(&self, relative_url: &str) -> String {
        compose_url(self.endpoint.url(), relative_url)
    }

    /// Sends a GET and returns the response once its status is accepted.
    pub async fn get(&self, relative_url: &str, accepted_status_codes: &[u16]) -> Result<HttpResponse> {
        self.send_request(Method::GET, relative_url, accepted_status_codes, None)
            .await
    }

    /// Sends a POST with `body` serialized as JSON.
    pub async fn post<B>(
        &self,
        relative_url: &str,
        accepted_status_codes: &[u16],
        body: &B,
    ) -> Result<HttpResponse>
    where
        B: Serialize + ?Sized,
    {
        let payload = serde_json::to_string(body).map_err(LivyHttpError::Encode)?;
        self.send_request(
            Method::POST,
            relative_url,
            accepted_status_codes,
            Some(payload),
        )
        .await
    }

    pub async fn delete(
        &self,
        relative_url: &str,
        accepted_status_codes: &[u16],
    ) -> Result<HttpResponse> {
        self.send_request(Method::DELETE, relative_url, accepted_status_codes, None)
            .await
    }

    async fn send_request(
        &self,
        method: Method,
        relative_url: &str,
        accepted_status_codes: &[u16],
        payload: Option<String>,
    ) -> Result<HttpResponse> {
        let url = self.compose_url(relative_url);
        let parsed = Url::parse(&url).map_err(|err| LivyHttpError::InvalidUrl {
            url: url.clone(),
            reason: err.to_string(),
        })?;
        let host = parsed
            .host_str()
            .ok_or_else(|| LivyHttpError::InvalidUrl {
                url: url.clone(),
                reason: "missing host".to_owned(),
            })?
            .to_owned();

        let mut retry_count = 0u32;
        loop {
            // Resolved on every attempt: a Kerberos ticket may have been
            // renewed or may have expired since the last one.
            let credential = Credential::resolve(
                &self.endpoint,
                &host,
                self.tickets.as_ref(),
                self.mutual_authentication,
            )
            .await?;
            let (request, cookie_sent) =
                self.build_request(&method, parsed.clone(), &credential, payload.as_deref());
            let outcome = self.attempt(request, cookie_sent).await;

            match outcome {
                Ok(exchange) if accepted_status_codes.contains(&exchange.response.status) => {
                    let Exchange {
                        response,
                        cookie,
                        cookie_sent,
                    } = exchange;
                    credential.verify_mutual(response.status, &response.headers, cookie_sent)?;
                    if let Some(cookie) = cookie {
                        if self.endpoint.store_session_cookie(cookie) {
                            #[cfg(feature = "tracing")]
                            tracing::debug!(endpoint = %self.endpoint.url(), "stored session cookie");
                        }
                    }
                    return Ok(response);
                }
                Ok(Exchange { response, .. }) => {
                    if self
                        .retry_policy
                        .should_retry(Some(response.status), false, retry_count)
                    {
                        self.wait_before_retry(&url, retry_count).await;
                        retry_count += 1;
                        continue;
                    }
                    return Err(LivyHttpError::InvalidStatus {
                        status: response.status,
                        url,
                        body: response.body,
                    });
                }
                Err(err) => {
                    #[cfg(feature = "tracing")]
                    tracing::error!(%url, error = %err, "request failed");

                    if self.retry_policy.should_retry(None, true, retry_count) {
                        self.wait_before_retry(&url, retry_count).await;
                        retry_count += 1;
                        continue;
                    }
                    return Err(LivyHttpError::RetriesExhausted {
                        url,
                        attempts: retry_count.saturating_add(1),
                        source: err,
                    });
                }
            }
        }
    }

    /// Returns the request for one attempt and whether it carries the
    /// session cookie.
    fn build_request(
        &self,
        method: &Method,
        url: Url,
        credential: &Credential,
        payload: Option<&str>,
    ) -> (reqwest::RequestBuilder, bool) {
        let mut request = self
            .http
            .request(method.clone(), url)
            .headers(self.headers.clone())
            .timeout(self.timeout);
        request = credential.apply(request);

        let mut cookie_sent = false;
        if !credential.is_none() {
            if let Some(cookie) = self.endpoint.session_cookie() {
                request = request.header(header::COOKIE, cookie.header_value());
                cookie_sent = true;
            }
        }
        if let Some(payload) = payload {
            request = request.body(payload.to_owned());
        }
        (request, cookie_sent)
    }

    /// One network round trip. `Err` means the request never produced a
    /// complete response.
    async fn attempt(
        &self,
        request: reqwest::RequestBuilder,
        cookie_sent: bool,
    ) -> std::result::Result<Exchange, reqwest::Error> {
        let response = request.send().await?;
        let status = response.status().as_u16();
        let headers = response.headers().clone();
        let cookie = response
            .cookies()
            .find(|cookie| cookie.name() == self.session_cookie_name && !cookie.value().is_empty())
            .map(|cookie| SessionCookie::new(cookie.name(), cookie.value()));
        let body = response.text().await?;

        Ok(Exchange {
            response: HttpResponse {
                status,
                headers,
                body,
            },
            cookie,
            cookie_sent,
        })
    }

    async fn wait_before_retry(&self, url: &str, retry_count: u32) {
        let delay = self.retry_policy.seconds_to_sleep(retry_count);

        #[cfg(feature = "tracing")]
        tracing::debug!(%url, attempt = retry_count + 1, delay = ?delay, "retrying request");
        #[cfg(not(feature = "tracing"))]
        let _ = url;

        sleep(delay).await;
    }
}

/// Builds [`ReliableHttpClient`]s for endpoints chosen in the notebook.
///
/// All clients from one factory share a connection pool and retry policy.
#[derive(Clone)]
pub struct ClientFactory {
    http: reqwest::Client,
    config: ClientConfig,
    headers: HeaderMap,
    retry_policy: Arc<dyn RetryPolicy>,
    tickets: Arc<dyn TicketCache>,
}

impl fmt::Debug for ClientFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientFactory")
            .field("config", &self.config)
            .field("retry_policy", &self.retry_policy)
            .finish()
    }
}

impl ClientFactory {
    pub fn new(config: ClientConfig) -> Result<Self> {
        let retry_policy = config.retry_policy.build()?;
        let http = build_http_client(&config)?;
        Ok(Self {
            http,
            config,
            headers: default_headers(),
            retry_policy,
            tickets: default_ticket_cache(),
        })
    }

    /// Reads [`ClientConfig::from_env`].
    pub fn from_env() -> Result<Self> {
        Self::new(ClientConfig::from_env()?)
    }

    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }

    pub fn with_retry_policy(mut self, policy: impl RetryPolicy + 'static) -> Self {
        self.retry_policy = Arc::new(policy);
        self
    }

    pub fn with_ticket_cache(mut self, tickets: impl TicketCache + 'static) -> Self {
        self.tickets = Arc::new(tickets);
        self
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn client_for(&self, endpoint: Arc<Endpoint>) -> ReliableHttpClient {
        ReliableHttpClient {
            http: self.http.clone(),
            endpoint,
            headers: self.headers.clone(),
            retry_policy: Arc::clone(&self.retry_policy),
            tickets: Arc::clone(&self.tickets),
            mutual_authentication: self.config.kerberos_mutual_authentication,
            timeout: Duration::from_millis(self.config.timeout_ms),
            session_cookie_name: self.config.session_cookie_name.clone(),
        }
    }
}

#[cfg(feature = "kerberos")]
fn default_ticket_cache() -> Arc<dyn TicketCache> {
    Arc::new(crate::GssapiTicketCache::new())
}

#[cfg(not(feature = "kerberos"))]
fn default_ticket_cache() -> Arc<dyn TicketCache> {
    Arc::new(crate::KlistTicketCache::new())
}

fn build_http_client(config: &ClientConfig) -> Result<reqwest::Client> {
    if config.ignore_ssl_errors {
        #[cfg(feature = "tracing")]
        tracing::warn!("ATTENTION: will ignore SSL errors; connections are open to interception");
    }

    reqwest::Client::builder()
        .danger_accept_invalid_certs(config.ignore_ssl_errors)
        .build()
        .map_err(LivyHttpError::Build)
}
