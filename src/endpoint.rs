use std::{
    collections::BTreeMap,
    fmt,
    hash::{Hash, Hasher},
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use crate::{AuthKind, Result};

/// Cookies that keep an authenticated session alive across requests.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct SessionCookie(BTreeMap<String, String>);

impl SessionCookie {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self(BTreeMap::from([(name.into(), value.into())]))
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    /// Value for a `Cookie` request header.
    pub fn header_value(&self) -> String {
        self.0
            .iter()
            .map(|(name, value)| format!("{name}={value}"))
            .collect::<Vec<_>>()
            .join("; ")
    }
}

impl fmt::Debug for SessionCookie {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(self.0.keys().map(|name| (name, "<redacted>")))
            .finish()
    }
}

/// A remote job-server the notebook talks to.
///
/// Identity is the URL: two endpoints with the same URL compare equal and
/// hash alike, whatever their credentials.
pub struct Endpoint {
    url: String,
    auth: AuthKind,
    username: String,
    password: String,
    session_cookie: Mutex<Option<SessionCookie>>,
}

impl Endpoint {
    pub fn new(
        url: impl Into<String>,
        auth: AuthKind,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            url: url.into(),
            auth,
            username: username.into(),
            password: password.into(),
            session_cookie: Mutex::new(None),
        }
    }

    /// Like [`Endpoint::new`] with the auth kind given by name, as entered
    /// in the notebook (`None`, `Basic`/`LDAP`, `SSL`, `Kerberos`).
    pub fn parse(
        url: impl Into<String>,
        auth: &str,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Result<Self> {
        Ok(Self::new(url, auth.parse()?, username, password))
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn auth(&self) -> AuthKind {
        self.auth
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn password(&self) -> &str {
        &self.password
    }

    /// Session cookie captured from the first successful response, if any.
    pub fn session_cookie(&self) -> Option<SessionCookie> {
        self.lock_cookie().clone()
    }

    /// Forgets the session cookie so the next successful response can set a
    /// new one.
    pub fn clear_session_cookie(&self) {
        self.lock_cookie().take();
    }

    /// Stores `cookie` unless one is already held. Returns whether it was
    /// stored.
    pub(crate) fn store_session_cookie(&self, cookie: SessionCookie) -> bool {
        let mut slot = self.lock_cookie();
        if slot.is_some() {
            return false;
        }
        *slot = Some(cookie);
        true
    }

    fn lock_cookie(&self) -> MutexGuard<'_, Option<SessionCookie>> {
        // The slot is always left in a valid state, so a poisoned lock is safe
        // to reuse.
        self.session_cookie
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Debug for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Endpoint")
            .field("url", &self.url)
            .field("auth", &self.auth)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("session_cookie", &self.session_cookie())
            .finish()
    }
}

impl PartialEq for Endpoint {
    fn eq(&self, other: &Self) -> bool {
        self.url == other.url
    }
}

impl Eq for Endpoint {}

impl Hash for Endpoint {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.url.hash(state);
    }
}

/// Endpoints known to the notebook, keyed by URL.
#[derive(Debug, Default)]
pub struct EndpointRegistry {
    endpoints: BTreeMap<String, Arc<Endpoint>>,
}

impl EndpointRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `endpoint`, replacing any endpoint with the same URL, and
    /// returns the shared handle.
    pub fn add(&mut self, endpoint: Endpoint) -> Arc<Endpoint> {
        let endpoint = Arc::new(endpoint);
        self.endpoints
            .insert(endpoint.url().to_owned(), Arc::clone(&endpoint));
        endpoint
    }

    pub fn get(&self, url: &str) -> Option<Arc<Endpoint>> {
        self.endpoints.get(url).cloned()
    }

    pub fn remove(&mut self, url: &str) -> Option<Arc<Endpoint>> {
        self.endpoints.remove(url)
    }

    pub fn urls(&self) -> impl Iterator<Item = &str> {
        self.endpoints.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<Endpoint>> {
        self.endpoints.values()
    }

    pub fn len(&self) -> usize {
        self.endpoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty()
    }
}
