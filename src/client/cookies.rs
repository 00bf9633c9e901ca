use std::sync::MutexGuard;

use cookie_store::CookieStore as Store;
use reqwest::cookie::CookieStore;
use reqwest::header::HeaderValue;
use reqwest::Url;
use reqwest_cookie_store::CookieStoreMutex;

/// Cookie jar shared with a reqwest client that, unlike
/// `reqwest::cookie::Jar`, can be emptied before a login.
pub struct SessionCookieJar {
    store: CookieStoreMutex,
}

impl SessionCookieJar {
    pub fn new() -> Self {
        Self {
            store: CookieStoreMutex::new(Store::default()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Store> {
        self.store.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Value of the unexpired cookie `name` that would be sent to `url`.
    pub fn get(&self, url: &Url, name: &str) -> Option<String> {
        self.lock()
            .get_request_values(url)
            .find(|(cookie, _)| *cookie == name)
            .map(|(_, value)| value.to_string())
    }

    pub fn is_empty(&self) -> bool {
        self.lock().iter_unexpired().next().is_none()
    }

    /// Drop every cookie for every host.
    pub fn clear(&self) {
        self.lock().clear();
    }
}

impl Default for SessionCookieJar {
    fn default() -> Self {
        Self::new()
    }
}

impl CookieStore for SessionCookieJar {
    fn set_cookies(&self, cookie_headers: &mut dyn Iterator<Item = &HeaderValue>, url: &Url) {
        self.store.set_cookies(cookie_headers, url);
    }

    fn cookies(&self, url: &Url) -> Option<HeaderValue> {
        self.store.cookies(url)
    }
}
