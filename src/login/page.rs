use std::collections::HashMap;

use url::Url;

/// What the login page knows about where it was loaded.
#[derive(Debug, Clone, Default)]
pub struct PageContext {
    /// The page's window is not the top-level window.
    pub is_embedded: bool,
    pub query: HashMap<String, String>,
}

impl PageContext {
    pub fn from_url(url: &str, is_embedded: bool) -> Result<Self, url::ParseError> {
        let url = Url::parse(url)?;
        let query = url.query_pairs().into_owned().collect();
        Ok(Self { is_embedded, query })
    }

    /// `username` and `password` query parameters, when both are non-empty.
    pub fn url_credentials(&self) -> Option<(String, String)> {
        let username = self.query.get("username").filter(|v| !v.is_empty())?;
        let password = self.query.get("password").filter(|v| !v.is_empty())?;
        Some((username.clone(), password.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_credentials() {
        let page = PageContext::from_url("http://hub.local/login?username=ada&password=p%40ss", false).unwrap();
        assert_eq!(
            page.url_credentials(),
            Some(("ada".to_string(), "p@ss".to_string()))
        );
    }

    #[test]
    fn test_partial_credentials_ignored() {
        let only_user = PageContext::from_url("http://hub.local/login?username=ada", false).unwrap();
        assert!(only_user.url_credentials().is_none());

        let empty = PageContext::from_url("http://hub.local/login?username=ada&password=", false).unwrap();
        assert!(empty.url_credentials().is_none());
    }
}
