// Copyright (c) 2022 Espresso Systems (espressosys.com)
// This file is part of the Portable REST library.

// This program is free software: you can redistribute it and/or modify it under the terms of the GNU General Public License as published by the Free Software Foundation, either version 3 of the License, or (at your option) any later version.
// This program is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
// You should have received a copy of the GNU General Public License along with this program. If not, see <https://www.gnu.org/licenses/>.

//! A cookie jar shared by every request of a client.

use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use surf::http::cookies::Cookie;
use surf::http::headers::{COOKIE, SET_COOKIE};
use surf::middleware::{Middleware, Next};
use surf::{Client, Request, Response};
use tracing::{event, Level};
use url::Url;

#[derive(Clone, Debug, PartialEq, Eq)]
struct StoredCookie {
    name: String,
    value: String,
    domain: String,
    /// Only sent to exactly `domain`, not to its subdomains.
    host_only: bool,
    path: String,
    secure: bool,
}

impl StoredCookie {
    fn matches(&self, url: &Url) -> bool {
        let host = match url.host_str() {
            Some(host) => host.to_ascii_lowercase(),
            None => return false,
        };
        let domain_matches = host == self.domain
            || (!self.host_only && host.ends_with(&format!(".{}", self.domain)));
        domain_matches && path_matches(url.path(), &self.path) && (!self.secure || url.scheme() == "https")
    }
}

fn path_matches(request_path: &str, cookie_path: &str) -> bool {
    request_path == cookie_path
        || (request_path.starts_with(cookie_path)
            && (cookie_path.ends_with('/')
                || request_path[cookie_path.len()..].starts_with('/')))
}

/// The directory of the request path, used when a cookie does not name its own path.
fn default_path(url: &Url) -> String {
    let path = url.path();
    match path.rfind('/') {
        Some(0) | None => "/".to_string(),
        Some(i) => path[..i].to_string(),
    }
}

/// Cookies received in `Set-Cookie` headers, replayed on later requests to matching URLs.
///
/// Clones share the same jar. The container is installed as middleware on the client's transport,
/// so it also sees every hop of a redirect.
#[derive(Clone, Debug, Default)]
pub struct CookieContainer {
    cookies: Arc<RwLock<Vec<StoredCookie>>>,
}

impl CookieContainer {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, Vec<StoredCookie>> {
        match self.cookies.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn write(&self) -> RwLockWriteGuard<'_, Vec<StoredCookie>> {
        match self.cookies.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Store the cookie in a `Set-Cookie` header received from `url`.
    ///
    /// A cookie with an empty value removes any stored cookie of the same name, domain and path.
    /// Returns `false` if the header could not be parsed or names a domain `url` is not part of.
    pub fn add(&self, url: &Url, set_cookie: &str) -> bool {
        let cookie = match Cookie::parse(set_cookie) {
            Ok(cookie) => cookie,
            Err(err) => {
                event!(Level::WARN, "ignoring malformed cookie {:?}: {}", set_cookie, err);
                return false;
            }
        };
        let host = match url.host_str() {
            Some(host) => host.to_ascii_lowercase(),
            None => return false,
        };

        let (domain, host_only) = match cookie.domain() {
            Some(domain) => {
                let domain = domain.trim_start_matches('.').to_ascii_lowercase();
                if host != domain && !host.ends_with(&format!(".{}", domain)) {
                    event!(
                        Level::WARN,
                        "ignoring cookie {} for domain {} set by {}",
                        cookie.name(),
                        domain,
                        host
                    );
                    return false;
                }
                (domain, false)
            }
            None => (host, true),
        };
        let stored = StoredCookie {
            name: cookie.name().to_string(),
            value: cookie.value().to_string(),
            domain,
            host_only,
            path: cookie
                .path()
                .filter(|path| path.starts_with('/'))
                .map(str::to_string)
                .unwrap_or_else(|| default_path(url)),
            secure: cookie.secure().unwrap_or(false),
        };

        let mut cookies = self.write();
        cookies.retain(|c| {
            !(c.name == stored.name && c.domain == stored.domain && c.path == stored.path)
        });
        if !stored.value.is_empty() {
            cookies.push(stored);
        }
        true
    }

    /// The `Cookie` header to send to `url`, if any stored cookie applies.
    pub fn cookie_header(&self, url: &Url) -> Option<String> {
        let cookies = self.read();
        let mut matching = cookies.iter().filter(|c| c.matches(url)).collect::<Vec<_>>();
        if matching.is_empty() {
            return None;
        }
        // More specific paths first.
        matching.sort_by(|a, b| b.path.len().cmp(&a.path.len()));
        Some(
            matching
                .iter()
                .map(|c| format!("{}={}", c.name, c.value))
                .collect::<Vec<_>>()
                .join("; "),
        )
    }

    /// The value of the cookie `name` that would be sent to `url`.
    pub fn get(&self, url: &Url, name: &str) -> Option<String> {
        self.read()
            .iter()
            .find(|c| c.name == name && c.matches(url))
            .map(|c| c.value.clone())
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    pub fn clear(&self) {
        self.write().clear();
    }
}

#[surf::utils::async_trait]
impl Middleware for CookieContainer {
    async fn handle(
        &self,
        mut req: Request,
        client: Client,
        next: Next<'_>,
    ) -> surf::Result<Response> {
        let url = req.url().clone();
        if let Some(cookies) = self.cookie_header(&url) {
            req.append_header(COOKIE, cookies);
        }
        let res = next.run(req, client).await?;
        if let Some(values) = res.header(SET_COOKIE) {
            for value in values.iter() {
                self.add(&url, value.as_str());
            }
        }
        Ok(res)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    #[test]
    fn host_only_cookies() {
        let jar = CookieContainer::new();
        assert!(jar.add(&url("http://api.test.com/v1/books"), "session=abc"));
        assert_eq!(
            jar.cookie_header(&url("http://api.test.com/v1/authors")),
            Some("session=abc".to_string())
        );
        // Default path is the directory of the request.
        assert_eq!(jar.cookie_header(&url("http://api.test.com/v2/books")), None);
        assert_eq!(jar.cookie_header(&url("http://www.api.test.com/v1/books")), None);
    }

    #[test]
    fn domain_cookies_reach_subdomains() {
        let jar = CookieContainer::new();
        assert!(jar.add(&url("http://api.test.com/"), "theme=dark; Domain=.test.com; Path=/"));
        assert_eq!(
            jar.get(&url("http://www.test.com/index.html"), "theme"),
            Some("dark".to_string())
        );
        assert!(!jar.add(&url("http://api.test.com/"), "evil=1; Domain=other.com"));
        assert_eq!(jar.len(), 1);
    }

    #[test]
    fn cookies_are_replaced_and_removed() {
        let jar = CookieContainer::new();
        let home = url("http://test.com/");
        jar.add(&home, "a=1; Path=/");
        jar.add(&home, "b=2; Path=/");
        jar.add(&home, "a=3; Path=/");
        assert_eq!(jar.get(&home, "a"), Some("3".to_string()));
        jar.add(&home, "b=; Path=/");
        assert_eq!(jar.cookie_header(&home), Some("a=3".to_string()));
        jar.clear();
        assert!(jar.is_empty());
    }

    #[test]
    fn secure_cookies_need_https() {
        let jar = CookieContainer::new();
        jar.add(&url("https://test.com/"), "token=t; Secure; Path=/");
        assert_eq!(jar.cookie_header(&url("http://test.com/")), None);
        assert_eq!(
            jar.cookie_header(&url("https://test.com/")),
            Some("token=t".to_string())
        );
    }

    #[test]
    fn path_matching() {
        assert!(path_matches("/docs", "/docs"));
        assert!(path_matches("/docs/web", "/docs"));
        assert!(path_matches("/docs/web", "/docs/"));
        assert!(!path_matches("/docsets", "/docs"));
        assert!(!path_matches("/", "/docs"));
    }
}
