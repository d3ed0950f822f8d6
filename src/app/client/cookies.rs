//! Cookie store persisted between runs
//!
//! The identity provider keeps its session in cookies; saving them lets a later
//! run go straight from the launch endpoint to the token redirect without
//! filling in the login form again. The on-disk format is a JSON object
//! `{domain: {name: value}}`.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use reqwest::cookie::CookieStore;
use reqwest::header::HeaderValue;
use url::Url;

use crate::errors::{AuthError, AuthResult};

type CookieMap = BTreeMap<String, BTreeMap<String, String>>;

/// Domain-keyed cookie store implementing reqwest's `CookieStore`
#[derive(Debug, Default)]
pub struct PersistentCookieJar {
    cookies: RwLock<CookieMap>,
}

impl PersistentCookieJar {
    /// Loads the jar from `path`; a missing file yields an empty jar
    pub fn load(path: &Path) -> AuthResult<Self> {
        if !path.exists() {
            tracing::debug!("No cookie jar at {}, starting empty", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| AuthError::CookieJar {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        let cookies: CookieMap =
            serde_json::from_str(&content).map_err(|e| AuthError::CookieJar {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?;

        tracing::debug!(
            "Loaded cookies for {} domains from {}",
            cookies.len(),
            path.display()
        );
        Ok(Self {
            cookies: RwLock::new(cookies),
        })
    }

    /// Writes the jar to `path` as pretty-printed JSON
    pub fn save(&self, path: &Path) -> AuthResult<()> {
        let jar_error = |reason: String| AuthError::CookieJar {
            path: path.to_path_buf(),
            reason,
        };
        let json =
            serde_json::to_string_pretty(&*self.read()).map_err(|e| jar_error(e.to_string()))?;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| jar_error(e.to_string()))?;
        }
        std::fs::write(path, json).map_err(|e| jar_error(e.to_string()))?;
        tracing::debug!("Saved cookie jar to {}", path.display());
        Ok(())
    }

    /// Number of cookies across all domains
    pub fn len(&self) -> usize {
        self.read().values().map(BTreeMap::len).sum()
    }

    /// Whether the jar holds no cookies
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn read(&self) -> RwLockReadGuard<'_, CookieMap> {
        self.cookies.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, CookieMap> {
        self.cookies.write().unwrap_or_else(|e| e.into_inner())
    }

    fn store(&self, header: &str, host: &str) {
        let mut parts = header.split(';');
        let Some((name, value)) = parts.next().and_then(|pair| pair.split_once('=')) else {
            return;
        };
        let name = name.trim().to_string();
        let value = value.trim().to_string();

        let mut domain = host.to_string();
        let mut expired = value.is_empty();
        for attribute in parts {
            let (key, attr_value) = attribute.split_once('=').unwrap_or((attribute, ""));
            match key.trim().to_ascii_lowercase().as_str() {
                "domain" => {
                    let candidate = attr_value.trim().trim_start_matches('.').to_ascii_lowercase();
                    if domain_matches(host, &candidate) {
                        domain = candidate;
                    }
                }
                "max-age" => expired |= attr_value.trim().starts_with(['0', '-']),
                _ => {}
            }
        }

        let mut cookies = self.write();
        if expired {
            if let Some(entries) = cookies.get_mut(&domain) {
                entries.remove(&name);
            }
        } else {
            cookies.entry(domain).or_default().insert(name, value);
        }
    }
}

/// `host` equals `domain` or is a subdomain of it
fn domain_matches(host: &str, domain: &str) -> bool {
    host == domain
        || host
            .strip_suffix(domain)
            .is_some_and(|prefix| prefix.ends_with('.'))
}

impl CookieStore for PersistentCookieJar {
    fn set_cookies(&self, cookie_headers: &mut dyn Iterator<Item = &HeaderValue>, url: &Url) {
        let Some(host) = url.host_str() else {
            return;
        };
        let host = host.to_ascii_lowercase();
        for header in cookie_headers {
            if let Ok(header) = header.to_str() {
                self.store(header, &host);
            }
        }
    }

    fn cookies(&self, url: &Url) -> Option<HeaderValue> {
        let host = url.host_str()?.to_ascii_lowercase();
        let cookies = self.read();
        let header = cookies
            .iter()
            .filter(|(domain, _)| domain_matches(&host, domain))
            .flat_map(|(_, entries)| entries.iter())
            .map(|(name, value)| format!("{name}={value}"))
            .collect::<Vec<_>>()
            .join("; ");

        if header.is_empty() {
            None
        } else {
            HeaderValue::from_str(&header).ok()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn set(jar: &PersistentCookieJar, url: &str, header: &'static str) {
        let value = HeaderValue::from_static(header);
        let url = Url::parse(url).unwrap();
        jar.set_cookies(&mut std::iter::once(&value), &url);
    }

    /// Test domain scoping
    ///
    /// Verifies that host-only cookies stay on their host while cookies with a
    /// Domain attribute reach subdomains.
    #[test]
    fn test_cookie_domain_scoping() {
        let jar = PersistentCookieJar::default();
        set(&jar, "https://idp.unimib.it/login", "JSESSIONID=abc; Path=/; HttpOnly");
        set(&jar, "https://elearning.unimib.it/", "shared=1; Domain=.unimib.it");

        let idp = jar.cookies(&Url::parse("https://idp.unimib.it/x").unwrap()).unwrap();
        assert_eq!(idp.to_str().unwrap(), "JSESSIONID=abc; shared=1");

        let moodle = jar
            .cookies(&Url::parse("https://elearning.unimib.it/").unwrap())
            .unwrap();
        assert_eq!(moodle.to_str().unwrap(), "shared=1");

        assert!(jar.cookies(&Url::parse("https://example.com/").unwrap()).is_none());
    }

    #[test]
    fn test_cookie_expiry_removes_entry() {
        let jar = PersistentCookieJar::default();
        set(&jar, "https://idp.unimib.it/", "token=abc");
        assert_eq!(jar.len(), 1);
        set(&jar, "https://idp.unimib.it/", "token=gone; Max-Age=0");
        assert!(jar.is_empty());
    }

    #[test]
    fn test_foreign_domain_attribute_is_ignored() {
        let jar = PersistentCookieJar::default();
        set(&jar, "https://idp.unimib.it/", "evil=1; Domain=example.com");
        assert!(jar.cookies(&Url::parse("https://example.com/").unwrap()).is_none());
        assert!(jar.cookies(&Url::parse("https://idp.unimib.it/").unwrap()).is_some());
    }

    /// Test persistence round trip
    ///
    /// Ensures a saved jar loads back with the same cookies and that a missing
    /// file yields an empty jar.
    #[test]
    fn test_save_and_load() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("cookies.json");

        assert!(PersistentCookieJar::load(&path).unwrap().is_empty());

        let jar = PersistentCookieJar::default();
        set(&jar, "https://idp.unimib.it/", "a=1");
        set(&jar, "https://elearning.unimib.it/", "MoodleSession=xyz");
        jar.save(&path).unwrap();

        let raw: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(raw["elearning.unimib.it"]["MoodleSession"], "xyz");

        let loaded = PersistentCookieJar::load(&path).unwrap();
        assert_eq!(loaded.len(), 2);
    }

    #[test]
    fn test_load_rejects_garbage() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("cookies.json");
        std::fs::write(&path, "not json").unwrap();
        assert!(matches!(
            PersistentCookieJar::load(&path),
            Err(AuthError::CookieJar { .. })
        ));
    }
}
