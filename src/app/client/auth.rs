//! UniMiB single sign-on
//!
//! Moodle hands out web-service tokens to its mobile app through the launch
//! endpoint: once the browser session is authenticated, the endpoint redirects
//! to `moodlemobile://token=<base64>`. This module drives that flow: the launch
//! request, the Moodle login page, the identity-provider form and the
//! "JavaScript disabled" auto-submit pages in between.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use rand::Rng;
use reqwest::header::{ACCEPT, LOCATION};
use reqwest::{Response, StatusCode};
use scraper::{ElementRef, Html, Selector};
use url::Url;

use super::http::HttpHandler;
use crate::constants::{auth, http, moodle};
use crate::errors::{AuthError, AuthResult};

/// Web-service credentials issued by the launch endpoint
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MobileToken {
    pub site_id: String,
    pub token: String,
    pub private_token: Option<String>,
}

/// Snapshot of a response taken before its body is consumed
#[derive(Debug, Clone)]
pub struct Page {
    pub url: Url,
    pub status: StatusCode,
    pub location: Option<String>,
    pub body: String,
}

impl Page {
    /// Reads status, final URL, `Location` header and body of a response
    pub async fn read(response: Response) -> AuthResult<Self> {
        let url = response.url().clone();
        let status = response.status();
        let location = response
            .headers()
            .get(LOCATION)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);
        let body = response.text().await?;
        Ok(Self {
            url,
            status,
            location,
            body,
        })
    }

    /// The token redirect this page carries, if any
    fn token_redirect(&self) -> Option<&str> {
        self.location
            .as_deref()
            .filter(|location| AuthHandler::is_token_redirect(location))
    }
}

/// HTML form ready to be submitted
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormSubmission {
    pub action: Url,
    pub fields: Vec<(String, String)>,
}

/// Handles the SSO login flow
pub struct AuthHandler;

impl AuthHandler {
    /// Obtains a web-service token for `username`
    ///
    /// `launch` must not follow redirects; `browser` follows HTTP(S) redirects
    /// and stops at the `moodlemobile://` hand-off. Both share one cookie jar, so
    /// a still-valid identity-provider session skips the login form entirely.
    ///
    /// # Errors
    ///
    /// Returns `AuthError` if any hop fails, an expected page element is
    /// missing, or the flow does not end in a token redirect.
    pub async fn authenticate(
        launch: &HttpHandler,
        browser: &HttpHandler,
        base_url: &Url,
        username: &str,
        password: &str,
    ) -> AuthResult<MobileToken> {
        let passport = rand::thread_rng().gen_range(auth::PASSPORT_MIN..auth::PASSPORT_MAX);
        let launch_url = Self::launch_url(base_url, passport)?;
        tracing::info!("Requesting web-service token from {}", base_url);

        let page = Page::read(launch.get_response(&launch_url).await?).await?;
        if !page.status.is_redirection() {
            return Err(AuthError::LaunchFailed {
                status: page.status.as_u16(),
            });
        }
        if let Some(location) = page.token_redirect() {
            tracing::info!("Reused existing session");
            return Self::decode_launch_redirect(location);
        }

        let location = page.location.as_deref().ok_or_else(|| AuthError::InvalidRedirect {
            location: String::new(),
        })?;
        let login_url = Self::resolve(&page.url, location)?;
        tracing::debug!("Launch redirected to {}", login_url);

        let page = Self::skip_continue(browser, Self::get_html(browser, &login_url).await?).await?;
        if let Some(location) = page.token_redirect() {
            return Self::decode_launch_redirect(location);
        }

        let idp_url = Self::extract_link(&page.body, &page.url, auth::SAML_LINK_SELECTOR)?;
        tracing::debug!("Following identity provider link {}", idp_url);
        let page = Self::skip_continue(browser, Self::get_html(browser, &idp_url).await?).await?;
        if let Some(location) = page.token_redirect() {
            return Self::decode_launch_redirect(location);
        }

        tracing::info!("Signing in as {}", username);
        let form = Self::extract_login_form(&page.body, &page.url, username, password)?;
        let page = Self::skip_continue(browser, Self::submit(browser, &form).await?).await?;

        match page.token_redirect() {
            Some(location) => Self::decode_launch_redirect(location),
            None if page.body.contains(auth::USERNAME_FIELD) => {
                tracing::warn!("Identity provider showed the login form again");
                Err(AuthError::LoginFailed)
            }
            None => Err(AuthError::InvalidRedirect {
                location: page.location.unwrap_or_else(|| page.url.to_string()),
            }),
        }
    }

    /// Builds the launch endpoint URL
    pub fn launch_url(base_url: &Url, passport: f64) -> AuthResult<Url> {
        let mut url = base_url
            .join(moodle::MOBILE_LAUNCH_PATH)
            .map_err(|_| AuthError::InvalidUrl {
                url: base_url.to_string(),
            })?;
        url.query_pairs_mut()
            .append_pair("service", moodle::MOBILE_SERVICE)
            .append_pair("passport", &passport.to_string())
            .append_pair("urlscheme", moodle::MOBILE_URL_SCHEME);
        Ok(url)
    }

    /// Whether `location` is the mobile-app hand-off
    pub fn is_token_redirect(location: &str) -> bool {
        location
            .strip_prefix(moodle::MOBILE_URL_SCHEME)
            .is_some_and(|rest| rest.starts_with("://"))
    }

    /// Decodes `moodlemobile://token=<base64>` into its parts
    pub fn decode_launch_redirect(location: &str) -> AuthResult<MobileToken> {
        let payload = location
            .split_once("token=")
            .map(|(_, rest)| rest.split('&').next().unwrap_or(rest))
            .ok_or_else(|| AuthError::TokenDecode {
                reason: "redirect has no token parameter".to_string(),
            })?;

        let decoded = STANDARD
            .decode(payload.trim())
            .map_err(|e| AuthError::TokenDecode {
                reason: e.to_string(),
            })?;
        let decoded = String::from_utf8(decoded).map_err(|e| AuthError::TokenDecode {
            reason: e.to_string(),
        })?;

        let mut parts = decoded.split(moodle::TOKEN_SEPARATOR);
        match (parts.next(), parts.next()) {
            (Some(site_id), Some(token)) if !token.is_empty() => Ok(MobileToken {
                site_id: site_id.to_string(),
                token: token.to_string(),
                private_token: parts.next().filter(|p| !p.is_empty()).map(str::to_string),
            }),
            _ => Err(AuthError::TokenDecode {
                reason: "payload is not siteid:::token".to_string(),
            }),
        }
    }

    async fn get_html(browser: &HttpHandler, url: &Url) -> AuthResult<Response> {
        Ok(browser
            .send(|client| client.get(url.clone()).header(ACCEPT, http::HTML_ACCEPT))
            .await?)
    }

    async fn submit(browser: &HttpHandler, form: &FormSubmission) -> AuthResult<Response> {
        tracing::debug!("Submitting form to {}", form.action);
        Ok(browser.post_form(&form.action, &form.fields).await?)
    }

    /// Submits "JavaScript disabled" continuation forms until a real page shows up
    async fn skip_continue(browser: &HttpHandler, response: Response) -> AuthResult<Page> {
        let mut page = Page::read(response).await?;
        for _ in 0..auth::MAX_CONTINUE_FORMS {
            if !page.body.contains(auth::NOSCRIPT_MARKER) {
                return Ok(page);
            }
            let form = Self::extract_continue_form(&page.body, &page.url)?;
            page = Page::read(Self::submit(browser, &form).await?).await?;
        }
        Err(AuthError::TooManyContinueForms {
            count: auth::MAX_CONTINUE_FORMS,
        })
    }

    fn resolve(base: &Url, reference: &str) -> AuthResult<Url> {
        base.join(reference).map_err(|_| AuthError::InvalidUrl {
            url: reference.to_string(),
        })
    }

    fn selector(css: &str) -> AuthResult<Selector> {
        Selector::parse(css).map_err(|_| AuthError::ElementNotFound {
            selector: css.to_string(),
        })
    }

    /// Extracts the `href` of the first element matching `css`
    pub fn extract_link(html: &str, page_url: &Url, css: &str) -> AuthResult<Url> {
        let document = Html::parse_document(html);
        let selector = Self::selector(css)?;
        let href = document
            .select(&selector)
            .next()
            .and_then(|element| element.value().attr("href"))
            .ok_or_else(|| AuthError::ElementNotFound {
                selector: css.to_string(),
            })?;
        Self::resolve(page_url, href)
    }

    /// Extracts the first form of an auto-submit page
    pub fn extract_continue_form(html: &str, page_url: &Url) -> AuthResult<FormSubmission> {
        let document = Html::parse_document(html);
        let form_selector = Self::selector("form")?;
        let form = document
            .select(&form_selector)
            .next()
            .ok_or_else(|| AuthError::ElementNotFound {
                selector: "form".to_string(),
            })?;
        Self::form_submission(form, page_url)
    }

    /// Extracts the identity-provider login form with the credentials filled in
    pub fn extract_login_form(
        html: &str,
        page_url: &Url,
        username: &str,
        password: &str,
    ) -> AuthResult<FormSubmission> {
        let username_css = format!("input[name='{}']", auth::USERNAME_FIELD);
        let document = Html::parse_document(html);
        let form_selector = Self::selector("form")?;
        let username_selector = Self::selector(&username_css)?;

        let form = document
            .select(&form_selector)
            .find(|form| form.select(&username_selector).next().is_some())
            .ok_or(AuthError::ElementNotFound {
                selector: username_css,
            })?;

        let mut submission = Self::form_submission(form, page_url)?;
        submission
            .fields
            .retain(|(name, _)| name != auth::USERNAME_FIELD && name != auth::PASSWORD_FIELD);
        submission
            .fields
            .push((auth::USERNAME_FIELD.to_string(), username.to_string()));
        submission
            .fields
            .push((auth::PASSWORD_FIELD.to_string(), password.to_string()));
        Ok(submission)
    }

    fn form_submission(form: ElementRef<'_>, page_url: &Url) -> AuthResult<FormSubmission> {
        let input_selector = Self::selector("input[name]")?;
        let action = match form.value().attr("action").map(str::trim) {
            Some(action) if !action.is_empty() => Self::resolve(page_url, action)?,
            _ => page_url.clone(),
        };
        let fields = form
            .select(&input_selector)
            .filter_map(|input| {
                let name = input.value().attr("name")?;
                let value = input.value().attr("value").unwrap_or_default();
                Some((name.to_string(), value.to_string()))
            })
            .collect();
        Ok(FormSubmission { action, fields })
    }
}
