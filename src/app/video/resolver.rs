//! Player page resolution
//!
//! A video module links to a Moodle page embedding a Kaltura player. The
//! player's `source` query parameter carries a media reference containing
//! `entryid/<id>/`; the id is formatted into a direct download URL.

use std::sync::{Arc, OnceLock};

use regex::Regex;
use scraper::{Html, Selector};
use url::Url;

use crate::app::client::HttpFetch;
use crate::constants::video;
use crate::errors::{VideoError, VideoResult};

fn entry_id_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(video::ENTRY_ID_PATTERN).expect("valid entry id regex"))
}

fn player_selector() -> &'static Selector {
    static SELECTOR: OnceLock<Selector> = OnceLock::new();
    SELECTOR.get_or_init(|| Selector::parse(video::PLAYER_SELECTOR).expect("valid player selector"))
}

/// Extracts the Kaltura entry id from a player page
///
/// Returns `Ok(None)` when the player's media reference has no entry id,
/// which means the video cannot be downloaded.
///
/// # Errors
///
/// Returns `VideoError` when the page has no player or the player URL has no
/// media reference.
pub fn extract_entry_id(html: &str, page_url: &Url) -> VideoResult<Option<String>> {
    let document = Html::parse_document(html);
    let src = document
        .select(player_selector())
        .next()
        .and_then(|iframe| iframe.value().attr("src"))
        .ok_or(VideoError::PlayerNotFound)?;

    let player_url = page_url
        .join(src)
        .map_err(|_| VideoError::InvalidPlayerUrl {
            src: src.to_string(),
        })?;

    let source = player_url
        .query_pairs()
        .find(|(name, _)| name == video::SOURCE_PARAM)
        .map(|(_, value)| value.into_owned())
        .ok_or_else(|| VideoError::MissingSource {
            param: video::SOURCE_PARAM.to_string(),
        })?;

    Ok(entry_id_pattern()
        .captures(&source)
        .and_then(|captures| captures.get(1))
        .map(|id| id.as_str().to_string()))
}

/// Formats the direct download URL for `entry_id`
pub fn direct_video_url(template: &str, entry_id: &str) -> String {
    template.replace(video::ENTRY_ID_PLACEHOLDER, entry_id)
}

/// Turns player pages into direct video URLs
#[derive(Clone)]
pub struct VideoResolver {
    fetch: Arc<dyn HttpFetch>,
    url_template: String,
}

impl VideoResolver {
    pub fn new(fetch: Arc<dyn HttpFetch>, url_template: impl Into<String>) -> Self {
        Self {
            fetch,
            url_template: url_template.into(),
        }
    }

    /// Fetches `page_url` and resolves it to a direct URL
    ///
    /// `Ok(None)` means the page embeds a player without a downloadable entry.
    pub async fn resolve(&self, page_url: &Url) -> VideoResult<Option<String>> {
        let html = self.fetch.fetch_page(page_url).await?;
        let entry_id = extract_entry_id(&html, page_url)?;

        match entry_id {
            Some(id) => {
                tracing::debug!("Resolved {} to entry {}", page_url, id);
                Ok(Some(direct_video_url(&self.url_template, &id)))
            }
            None => {
                tracing::info!("No video entry id in player of {}", page_url);
                Ok(None)
            }
        }
    }
}
