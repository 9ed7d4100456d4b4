//! ay.by search-results source.
//!
//! Fetches a search page over HTTP with [`reqwest`] and cuts the
//! `lots-table` list into [`ListingItem`]s.  The extraction step is a pure
//! function so tests can run it against captured markup.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tracing::debug;

use super::html;
use super::{ItemSource, ListingItem, Price};
use crate::error::SourceError;

const LIST_OPEN: &str = r#"<ul id="lots-table""#;
const CARD_CLASS: &str = "item-type-card__card";
const LINK_CLASS: &str = "item-type-card__link";
const TITLE_CLASS: &str = "item-type-card__title";
const PRICE_CLASS: &str = "c-hot";

/// An ay.by listing source.
pub struct AySource {
    client: Client,
}

impl AySource {
    /// Create a source whose requests give up after `timeout`.
    pub fn new(user_agent: &str, timeout: Duration) -> Result<Self, SourceError> {
        let client = Client::builder()
            .user_agent(user_agent)
            .timeout(timeout)
            .build()?;
        Ok(Self { client })
    }

    /// Extract every card from a search results page, in page order.
    ///
    /// A card without a link or with a price that does not parse fails the
    /// whole page, so a half-read card never becomes an identity of empty
    /// values.
    pub fn parse_page(page: &str) -> Result<Vec<ListingItem>, SourceError> {
        let list = html::element(page, LIST_OPEN)
            .ok_or_else(|| SourceError::Extraction("no lots-table list".into()))?;

        html::elements(list, "<li")
            .into_iter()
            .filter(|li| has_class(li, CARD_CLASS))
            .map(parse_card)
            .collect()
    }
}

fn parse_card(card: &str) -> Result<ListingItem, SourceError> {
    let link = find_by_class(card, "<a", LINK_CLASS)
        .and_then(|a| html::attr(a, "href"))
        .filter(|href| !href.trim().is_empty())
        .ok_or_else(|| SourceError::Extraction("card without a link".into()))?;

    let title = find_by_class(card, "<", TITLE_CLASS)
        .map(html::text)
        .filter(|t| !t.is_empty())
        .unwrap_or_else(|| "(untitled)".to_string());

    let price_text = find_by_class(card, "<", PRICE_CLASS)
        .and_then(|hot| html::element(hot, "<strong"))
        .map(html::text)
        .ok_or_else(|| SourceError::Extraction(format!("card {link} has no price")))?;
    let price: Price = price_text.parse()?;

    Ok(ListingItem::new(link.trim(), title, price))
}

/// First element inside `block` opened with `tag_prefix` that carries `class`.
fn find_by_class<'a>(block: &'a str, tag_prefix: &str, class: &str) -> Option<&'a str> {
    let needle = class.to_ascii_lowercase();
    let lc = block.to_ascii_lowercase();

    let mut from = 0;
    while let Some(rel) = lc[from..].find(&needle) {
        let hit = from + rel;
        from = hit + needle.len();

        let tag_start = lc[..hit].rfind('<')?;
        if lc[tag_start..hit].contains('>') || !lc[tag_start..].starts_with(tag_prefix) {
            continue;
        }
        let tag = tag_open_pattern(&block[tag_start..])?;
        if let Some(el) = html::element(&block[tag_start..], &tag) {
            if has_class(el, class) {
                return Some(el);
            }
        }
    }
    None
}

/// `"<tag"` of the element starting at `block`.
fn tag_open_pattern(block: &str) -> Option<String> {
    let name_len = block[1..].find(|c: char| !c.is_ascii_alphanumeric())?;
    Some(block[..=name_len].to_string())
}

fn has_class(el: &str, class: &str) -> bool {
    html::attr(el, "class")
        .map(|classes| classes.split_whitespace().any(|c| c.eq_ignore_ascii_case(class)))
        .unwrap_or(false)
}

#[async_trait]
impl ItemSource for AySource {
    fn name(&self) -> &str {
        "ay.by"
    }

    async fn fetch_listings(&self, url: &str) -> Result<Vec<ListingItem>, SourceError> {
        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(SourceError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let body = response.text().await?;
        let items = Self::parse_page(&body)?;
        debug!(url, count = items.len(), "parsed listing page");
        Ok(items)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
