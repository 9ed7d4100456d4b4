//! The core data types shared by every listing source.
//!
//! `ListingItem` is one card scraped from a listing page.  Sources convert
//! whatever markup they read into `ListingItem`s so the tracking loop can stay
//! source-agnostic.
//!
//! ## Identity
//!
//! Two items are "the same observation" when their link **and** price match.
//! The title is display-only and never takes part in equality, so a seller
//! editing the headline does not trigger a notification, while a price change
//! on the same link does.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

/// Returned when a price string cannot be turned into a [`Price`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unparseable price {0:?}")]
pub struct PriceParseError(pub String);

/// A non-negative amount in the source currency, stored in hundredths.
///
/// Keeping minor units as an integer makes prices hashable and exact, which
/// the de-duplication set relies on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Price(u64);

impl Price {
    pub const fn from_minor(minor: u64) -> Self {
        Self(minor)
    }

    pub const fn minor(self) -> u64 {
        self.0
    }
}

impl FromStr for Price {
    type Err = PriceParseError;

    /// Accepts the source locale (`"1 234,56 р."`) as well as plain
    /// `"1234.56"`.  Group separators may be ordinary or non-breaking spaces.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || PriceParseError(s.to_string());

        let cleaned = s.replace("&nbsp;", " ");
        // Keep the leading numeric run; anything after it is a currency word.
        let numeric: String = cleaned
            .trim()
            .chars()
            .take_while(|c| c.is_ascii_digit() || matches!(c, ',' | '.') || c.is_whitespace())
            .filter(|c| !c.is_whitespace())
            .collect();

        let (whole, frac) = match numeric.split_once(|c: char| c == ',' || c == '.') {
            Some((w, f)) => (w, f),
            None => (numeric.as_str(), ""),
        };

        if whole.is_empty()
            || frac.len() > 2
            || !whole.chars().all(|c| c.is_ascii_digit())
            || !frac.chars().all(|c| c.is_ascii_digit())
        {
            return Err(err());
        }

        let whole: u64 = whole.parse().map_err(|_| err())?;
        let frac: u64 = match frac.len() {
            0 => 0,
            1 => frac.parse::<u64>().map_err(|_| err())? * 10,
            _ => frac.parse().map_err(|_| err())?,
        };

        whole
            .checked_mul(100)
            .and_then(|w| w.checked_add(frac))
            .map(Price)
            .ok_or_else(err)
    }
}

impl fmt::Display for Price {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:02}", self.0 / 100, self.0 % 100)
    }
}

/// De-duplication key: link plus price.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ItemIdentity {
    pub link: String,
    pub price: Price,
}

/// A single listing card, normalised from any source.
#[derive(Debug, Clone)]
pub struct ListingItem {
    /// Absolute or site-relative URL of the listing.
    pub link: String,

    /// Human-readable headline.
    pub title: String,

    /// Asking price at the time of the poll.
    pub price: Price,
}

impl ListingItem {
    pub fn new(link: impl Into<String>, title: impl Into<String>, price: Price) -> Self {
        Self {
            link: link.into(),
            title: title.into(),
            price,
        }
    }

    pub fn identity(&self) -> ItemIdentity {
        ItemIdentity {
            link: self.link.clone(),
            price: self.price,
        }
    }

    /// One line of a notification batch, newline included.
    pub fn display_line(&self) -> String {
        format!("{self}\t{}\n", self.link)
    }
}

impl PartialEq for ListingItem {
    fn eq(&self, other: &Self) -> bool {
        self.link == other.link && self.price == other.price
    }
}

impl Eq for ListingItem {}

impl fmt::Display for ListingItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.title, self.price)
    }
}

/// Inclusive price range a subscriber is interested in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PriceBand {
    /// `None` means there is no floor.
    pub min: Option<Price>,
    pub max: Price,
}

impl PriceBand {
    /// Returns `None` when the floor is above the ceiling.
    pub fn new(min: Option<Price>, max: Price) -> Option<Self> {
        match min {
            Some(m) if m > max => None,
            _ => Some(Self { min, max }),
        }
    }

    pub fn contains(&self, price: Price) -> bool {
        price <= self.max && self.min.map_or(true, |m| price >= m)
    }
}

impl fmt::Display for PriceBand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.min {
            Some(min) => write!(f, "{min}..={}", self.max),
            None => write!(f, "..={}", self.max),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
