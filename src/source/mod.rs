//! Listing source abstraction layer.
//!
//! This module defines the [`ItemSource`] trait and the common
//! [`ListingItem`] type.  Concrete sources live in sub-modules (currently
//! only [`ay`]).
//!
//! ## For contributors — adding a new site
//!
//! 1. Create a new file in this directory (e.g. `kufar.rs`).
//! 2. Define a struct and implement [`ItemSource`] for it.
//! 3. Add `mod kufar;` below and re-export your struct in the `pub use` block.
//! 4. Construct it in `main.rs` and hand it to the registry.
//!
//! Tracking, de-duplication and delivery are all source-agnostic.

mod ay;
mod html;
mod listing_item;

pub use ay::AySource;
pub use listing_item::{ItemIdentity, ListingItem, Price, PriceBand, PriceParseError};

use async_trait::async_trait;

use crate::error::SourceError;

/// Trait that every listing source must implement.
///
/// Each tracking session calls [`fetch_listings()`](ItemSource::fetch_listings)
/// from its own tokio task, so one source instance is shared by many
/// sessions concurrently.
#[async_trait]
pub trait ItemSource: Send + Sync {
    /// Human-readable label used in logs.
    fn name(&self) -> &str;

    /// Fetch the full current set of listings on the page at `url`, in page
    /// order.
    ///
    /// Any failure (network, HTTP status, page layout, price text) is
    /// reported as a single [`SourceError`]; the caller treats them all as
    /// "this poll failed".
    async fn fetch_listings(&self, url: &str) -> Result<Vec<ListingItem>, SourceError>;
}
