use std::time::Duration;

use thiserror::Error;

use crate::source::PriceParseError;

/// Why a poll produced no listing snapshot.
///
/// Every variant is recovered inside the session's poll cycle: the cycle is
/// skipped and the dedup state is left untouched.
#[derive(Error, Debug)]
pub enum SourceError {
    #[error("fetch failed: {0}")]
    Fetch(#[from] reqwest::Error),

    #[error("HTTP {status} from {url}")]
    Status { url: String, status: u16 },

    #[error("no response within {0:?}")]
    Timeout(Duration),

    #[error("page structure not recognised: {0}")]
    Extraction(String),

    #[error(transparent)]
    Price(#[from] PriceParseError),
}

/// The destination transport rejected an outbound batch.
#[derive(Error, Debug)]
#[error("delivery to {destination} failed: {reason}")]
pub struct DeliveryError {
    pub destination: String,
    pub reason: String,
}

/// A user command could not be understood.  The message is shown to the user.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum CommandError {
    #[error("usage: track <min> <max> <url>  or  track <max> <url>")]
    TrackUsage,

    #[error("usage: rm <id>  (ids are listed by ls)")]
    RemoveUsage,

    #[error("{0:?} is not a price")]
    BadPrice(String),

    #[error("minimum price {min} is above maximum {max}")]
    InvertedBand { min: String, max: String },

    #[error("{0:?} is not an http(s) link")]
    BadUrl(String),
}
