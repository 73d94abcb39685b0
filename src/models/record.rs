//! Catalog listing data structures.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Placeholder stored when a card carries no image.
pub const NO_IMAGE: &str = "No image";

/// A candidate listing as extracted from one page, before it is stamped
/// with where and when it was seen.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Listing {
    /// Site-assigned listing id
    pub identity: String,
    pub title: String,
    pub model: String,
    pub category: String,
    /// Display price, kept as shown on the site
    pub price: String,
    /// Image URL or [`NO_IMAGE`]
    pub image: String,
    pub location: String,
}

impl Listing {
    /// Whether the listing has everything needed to be emitted.
    pub fn is_complete(&self) -> bool {
        !self.identity.trim().is_empty()
            && !self.title.trim().is_empty()
            && !self.price.trim().is_empty()
    }

    /// Stamp the listing with its page link and capture time.
    pub fn into_record(self, source_link: impl Into<String>, observed_at: DateTime<Utc>) -> Record {
        Record {
            identity: self.identity,
            title: self.title,
            model: self.model,
            category: self.category,
            price: self.price,
            image: self.image,
            location: self.location,
            source_link: source_link.into(),
            partition_key: Some(partition_for(observed_at)),
            observed_at,
        }
    }
}

/// A listing observed during a crawl.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Record {
    pub identity: String,
    pub title: String,
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub category: String,
    pub price: String,
    #[serde(default = "no_image")]
    pub image: String,
    #[serde(default)]
    pub location: String,
    /// Catalog page the listing was found on
    #[serde(default)]
    pub source_link: String,
    pub observed_at: DateTime<Utc>,
    /// Observation date tag (`YYYY-MM-DD`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub partition_key: Option<String>,
}

impl Record {
    /// Stable hash over identity, title and price.
    ///
    /// Two observations of the same listing share a fingerprint unless its
    /// title or price was edited in between.
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(format!("{}-{}-{}", self.identity, self.title, self.price));
        hex::encode(hasher.finalize())
    }

    /// Format the record for display using a template.
    ///
    /// Supported placeholders:
    /// - `{identity}`, `{title}`, `{model}`, `{category}`, `{price}`
    /// - `{image}`, `{location}`, `{link}`, `{date}`
    pub fn format(&self, template: &str) -> String {
        template
            .replace("{identity}", &self.identity)
            .replace("{title}", &self.title)
            .replace("{model}", &self.model)
            .replace("{category}", &self.category)
            .replace("{price}", &self.price)
            .replace("{image}", &self.image)
            .replace("{location}", &self.location)
            .replace("{link}", &self.source_link)
            .replace("{date}", self.partition_key.as_deref().unwrap_or(""))
    }

    /// Whether the record carries an image worth attaching.
    pub fn has_image(&self) -> bool {
        self.image != NO_IMAGE && !self.image.is_empty()
    }
}

/// Partition tag for an observation time.
pub fn partition_for(at: DateTime<Utc>) -> String {
    at.format("%Y-%m-%d").to_string()
}

fn no_image() -> String {
    NO_IMAGE.to_string()
}
