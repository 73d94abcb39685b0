// src/services/extractor.rs

//! Listing extraction from rendered catalog pages.
//!
//! Extraction is a pure function of the page markup: no network, no clock.
//! Saved pages can therefore be replayed against it in tests.

use std::collections::HashSet;

use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use url::Url;

use crate::error::{AppError, Result};
use crate::models::{ExtractorConfig, Listing, NO_IMAGE};
use crate::utils::{normalize_whitespace, resolve_url};

/// What one page yielded.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageContent {
    /// Complete listings, in page order, unique by identity
    pub listings: Vec<Listing>,
    /// The pagination control says there is no next page
    pub next_disabled: bool,
}

impl PageContent {
    /// Whether crawling should continue past this page.
    ///
    /// An empty page ends pagination regardless of what the controls say.
    pub fn has_more(&self) -> bool {
        !self.listings.is_empty() && !self.next_disabled
    }
}

/// Turns page markup into listing candidates.
pub trait PageExtractor: Send + Sync {
    /// Extract listings from one page.
    ///
    /// Candidates without an identity, title or price are dropped silently.
    /// An error means the page did not look like a catalog page at all and
    /// is worth loading again.
    fn extract(&self, page: u32, html: &str) -> Result<PageContent>;
}

/// CSS-selector driven extractor.
pub struct SelectorExtractor {
    card: Selector,
    card_source: String,
    title: Selector,
    model: Selector,
    category: Selector,
    price: Selector,
    location: Selector,
    image_link: Selector,
    image_style: Selector,
    next: Selector,
    id_attr: String,
    id_pattern: Regex,
    background_url: Regex,
    disabled_class: String,
    require_cards: bool,
    base: Option<Url>,
}

impl SelectorExtractor {
    /// Compile all selectors from configuration.
    pub fn new(config: &ExtractorConfig) -> Result<Self> {
        Ok(Self {
            card: Self::parse_selector(&config.card_selector)?,
            card_source: config.card_selector.clone(),
            title: Self::parse_selector(&config.title_selector)?,
            model: Self::parse_selector(&config.model_selector)?,
            category: Self::parse_selector(&config.category_selector)?,
            price: Self::parse_selector(&config.price_selector)?,
            location: Self::parse_selector(&config.location_selector)?,
            image_link: Self::parse_selector(&config.image_link_selector)?,
            image_style: Self::parse_selector(&config.image_style_selector)?,
            next: Self::parse_selector(&config.next_selector)?,
            id_attr: config.id_attr.clone(),
            id_pattern: Regex::new(&config.id_pattern)?,
            background_url: Regex::new(r#"url\(['"]?(.*?)['"]?\)"#)?,
            disabled_class: config.disabled_class.clone(),
            require_cards: config.require_cards,
            base: None,
        })
    }

    /// Resolve relative image links against this URL.
    pub fn with_base(mut self, base: Url) -> Self {
        self.base = Some(base);
        self
    }

    fn parse_card(&self, card: ElementRef<'_>) -> Option<Listing> {
        let listing = Listing {
            identity: self.identity_of(card)?,
            title: Self::text_of(card, &self.title),
            model: Self::text_of(card, &self.model),
            category: Self::text_of(card, &self.category),
            price: Self::text_of(card, &self.price),
            image: self.image_of(card),
            location: Self::text_of(card, &self.location),
        };
        listing.is_complete().then_some(listing)
    }

    /// First attribute value on the card (or inside it) that matches the id pattern.
    fn identity_of(&self, card: ElementRef<'_>) -> Option<String> {
        let raw = card
            .descendants()
            .filter_map(ElementRef::wrap)
            .find_map(|el| el.value().attr(&self.id_attr))?;
        let caps = self.id_pattern.captures(raw)?;
        let id = caps.get(1).or_else(|| caps.get(0))?.as_str().trim();
        (!id.is_empty()).then(|| id.to_string())
    }

    fn image_of(&self, card: ElementRef<'_>) -> String {
        let href = card
            .select(&self.image_link)
            .next()
            .and_then(|a| a.value().attr("href"))
            .filter(|href| !href.trim().is_empty());

        let raw = match href {
            Some(href) => Some(href.to_string()),
            None => card
                .select(&self.image_style)
                .next()
                .and_then(|div| div.value().attr("style"))
                .and_then(|style| self.background_url.captures(style))
                .and_then(|caps| caps.get(1))
                .map(|m| m.as_str().to_string())
                .filter(|src| !src.is_empty()),
        };

        match (raw, &self.base) {
            (Some(src), Some(base)) => resolve_url(base, &src),
            (Some(src), None) => src,
            (None, _) => NO_IMAGE.to_string(),
        }
    }

    fn is_disabled(&self, control: ElementRef<'_>) -> bool {
        control.value().classes().any(|c| c == self.disabled_class)
            || control
                .descendants()
                .filter_map(ElementRef::wrap)
                .any(|el| el.value().attr("aria-disabled") == Some("true"))
    }

    fn text_of(card: ElementRef<'_>, selector: &Selector) -> String {
        card.select(selector)
            .next()
            .map(|el| normalize_whitespace(&el.text().collect::<String>()))
            .unwrap_or_default()
    }

    fn parse_selector(s: &str) -> Result<Selector> {
        Selector::parse(s).map_err(|e| AppError::selector(s, format!("{e:?}")))
    }
}

impl PageExtractor for SelectorExtractor {
    fn extract(&self, page: u32, html: &str) -> Result<PageContent> {
        let document = Html::parse_document(html);
        let cards: Vec<ElementRef<'_>> = document.select(&self.card).collect();

        if cards.is_empty() && self.require_cards {
            return Err(AppError::ContentMissing {
                page,
                selector: self.card_source.clone(),
            });
        }

        let mut seen = HashSet::new();
        let listings = cards
            .into_iter()
            .filter_map(|card| self.parse_card(card))
            .filter(|listing| seen.insert(listing.identity.clone()))
            .collect();

        let next_disabled = document
            .select(&self.next)
            .next()
            .is_some_and(|control| self.is_disabled(control));

        Ok(PageContent {
            listings,
            next_disabled,
        })
    }
}
