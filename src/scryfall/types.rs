//! Scryfall card types.

use std::collections::HashMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Image formats in order of preference, best first.
const IMAGE_PREFERENCE: [&str; 4] = ["png", "large", "normal", "small"];

/// A card object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Card {
    /// Object type, `"card"` for cards
    pub object: String,
    /// Scryfall ID
    pub id: String,
    /// Oracle ID shared by all printings
    #[serde(default)]
    pub oracle_id: Option<String>,
    /// Card name (multi-faced cards use `"Front // Back"`)
    #[serde(default)]
    pub name: String,
    /// Language code
    #[serde(default)]
    pub lang: String,
    /// Release date (`YYYY-MM-DD`)
    #[serde(default)]
    pub released_at: String,
    /// API URI for this card
    #[serde(default)]
    pub uri: String,
    /// Scryfall web page for this card
    #[serde(default)]
    pub scryfall_uri: String,
    /// Card layout (e.g., "normal", "transform")
    #[serde(default)]
    pub layout: String,
    /// Image URIs by format
    #[serde(default)]
    pub image_uris: Option<HashMap<String, String>>,
    /// Faces for multi-faced cards
    #[serde(default)]
    pub card_faces: Vec<CardFace>,
    /// Mana cost (e.g., "{1}{R}")
    #[serde(default)]
    pub mana_cost: Option<String>,
    /// Converted mana cost / mana value
    #[serde(default)]
    pub cmc: f64,
    /// Type line
    #[serde(default)]
    pub type_line: String,
    /// Oracle rules text
    #[serde(default)]
    pub oracle_text: Option<String>,
    /// Colors
    #[serde(default)]
    pub colors: Vec<String>,
    /// Set name
    #[serde(default)]
    pub set_name: String,
    /// Set code
    #[serde(default, rename = "set")]
    pub set_code: String,
    /// Rarity
    #[serde(default)]
    pub rarity: String,
    /// Illustrator
    #[serde(default)]
    pub artist: Option<String>,
    /// Market prices
    #[serde(default)]
    pub prices: Prices,
    /// Image availability ("highres_scan", "lowres", "missing", ...)
    #[serde(default)]
    pub image_status: String,
    /// Whether a high-resolution image exists
    #[serde(default)]
    pub highres_image: bool,
}

impl Card {
    /// Highest quality image URL available, preferring the first face of
    /// multi-faced cards.
    pub fn best_image_url(&self) -> Option<&str> {
        let image_uris = self
            .card_faces
            .first()
            .and_then(|face| face.image_uris.as_ref())
            .or(self.image_uris.as_ref())?;

        IMAGE_PREFERENCE
            .iter()
            .find_map(|format| image_uris.get(*format))
            .or_else(|| image_uris.values().next())
            .map(String::as_str)
    }

    /// Name to show to users.
    pub fn display_name(&self) -> String {
        if !self.name.is_empty() {
            return self.name.clone();
        }

        if !self.card_faces.is_empty() {
            return self
                .card_faces
                .iter()
                .map(|face| face.name.as_str())
                .collect::<Vec<_>>()
                .join(" // ");
        }

        "Unknown Card".to_string()
    }

    /// Check if the object is a card with enough data to display.
    pub fn is_valid(&self) -> bool {
        self.object == "card" && (!self.name.is_empty() || !self.card_faces.is_empty())
    }

    /// Check if at least one image is available.
    pub fn has_image(&self) -> bool {
        self.best_image_url().is_some()
    }
}

/// One face of a multi-faced card.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CardFace {
    #[serde(default)]
    pub object: String,
    pub name: String,
    #[serde(default)]
    pub mana_cost: String,
    #[serde(default)]
    pub type_line: String,
    #[serde(default)]
    pub oracle_text: Option<String>,
    #[serde(default)]
    pub colors: Vec<String>,
    #[serde(default)]
    pub artist: Option<String>,
    #[serde(default)]
    pub image_uris: Option<HashMap<String, String>>,
}

/// Card prices. Scryfall sends them as decimal strings or `null`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Prices {
    #[serde(default, with = "rust_decimal::serde::str_option")]
    pub usd: Option<Decimal>,
    #[serde(default, with = "rust_decimal::serde::str_option")]
    pub usd_foil: Option<Decimal>,
    #[serde(default, with = "rust_decimal::serde::str_option")]
    pub eur: Option<Decimal>,
    #[serde(default, with = "rust_decimal::serde::str_option")]
    pub eur_foil: Option<Decimal>,
    #[serde(default, with = "rust_decimal::serde::str_option")]
    pub tix: Option<Decimal>,
}

/// A page of search results.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    #[serde(default)]
    pub object: String,
    #[serde(default)]
    pub total_cards: u32,
    #[serde(default)]
    pub has_more: bool,
    #[serde(default)]
    pub next_page: Option<String>,
    #[serde(default)]
    pub data: Vec<Card>,
}
