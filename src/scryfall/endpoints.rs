//! Scryfall REST API endpoint constants.

/// Base URL for the Scryfall REST API.
pub const SCRYFALL_BASE_URL: &str = "https://api.scryfall.com";

/// Look up a single card by name (`fuzzy` or `exact` parameter).
pub const CARDS_NAMED: &str = "/cards/named";
/// Get a random card.
pub const CARDS_RANDOM: &str = "/cards/random";
/// Full-text card search (`q` parameter).
pub const CARDS_SEARCH: &str = "/cards/search";
