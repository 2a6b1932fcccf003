//! Trait for anything that can resolve card lookups.
//!
//! [`CardSource`] is the seam between the cache layer and the remote API.
//! [`ScryfallClient`](crate::scryfall::ScryfallClient) is the real
//! implementation; tests substitute in-memory sources.

use std::future::Future;

use crate::error::LookupError;
use crate::scryfall::Card;

/// Card lookups used by [`CardLookup`](crate::lookup::CardLookup).
pub trait CardSource: Send + Sync {
    /// Resolve a card name (fuzzy match). Used as the cache's fetch function.
    fn fetch_by_key(&self, key: &str) -> impl Future<Output = Result<Card, LookupError>> + Send;

    /// Run a full-text search and return the first matching card.
    fn search_card_first(
        &self,
        query: &str,
    ) -> impl Future<Output = Result<Card, LookupError>> + Send;
}
