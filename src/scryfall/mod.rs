//! Scryfall REST API client.
//!
//! # Trait-based API
//!
//! The [`CardSource`] trait abstracts the two lookups the cache layer needs,
//! enabling mock implementations for testing:
//!
//! ```rust,ignore
//! use card_cache::scryfall::{CardSource, ScryfallClient};
//!
//! async fn show<S: CardSource>(source: &S) -> Result<(), card_cache::LookupError> {
//!     let card = source.fetch_by_key("black lotus").await?;
//!     println!("{}", card.display_name());
//!     Ok(())
//! }
//! ```

mod client;
mod endpoints;
mod traits;
mod types;

pub use client::{DEFAULT_TIMEOUT, ScryfallClient, ScryfallClientBuilder};
pub use endpoints::*;
pub use traits::CardSource;
pub use types::{Card, CardFace, Prices, SearchResult};
