pub mod acceptance;
pub mod baseform;
pub mod checkpoint;
pub mod config;
pub mod deck;
pub mod error;
pub mod generation;
pub mod import;
pub mod index;
pub mod ledger;
pub mod lemmatize;
pub mod nlp;
pub mod partition;
pub mod split;

pub use config::Config;
pub use deck::{Deck, DeckRow};
pub use error::{DeckError, Result};
pub use index::{CompositeIndex, IndexGranularity};
