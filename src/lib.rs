pub mod config;
pub mod error;
pub mod learning;
pub mod logging;
pub mod services;
pub mod store;
pub mod wordlist;

pub use error::{EngineError, Result, StoreError, TransportError};
pub use learning::{Currency, Phrase, Strategy, WordCount};
pub use wordlist::Wordlist;
