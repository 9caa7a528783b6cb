//! Durable store for chat settings, call flags and play statistics

pub mod settings;
pub mod store;

pub use store::{PlayRecord, SessionStore, SqliteStore, TopTrack};
