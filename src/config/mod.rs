pub mod settings;

pub use settings::{BotConfig, PacingConfig, StoreBackend, TlsPaths};
