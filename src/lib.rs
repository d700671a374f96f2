pub mod board;
pub mod config;
pub mod error;
pub mod identity;
pub mod models;
pub mod moderation;
pub mod rate_limit; // cooldown and ban gates
pub mod repo;
pub mod storage;
pub mod thumbnail;

// Re-export commonly used items for tests / embedding servers
pub use board::Imageboard;
pub use config::BoardConfig;
pub use error::{BoardError, ErrorKind, Result};
pub use moderation::Moderator;
