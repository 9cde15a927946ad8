pub mod chat;
pub mod config;
pub mod db;
pub mod tickets;

pub use chat::controller::{EventKind, StreamController};
pub use chat::{ChatError, ChatScope, StreamStatus};
pub use config::{ClientConfig, StorageConfig};
pub use db::models::{Message, Role};
pub use tickets::client::TicketClient;
