pub mod client;
pub mod clock;
pub mod code;
pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod relay;
pub mod store;
pub mod sync;

pub use client::{ClientError, HandoffClient};
pub use config::HandoffConfig;
pub use error::HandoffError;
pub use models::{Message, NewSession, SenderType, Session, SessionHandle};
pub use relay::SessionSettings;
pub use store::{create_store, MemoryStore, PairingStore, PgStore, SweepReport};
pub use sync::{MessageFeed, Poller, SyncOutcome, SyncView};
