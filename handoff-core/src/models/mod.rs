pub mod message;
pub mod session;
pub mod wire;

pub use message::{Message, SenderType};
pub use session::{NewSession, Session, SessionHandle};
pub use wire::{AppendRequest, ErrorBody};
