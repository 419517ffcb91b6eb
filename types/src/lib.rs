pub mod audio;
pub mod events;
pub mod session;

pub use events::{ClientMessage, InboundEvent, ServerMessage};
pub use session::Session;
