pub mod backend;
pub mod capture;
pub mod client;
pub mod config;
pub mod error;
pub mod lifecycle;
pub mod playback;
pub mod session;

pub use live_voice_types as types;
pub use live_voice_utils as utils;

pub use backend::{AudioBackend, CpalBackend, Microphone};
pub use client::{Connector, GeminiConnector, LiveConnection};
pub use error::SessionError;
pub use playback::{OutputContext, PlaybackScheduler};
pub use session::{
    Command, Notification, NotificationLevel, Session, SessionConfig, SessionEvent, SessionState,
    SessionStats, SessionUpdate, UpdateRx,
};
