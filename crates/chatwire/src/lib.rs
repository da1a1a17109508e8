//! # chatwire
//!
//! A client driver for realtime chat servers that speak DDP.
//!
//! The [`Driver`] connects and logs in, subscribes to the user's message
//! stream, and calls back with the messages an application should react
//! to: not its own, not already seen, and only from the kinds of rooms it
//! asked for. Frequently repeated lookups (room ids, direct-message rooms)
//! go through a small per-method cache.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use chatwire::prelude::*;
//!
//! # async fn run() -> Result<(), DriverError> {
//! let driver = Driver::new(DdpTransport::new(), DriverConfig::from_env());
//! driver.login(None).await?;
//!
//! let replies = driver.clone();
//! let responder = driver
//!     .respond_to_messages(
//!         move |event| {
//!             let driver = replies.clone();
//!             async move {
//!                 if let Ok(incoming) = event {
//!                     let _ = driver
//!                         .send_to_room_id("pong", &incoming.message.room_id)
//!                         .await;
//!                 }
//!             }
//!         },
//!         RespondOptions::new().rooms(["general"]),
//!     )
//!     .await?;
//! # responder.stop();
//! # Ok(())
//! # }
//! ```

mod config;
mod driver;
mod error;
mod filter;
mod membership;
mod messaging;
mod respond;
mod stream;

pub use config::DriverConfig;
pub use driver::Driver;
pub use error::DriverError;
pub use filter::{DropReason, FilterPolicy, MessageFilter, ReadCursor, Verdict};
pub use membership::{JoinStart, RoomMembership};
pub use respond::{RespondOptions, Responder};
pub use stream::{MessageReceiver, MessageStream, StreamEvent};

pub use chatwire_cache::{CacheConfig, MethodCache};
pub use chatwire_protocol as protocol;
pub use chatwire_session::{ConnectOptions, ConnectionEvent, Session, SessionError, SessionState};
pub use chatwire_transport::{Subscription, Transport, TransportError};

/// Common imports for applications.
pub mod prelude {
    pub use crate::{
        ConnectOptions, ConnectionEvent, Driver, DriverConfig, DriverError, RespondOptions,
        Responder, Session, Transport,
    };
    pub use chatwire_protocol::{
        Credentials, IncomingMessage, Message, MessageId, MessageMeta, RoomId, RoomType, UserId,
    };
    #[cfg(feature = "websocket")]
    pub use chatwire_transport::DdpTransport;
}
