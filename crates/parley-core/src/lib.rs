//! # parley-core
//!
//! Domain model for the Parley chat relay.
//!
//! - [`ids`]: branded ids for connections, users and messages
//! - [`message`]: the immutable [`ChatMessage`]
//! - [`history`]: the bounded FIFO [`HistoryStore`]
//! - [`presence`] and [`registry`]: sessions and who is online
//! - [`threading`]: reply resolution against retained history
//! - [`validation`]: limits on inbound payloads
//! - [`protocol`]: JSON wire envelopes
//! - [`hub`]: the [`ChatHub`] state machine tying it together
//!
//! Nothing here does I/O. The transport lives in `parley-server`.

#![deny(unsafe_code)]

pub mod history;
pub mod hub;
pub mod ids;
pub mod logging;
pub mod message;
pub mod presence;
pub mod protocol;
pub mod registry;
pub mod threading;
pub mod validation;

pub use history::{DEFAULT_HISTORY_CAPACITY, HistoryStore};
pub use hub::{ChatHub, Outbound, Recipient};
pub use ids::{ConnectionId, MessageId, UserId};
pub use message::ChatMessage;
pub use protocol::{ClientEvent, ServerEvent};
pub use registry::{Session, SessionRegistry, SessionState};
pub use validation::{ChatLimits, ValidationError};
