//! # Portico Remote Session
//!
//! The outbound control-plane session: obtains OAuth2 client-credentials
//! tokens, maintains a reconnecting WebSocket connection with bounded
//! exponential backoff, decodes framed JSON requests, dispatches them
//! through the connector facades, and returns framed JSON responses.
//!
//! ## Crate Organization
//!
//! - [`error`] - Session error types with wire names
//! - [`token`] - OAuth2 token lifecycle with single-flight refresh
//! - [`frames`] - Inbound/outbound frame vocabulary
//! - [`dispatch`] - Payload validation and facade dispatch
//! - [`session`] - The reconnecting session manager

pub mod dispatch;
pub mod error;
pub mod frames;
pub mod session;
pub mod token;

pub use dispatch::Dispatcher;
pub use error::{SessionError, SessionResult};
pub use frames::{InboundFrame, OperationName, OutboundFrame, WireError};
pub use session::{SessionConfig, SessionManager};
pub use token::{OAuthConfig, TokenProvider};
