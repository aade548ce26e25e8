//! Data models for tz-intake
//!
//! - `session`: local session state, snapshots handed to presenters
//! - `remote`: wire shapes exchanged with the TicketZen intake API

pub mod remote;
pub mod session;

pub use remote::{ReceiptResult, RemoteState, Rotation, StatusReport};
pub use session::{IntakeSession, IntakeSnapshot, IntakeState, SessionToken, StateTransition};
