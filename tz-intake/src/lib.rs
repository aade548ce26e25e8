//! tz-intake library interface
//!
//! Client side of the TicketZen receipt intake flow: upload a receipt
//! photo for a session token, trigger analysis, poll until the server
//! settles, and present the extracted fields.

pub mod client;
pub mod error;
pub mod models;
pub mod presenter;
pub mod scheduler;
pub mod state_machine;
pub mod workflow;

#[cfg(test)]
pub(crate) mod test_support;

pub use crate::client::{IntakeApi, IntakeClient, UploadFile};
pub use crate::error::{IntakeError, IntakeResult};
pub use crate::workflow::IntakeWorkflow;
