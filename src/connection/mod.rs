//! The connection core: lifecycle state machine, pending-record registry,
//! connector, and the frame-dispatch driver.

mod connector;
mod machine;
mod pending;
mod state;

pub use state::ConnectionState;

pub(crate) use connector::Endpoint;
pub(crate) use machine::Shared;
