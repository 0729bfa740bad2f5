//! Device sessions.
//!
//! - [`SessionHandle`]: the shared, thread-safe view of a live connection.
//! - [`Session`]: the per-connection protocol state machine.
//! - [`ConnectionRegistry`]: every live session, keyed by id.

pub mod handle;
pub mod machine;
pub mod registry;

pub use handle::{Outbound, SessionHandle, SessionStatus};
pub use machine::{CloseReason, Session, SessionState};
pub use registry::{ConnectionRegistry, SweepReport, test_frames};
