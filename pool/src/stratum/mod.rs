//! Stratum-style JSON-line protocol: listeners, framing, jobs, and broadcast.

pub mod broadcaster;
pub mod endpoint;
pub mod job;
pub mod protocol;
pub mod session;

pub use broadcaster::JobBroadcaster;
pub use endpoint::Endpoint;
pub use job::Job;
pub use session::{Session, SessionContext, SessionRegistry};
