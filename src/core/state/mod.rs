pub mod session;

pub use session::{CheckPhase, SessionState};
