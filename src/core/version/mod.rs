pub mod check_result;
pub mod store;

pub use check_result::{
    is_valid_hash, BlockWindow, CheckResponse, CheckResult, LocalHashInfo, Paused, ProgressSample,
    ServerOp, UpdateInfo,
};
pub use store::{ClientInfo, VersionStore};
