// ─── Cresc Core ───
// Over-the-air bundle update client: check, download, apply, roll back.
//
// Architecture:
//   core/
//     client/     UpdateClient orchestrator (check, download, apply, apk)
//     config/     ClientOptions, server endpoints, release guard
//     endpoint/   Primary + backup endpoint resolution
//     events/     Lifecycle event reporting
//     native/     Native module boundary + filesystem implementation
//     downloader/ Streaming downloads and package extraction
//     version/    Check results, server ops, persisted version info
//     state/      Per-session guards (throttle, in-flight, one-shots)

pub mod client;
pub mod clock;
pub mod config;
pub mod downloader;
pub mod endpoint;
pub mod error;
pub mod events;
pub mod http;
pub mod native;
pub mod state;
pub mod version;

#[cfg(test)]
pub mod testing;
