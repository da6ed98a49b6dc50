pub mod console;
pub mod core;

use tracing_subscriber::EnvFilter;

pub use crate::core::client::{LaunchStatus, PatchKind, ProgressSink, UpdateClient, UpdateClientBuilder};
pub use crate::core::config::{ClientOptions, ServerConfig, Strategy};
pub use crate::core::error::{UpdateError, UpdateResult};
pub use crate::core::events::{EventReporter, EventSink, EventType, UpdateEvent};
pub use crate::core::native::{FsNativeModule, NativeConstants, NativeModule, Platform};
pub use crate::core::version::{CheckResult, Paused, ProgressSample, UpdateInfo};

/// Installs the fmt subscriber. `RUST_LOG` overrides the default filter.
///
/// Safe to call more than once; only the first call takes effect.
pub fn init_logging() {
    let installed = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,cresc_lib=debug")),
        )
        .try_init()
        .is_ok();

    if installed {
        tracing::info!("Cresc update client v{}", env!("CARGO_PKG_VERSION"));
    }
}
