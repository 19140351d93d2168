// Boulder Library - roster-driven account lifecycle reconciliation
// This exposes the core components for testing and integration

pub mod clients;
pub mod config;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod roster;
pub mod shutdown;
pub mod telemetry;

// Re-export key types for easy access
pub use clients::{ClientError, IdentityClient, IdentityOperations, PlatformClient, PlatformOperations};
pub use config::BoulderConfig;
pub use http::RateLimitedHttpClient;
pub use lifecycle::{
    Action, Dispatcher, LifecycleExecutor, LifecyclePolicy, LifecycleState, PassSummary, Reconciler,
    Remotes, Scheduler,
};
pub use observability::{OperationTimer, ReconcileMetrics};
pub use roster::{Roster, RosterEntry, RosterError, Slug};
pub use shutdown::ShutdownCoordinator;
pub use telemetry::{create_action_span, generate_correlation_id, init_telemetry, shutdown_telemetry};
