pub mod dispatcher;
pub mod server;

pub use dispatcher::{redirect_router, DispatcherState};
pub use server::{LifecycleState, RedirectServer, ShutdownOutcome, DEFAULT_DRAIN_TIMEOUT};
