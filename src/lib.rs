// Infrastructure layer (shared components)
pub mod config;
pub mod error;
pub mod metrics;

// Domain layer (business logic)
pub mod backoff;
pub mod channel;
pub mod ledger;
pub mod model;
pub mod preference;
pub mod ratelimit;
pub mod render;
pub mod sender;
pub mod subscription;
pub mod window;

// Application layer
pub mod orchestrator;
pub mod scheduler;
