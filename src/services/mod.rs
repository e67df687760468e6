pub mod auth_service;
pub mod auth_service_impl;
pub use auth_service::{AuthError, AuthService};
pub use auth_service_impl::SeaOrmAuthService;

pub mod generation;
pub use generation::{GenerateRequest, GenerationError, GenerationOutcome, GenerationService};

pub mod metrics;
pub use metrics::{ErrorType, Metrics};

pub mod notification;
pub use notification::Notifier;

pub mod storage;
pub use storage::{Backend, PersistedRef, StorageError, StorageInfo, StorageService};
