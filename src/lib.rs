pub mod config;
pub mod controller;
pub mod endpoint;
pub mod history;
pub mod models;
pub mod retry;
pub mod storage;
pub mod thumbnail;
pub mod validation;

pub use config::StudioConfig;
pub use controller::{ControllerConfig, GenerationController, SubmitError, SubmitOptions};
pub use endpoint::{AttemptFailure, GenerationEndpoint, MockConfig, MockEndpoint};
pub use history::{HistoryStore, SessionData, UserPreferences, UserSettings};
pub use models::{
    ErrorCode, GenerationError, GenerationRequest, GenerationResult, GenerationState, GenerationStatus,
    HistoryItem, Style,
};
pub use retry::RetryConfig;
pub use storage::{FileStore, KeyValueStore, MemoryStore, StorageError, UnavailableStore};
pub use validation::{validate, validate_fields, ValidationResult};
