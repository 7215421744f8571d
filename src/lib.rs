pub mod auth;
pub mod consistency;
pub mod core;
pub mod models;
pub mod progress;
pub mod stores;
pub mod sync;
pub mod utils;

pub use crate::auth::accounts::{LoginOutcome, RegisterOutcome, SessionDescriptor};
pub use crate::consistency::checker::{CheckReport, CheckStatus};
pub use crate::core::config::Config;
pub use crate::core::error::{
    AuthError, EngineError, PersistenceError, SessionError, ValidationError,
};
pub use crate::core::state::{AuthState, Engine};
pub use crate::models::progress::{LessonProgress, LessonStatus, TimerState};
pub use crate::models::user::{Role, Session, User};
