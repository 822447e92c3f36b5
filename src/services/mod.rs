//! Downstream services and the workflows that span them.
//!
//! # Data Flow
//! ```text
//! HTTP handler
//!     → workflows.rs (saga over guarded calls)
//!     → clients.rs (UserDirectory / GameSessions)
//!     → user management service, game engine service
//! ```
//!
//! # Design Decisions
//! - Collaborators are trait objects so handlers and tests share one path
//! - Every outbound call goes through `OperationGuard` under a named operation

pub mod clients;
pub mod workflows;

pub use clients::{
    ClientError, GameRecord, GameSessions, HttpGameSessions, HttpUserDirectory, NewUser, UserDirectory,
    UserRecord,
};
pub use workflows::{create_user_with_game, operations, UserWithGame, WorkflowError, CREATE_WITH_GAME};
