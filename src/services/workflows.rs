//! Multi-service workflows.
//!
//! `create_user_with_game` registers a user, then starts a game for them.
//! Each forward call runs under the operation's breaker and deadline; if the
//! game cannot be started the user is deleted again. Forward calls are not
//! idempotent and run once; the deletes that undo them are retried on
//! transient failures.

use std::sync::{Arc, OnceLock};

use serde::Serialize;
use tracing::info;

use crate::resilience::{CallError, OperationGuard, Saga, SagaError};
use crate::services::clients::{
    ClientError, GameRecord, GameSessions, NewUser, UserDirectory, UserRecord,
};

pub const CREATE_WITH_GAME: &str = "create_with_game";

/// Operation names used for breaker lookup and per-operation config.
pub mod operations {
    pub const REGISTER_USER: &str = "users.register";
    pub const DELETE_USER: &str = "users.delete";
    pub const START_GAME: &str = "games.start";
    pub const DELETE_GAME: &str = "games.delete";
}

#[derive(Debug, Clone, Serialize)]
pub struct UserWithGame {
    pub user: UserRecord,
    pub game: GameRecord,
}

#[derive(Debug, thiserror::Error)]
pub enum WorkflowError {
    #[error(transparent)]
    Saga(#[from] SagaError),

    #[error("step '{0}' completed without recording its result")]
    MissingResult(&'static str),
}

pub async fn create_user_with_game(
    guard: &OperationGuard,
    users: Arc<dyn UserDirectory>,
    games: Arc<dyn GameSessions>,
    new_user: NewUser,
) -> Result<UserWithGame, WorkflowError> {
    let user_slot: Arc<OnceLock<UserRecord>> = Arc::new(OnceLock::new());
    let game_slot: Arc<OnceLock<GameRecord>> = Arc::new(OnceLock::new());

    let mut saga = Saga::new(CREATE_WITH_GAME);

    let (register_guard, register_users, register_slot) = (guard.clone(), users.clone(), user_slot.clone());
    let (undo_guard, undo_users, undo_slot) = (guard.clone(), users, user_slot.clone());
    saga.add_step(
        "register_user",
        move || async move {
            let user = register_guard
                .call(operations::REGISTER_USER, async move {
                    register_users.register_user(&new_user).await
                })
                .await?;
            let _ = register_slot.set(user);
            Ok::<_, CallError<ClientError>>(())
        },
        move || async move {
            let Some(user_id) = undo_slot.get().map(|u| u.id.clone()) else {
                return Ok(());
            };
            undo_guard
                .call_idempotent(operations::DELETE_USER, move || {
                    let (users, user_id) = (undo_users.clone(), user_id.clone());
                    async move { users.delete_user(&user_id).await }
                })
                .await
        },
    );

    let (start_guard, start_games, start_slot) = (guard.clone(), games.clone(), game_slot.clone());
    let (stop_guard, stop_games, stop_slot) = (guard.clone(), games, game_slot.clone());
    saga.add_step(
        "start_game",
        move || async move {
            let game = start_guard
                .call(operations::START_GAME, async move { start_games.start_game().await })
                .await?;
            let _ = start_slot.set(game);
            Ok::<_, CallError<ClientError>>(())
        },
        move || async move {
            let Some(game_id) = stop_slot.get().map(|g| g.id.clone()) else {
                return Ok(());
            };
            stop_guard
                .call_idempotent(operations::DELETE_GAME, move || {
                    let (games, game_id) = (stop_games.clone(), game_id.clone());
                    async move { games.delete_game(&game_id).await }
                })
                .await
        },
    );

    saga.execute().await?;

    let user = user_slot.get().cloned().ok_or(WorkflowError::MissingResult("register_user"))?;
    let game = game_slot.get().cloned().ok_or(WorkflowError::MissingResult("start_game"))?;
    info!(user_id = %user.id, game_id = %game.id, "User created with game");
    Ok(UserWithGame { user, game })
}
