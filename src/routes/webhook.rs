use axum::extract::State;
use axum::routing::post;
use axum::Router;

use crate::chat::{ChatUpdate, ReplyAction, UpdatePayload};
use crate::response::{ok, AppError};
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/", post(handle_update))
}

/// Transport entry point: one inbound update in, the reply actions out.
async fn handle_update(
    State(state): State<AppState>,
    axum::Json(update): axum::Json<ChatUpdate>,
) -> Result<impl axum::response::IntoResponse, AppError> {
    if update.user_id.trim().is_empty() {
        return Err(AppError::invalid_input("userId must not be empty"));
    }

    let actions: Vec<ReplyAction> = match &update.payload {
        UpdatePayload::Message { text } => {
            state.chat().on_message(&update.user_id, text, update.ts).await
        }
        UpdatePayload::Choice { payload } => {
            state.chat().on_choice(&update.user_id, payload, update.ts).await
        }
    };

    Ok(ok(actions))
}
