//! Voice catalogue.

use axum::extract::State;
use axum::Json;
use reel_models::VoiceInfo;

use crate::state::AppState;

/// List the voices new jobs may use.
pub async fn list_voices(State(state): State<AppState>) -> Json<Vec<VoiceInfo>> {
    Json(state.config.voices.clone())
}
