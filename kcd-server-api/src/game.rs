use axum::{Json, extract::State};
use kcd_server_domain::{
    app::AppState,
    game::{GameId, GameService, GameState, PlayerId},
};
use serde::{Deserialize, Serialize};

use crate::{
    error::{ApiJson, MyServiceError},
    jwt::Identity,
};

#[derive(Serialize)]
pub struct JsonPlayer {
    id: PlayerId,
    name: String,
    score: i64,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JsonGameState {
    id: GameId,
    winning_score: i64,
    players: Vec<JsonPlayer>,
}

impl From<GameState> for JsonGameState {
    fn from(game: GameState) -> Self {
        JsonGameState {
            id: game.id,
            winning_score: game.winning_score,
            players: game
                .players
                .into_iter()
                .map(|p| JsonPlayer {
                    id: p.id,
                    name: p.name,
                    score: p.score,
                })
                .collect(),
        }
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartGameRequest {
    num_players: Option<i64>,
    winning_score: Option<i64>,
    player_names: Option<Vec<String>>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StartGameResponse {
    message: String,
    game_state: JsonGameState,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoreRequest {
    player_id: PlayerId,
    score_change: i64,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoreResponse {
    message: String,
    game_state: JsonGameState,
    #[serde(skip_serializing_if = "Option::is_none")]
    winner: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GameStateResponse {
    game_started: bool,
    #[serde(flatten)]
    game: Option<JsonGameState>,
}

pub async fn start_game(
    State(app): State<AppState>,
    Identity(identity): Identity,
    ApiJson(req): ApiJson<StartGameRequest>,
) -> Result<Json<StartGameResponse>, MyServiceError> {
    let game = app
        .game_service
        .start_game(
            identity.user_id,
            req.num_players.unwrap_or(0),
            req.winning_score,
            req.player_names,
        )
        .await?;
    Ok(Json(StartGameResponse {
        message: "Game started successfully!".to_string(),
        game_state: game.into(),
    }))
}

pub async fn update_score(
    State(app): State<AppState>,
    Identity(identity): Identity,
    ApiJson(req): ApiJson<ScoreRequest>,
) -> Result<Json<ScoreResponse>, MyServiceError> {
    let update = app
        .game_service
        .apply_score_delta(identity.user_id, req.player_id, req.score_change)
        .await?;
    let message = match &update.winner {
        Some(winner) => format!("{} wins!", winner),
        None => "Score updated successfully!".to_string(),
    };
    Ok(Json(ScoreResponse {
        message,
        game_state: update.game.into(),
        winner: update.winner,
    }))
}

pub async fn get_state(
    State(app): State<AppState>,
    Identity(identity): Identity,
) -> Result<Json<GameStateResponse>, MyServiceError> {
    let game = app.game_service.get_active_game(identity.user_id).await?;
    Ok(Json(GameStateResponse {
        game_started: game.is_some(),
        game: game.map(JsonGameState::from),
    }))
}
