use std::sync::Arc;

use chrono::{DateTime, Utc};
use log::info;

use crate::{ServiceError, ServiceResult, account::UserId};

pub type GameId = i64;
pub type PlayerId = i64;

pub const DEFAULT_WINNING_SCORE: i64 = 100;

pub const MAX_PLAYERS: i64 = 100;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GameStatus {
    Active,
    Finished,
}

impl GameStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            GameStatus::Active => "active",
            GameStatus::Finished => "finished",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "active" => Some(GameStatus::Active),
            "finished" => Some(GameStatus::Finished),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GameRecord {
    pub id: GameId,
    pub owner_id: UserId,
    pub winning_score: i64,
    pub status: GameStatus,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PlayerRecord {
    pub id: PlayerId,
    pub game_id: GameId,
    pub name: String,
    pub score: i64,
}

/// A game together with its full player list, ordered by player id.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GameState {
    pub id: GameId,
    pub winning_score: i64,
    pub players: Vec<PlayerRecord>,
}

#[derive(Clone, Debug)]
pub struct NewGame {
    pub owner_id: UserId,
    pub winning_score: i64,
    pub player_names: Vec<String>,
}

/// Result of a committed score increment.
#[derive(Clone, Debug)]
pub struct ScoreChange {
    pub player: PlayerRecord,
    pub winning_score: i64,
    pub game_finished: bool,
}

#[derive(Clone, Debug)]
pub struct ScoreUpdate {
    pub game: GameState,
    pub winner: Option<String>,
}

pub fn reaches_winning_score(score: i64, winning_score: i64) -> bool {
    score >= winning_score
}

pub type ArcGameRepository = Arc<Box<dyn GameRepository + Send + Sync + 'static>>;

#[async_trait::async_trait]
pub trait GameRepository {
    /// Finishes every active game of the owner and inserts the new game with
    /// its players, all in one transaction.
    async fn start_game(&self, game: &NewGame) -> ServiceResult<GameState>;
    async fn get_active_game(&self, owner_id: UserId) -> ServiceResult<Option<GameState>>;
    async fn get_game(&self, id: GameId) -> ServiceResult<Option<GameRecord>>;
    async fn get_players(&self, game_id: GameId) -> ServiceResult<Vec<PlayerRecord>>;
    /// Idempotent.
    async fn finish_game(&self, id: GameId) -> ServiceResult<()>;
    /// Adds `delta` to the player's score if the player belongs to an active
    /// game of `owner_id`, finishing the game in the same transaction when the
    /// new score reaches the winning score. Returns `None` without touching
    /// any row when no such player exists, and `BadRequest` when the new score
    /// would not fit in an `i64`.
    async fn apply_score_delta(
        &self,
        player_id: PlayerId,
        owner_id: UserId,
        delta: i64,
    ) -> ServiceResult<Option<ScoreChange>>;
}

pub type ArcGameService = Arc<Box<dyn GameService + Send + Sync + 'static>>;

#[async_trait::async_trait]
pub trait GameService {
    async fn start_game(
        &self,
        owner_id: UserId,
        num_players: i64,
        winning_score: Option<i64>,
        player_names: Option<Vec<String>>,
    ) -> ServiceResult<GameState>;
    async fn get_active_game(&self, owner_id: UserId) -> ServiceResult<Option<GameState>>;
    async fn finalize_game(&self, game_id: GameId) -> ServiceResult<()>;
    async fn apply_score_delta(
        &self,
        owner_id: UserId,
        player_id: PlayerId,
        delta: i64,
    ) -> ServiceResult<ScoreUpdate>;
}

pub struct GameServiceImpl {
    game_repository: ArcGameRepository,
}

impl GameServiceImpl {
    pub fn new(game_repository: ArcGameRepository) -> Self {
        Self { game_repository }
    }

    fn resolve_winning_score(winning_score: Option<i64>) -> ServiceResult<i64> {
        match winning_score {
            None | Some(0) => Ok(DEFAULT_WINNING_SCORE),
            Some(score) if score < 0 => {
                ServiceError::bad_request("Winning score must be greater than 0.")
            }
            Some(score) => Ok(score),
        }
    }

    fn resolve_player_names(num_players: usize, names: Option<Vec<String>>) -> Vec<String> {
        let names = names.unwrap_or_default();
        (0..num_players)
            .map(|i| {
                names
                    .get(i)
                    .map(|name| name.trim())
                    .filter(|name| !name.is_empty())
                    .map(str::to_string)
                    .unwrap_or_else(|| format!("Player {}", i + 1))
            })
            .collect()
    }
}

#[async_trait::async_trait]
impl GameService for GameServiceImpl {
    async fn start_game(
        &self,
        owner_id: UserId,
        num_players: i64,
        winning_score: Option<i64>,
        player_names: Option<Vec<String>>,
    ) -> ServiceResult<GameState> {
        if num_players <= 0 {
            return ServiceError::bad_request("Number of players must be greater than 0.");
        }
        if num_players > MAX_PLAYERS {
            return ServiceError::bad_request(format!(
                "Number of players must be at most {}.",
                MAX_PLAYERS
            ));
        }
        let winning_score = Self::resolve_winning_score(winning_score)?;
        let new_game = NewGame {
            owner_id,
            winning_score,
            player_names: Self::resolve_player_names(num_players as usize, player_names),
        };
        let game = self.game_repository.start_game(&new_game).await?;
        info!(
            "User {} started game {} with {} players, winning score {}",
            owner_id,
            game.id,
            game.players.len(),
            game.winning_score
        );
        Ok(game)
    }

    async fn get_active_game(&self, owner_id: UserId) -> ServiceResult<Option<GameState>> {
        self.game_repository.get_active_game(owner_id).await
    }

    async fn finalize_game(&self, game_id: GameId) -> ServiceResult<()> {
        self.game_repository.finish_game(game_id).await
    }

    async fn apply_score_delta(
        &self,
        owner_id: UserId,
        player_id: PlayerId,
        delta: i64,
    ) -> ServiceResult<ScoreUpdate> {
        let Some(change) = self
            .game_repository
            .apply_score_delta(player_id, owner_id, delta)
            .await?
        else {
            return ServiceError::not_found("Player not found.");
        };
        let game_id = change.player.game_id;
        let winner = change.game_finished.then(|| change.player.name.clone());
        if let Some(winner) = &winner {
            info!(
                "{} won game {} with {} points",
                winner, game_id, change.player.score
            );
        }
        let players = self.game_repository.get_players(game_id).await?;
        Ok(ScoreUpdate {
            game: GameState {
                id: game_id,
                winning_score: change.winning_score,
                players,
            },
            winner,
        })
    }
}
