use chrono::{DateTime, Utc};
use kcd_server_domain::{
    ServiceError, ServiceResult,
    account::UserId,
    game::{
        GameId, GameRecord, GameRepository, GameState, GameStatus, NewGame, PlayerId,
        PlayerRecord, ScoreChange, reaches_winning_score,
    },
};
use sqlx::{Pool, Row, Sqlite, SqliteExecutor, sqlite::SqliteRow};

#[derive(Clone)]
pub struct SqliteGameRepository {
    pool: Pool<Sqlite>,
}

fn internal(e: sqlx::Error) -> ServiceError {
    ServiceError::Internal(e.to_string())
}

impl SqliteGameRepository {
    pub fn new(pool: Pool<Sqlite>) -> Self {
        Self { pool }
    }

    fn game_from_row(row: &SqliteRow) -> sqlx::Result<GameRecord> {
        let status: String = row.try_get("status")?;
        let created_at: i64 = row.try_get("created_at")?;
        Ok(GameRecord {
            id: row.try_get("id")?,
            owner_id: row.try_get("user_id")?,
            winning_score: row.try_get("winning_score")?,
            status: GameStatus::parse(&status)
                .ok_or_else(|| sqlx::Error::Decode(format!("unknown game status {status}").into()))?,
            created_at: DateTime::<Utc>::from_timestamp(created_at, 0).ok_or_else(|| {
                sqlx::Error::Decode(format!("invalid timestamp {created_at}").into())
            })?,
        })
    }

    fn player_from_row(row: &SqliteRow) -> sqlx::Result<PlayerRecord> {
        Ok(PlayerRecord {
            id: row.try_get("id")?,
            game_id: row.try_get("game_id")?,
            name: row.try_get("name")?,
            score: row.try_get("score")?,
        })
    }

    async fn fetch_players<'e, E>(executor: E, game_id: GameId) -> sqlx::Result<Vec<PlayerRecord>>
    where
        E: SqliteExecutor<'e>,
    {
        sqlx::query("SELECT id, game_id, name, score FROM players WHERE game_id = ? ORDER BY id")
            .bind(game_id)
            .fetch_all(executor)
            .await?
            .iter()
            .map(Self::player_from_row)
            .collect()
    }
}

#[async_trait::async_trait]
impl GameRepository for SqliteGameRepository {
    async fn start_game(&self, game: &NewGame) -> ServiceResult<GameState> {
        let mut tx = self.pool.begin().await.map_err(internal)?;

        // The first statement writes, so concurrent starts for any user are
        // serialized on the database write lock.
        sqlx::query("UPDATE games SET status = ? WHERE user_id = ? AND status = ?")
            .bind(GameStatus::Finished.as_str())
            .bind(game.owner_id)
            .bind(GameStatus::Active.as_str())
            .execute(&mut *tx)
            .await
            .map_err(internal)?;

        let game_id = sqlx::query(
            "INSERT INTO games (user_id, winning_score, status, created_at) VALUES (?, ?, ?, ?)",
        )
        .bind(game.owner_id)
        .bind(game.winning_score)
        .bind(GameStatus::Active.as_str())
        .bind(Utc::now().timestamp())
        .execute(&mut *tx)
        .await
        .map_err(|e| match e {
            // a validly signed token can outlive its user row
            sqlx::Error::Database(e) if e.is_foreign_key_violation() => {
                ServiceError::Unauthorized("Unknown user.".into())
            }
            e => internal(e),
        })?
        .last_insert_rowid();

        let mut players = Vec::with_capacity(game.player_names.len());
        for name in &game.player_names {
            let id = sqlx::query("INSERT INTO players (game_id, name, score) VALUES (?, ?, 0)")
                .bind(game_id)
                .bind(name)
                .execute(&mut *tx)
                .await
                .map_err(internal)?
                .last_insert_rowid();
            players.push(PlayerRecord {
                id,
                game_id,
                name: name.clone(),
                score: 0,
            });
        }

        tx.commit().await.map_err(internal)?;

        Ok(GameState {
            id: game_id,
            winning_score: game.winning_score,
            players,
        })
    }

    async fn get_active_game(&self, owner_id: UserId) -> ServiceResult<Option<GameState>> {
        let row = sqlx::query("SELECT * FROM games WHERE user_id = ? AND status = ?")
            .bind(owner_id)
            .bind(GameStatus::Active.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(internal)?;
        let Some(row) = row else {
            return Ok(None);
        };
        let game = Self::game_from_row(&row).map_err(internal)?;
        let players = Self::fetch_players(&self.pool, game.id)
            .await
            .map_err(internal)?;
        Ok(Some(GameState {
            id: game.id,
            winning_score: game.winning_score,
            players,
        }))
    }

    async fn get_game(&self, id: GameId) -> ServiceResult<Option<GameRecord>> {
        let row = sqlx::query("SELECT * FROM games WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(internal)?;
        row.as_ref()
            .map(Self::game_from_row)
            .transpose()
            .map_err(internal)
    }

    async fn get_players(&self, game_id: GameId) -> ServiceResult<Vec<PlayerRecord>> {
        Self::fetch_players(&self.pool, game_id)
            .await
            .map_err(internal)
    }

    async fn finish_game(&self, id: GameId) -> ServiceResult<()> {
        sqlx::query("UPDATE games SET status = ? WHERE id = ?")
            .bind(GameStatus::Finished.as_str())
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(internal)?;
        Ok(())
    }

    async fn apply_score_delta(
        &self,
        player_id: PlayerId,
        owner_id: UserId,
        delta: i64,
    ) -> ServiceResult<Option<ScoreChange>> {
        let mut tx = self.pool.begin().await.map_err(internal)?;

        // SQLite silently turns an overflowing integer sum into a REAL, so
        // only rows whose new score fits in an i64 are updated.
        let (min_score, max_score) = if delta < 0 {
            (i64::MIN - delta, i64::MAX)
        } else {
            (i64::MIN, i64::MAX - delta)
        };
        let updated = sqlx::query(
            "UPDATE players SET score = score + ?
             WHERE id = ?
             AND score BETWEEN ? AND ?
             AND game_id IN (SELECT id FROM games WHERE user_id = ? AND status = ?)",
        )
        .bind(delta)
        .bind(player_id)
        .bind(min_score)
        .bind(max_score)
        .bind(owner_id)
        .bind(GameStatus::Active.as_str())
        .execute(&mut *tx)
        .await
        .map_err(internal)?;
        if updated.rows_affected() == 0 {
            let in_active_game: i64 = sqlx::query_scalar(
                "SELECT EXISTS (
                    SELECT 1 FROM players p JOIN games g ON g.id = p.game_id
                    WHERE p.id = ? AND g.user_id = ? AND g.status = ?
                 )",
            )
            .bind(player_id)
            .bind(owner_id)
            .bind(GameStatus::Active.as_str())
            .fetch_one(&mut *tx)
            .await
            .map_err(internal)?;
            if in_active_game != 0 {
                return ServiceError::bad_request("Score change is out of range.");
            }
            // unknown player, foreign game or finished game; nothing was written
            return Ok(None);
        }

        let row = sqlx::query(
            "SELECT p.id, p.game_id, p.name, p.score, g.winning_score
             FROM players p JOIN games g ON g.id = p.game_id
             WHERE p.id = ?",
        )
        .bind(player_id)
        .fetch_one(&mut *tx)
        .await
        .map_err(internal)?;
        let player = Self::player_from_row(&row).map_err(internal)?;
        let winning_score: i64 = row.try_get("winning_score").map_err(internal)?;

        let game_finished = reaches_winning_score(player.score, winning_score);
        if game_finished {
            sqlx::query("UPDATE games SET status = ? WHERE id = ?")
                .bind(GameStatus::Finished.as_str())
                .bind(player.game_id)
                .execute(&mut *tx)
                .await
                .map_err(internal)?;
        }

        tx.commit().await.map_err(internal)?;

        Ok(Some(ScoreChange {
            player,
            winning_score,
            game_finished,
        }))
    }
}

#[cfg(test)]
mod tests {
    use crate::test_db::TestDb;

    use super::*;

    fn new_game(owner_id: UserId, winning_score: i64, names: &[&str]) -> NewGame {
        NewGame {
            owner_id,
            winning_score,
            player_names: names.iter().map(|n| n.to_string()).collect(),
        }
    }

    async fn active_game_count(db: &TestDb, owner_id: UserId) -> i64 {
        sqlx::query_scalar("SELECT COUNT(*) FROM games WHERE user_id = ? AND status = 'active'")
            .bind(owner_id)
            .fetch_one(&db.pool)
            .await
            .unwrap()
    }

    async fn set_score(db: &TestDb, player_id: PlayerId, score: i64) {
        sqlx::query("UPDATE players SET score = ? WHERE id = ?")
            .bind(score)
            .bind(player_id)
            .execute(&db.pool)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_start_game_persists_players() {
        let db = TestDb::new().await;
        let owner = db.insert_user("alice").await;
        let repo = SqliteGameRepository::new(db.pool.clone());

        let game = repo
            .start_game(&new_game(owner, 120, &["Henry", "Theresa"]))
            .await
            .unwrap();
        assert_eq!(game.winning_score, 120);
        assert_eq!(game.players.len(), 2);
        assert_eq!(game.players[0].name, "Henry");
        assert_eq!(game.players[1].name, "Theresa");

        let active = repo.get_active_game(owner).await.unwrap().unwrap();
        assert_eq!(active, game);

        let record = repo.get_game(game.id).await.unwrap().unwrap();
        assert_eq!(record.owner_id, owner);
        assert_eq!(record.status, GameStatus::Active);
    }

    #[tokio::test]
    async fn test_start_game_finishes_previous_game() {
        let db = TestDb::new().await;
        let alice = db.insert_user("alice").await;
        let bob = db.insert_user("bob").await;
        let repo = SqliteGameRepository::new(db.pool.clone());

        let first = repo.start_game(&new_game(alice, 100, &["A"])).await.unwrap();
        let bobs = repo.start_game(&new_game(bob, 100, &["B"])).await.unwrap();
        let second = repo.start_game(&new_game(alice, 100, &["A"])).await.unwrap();

        assert_eq!(active_game_count(&db, alice).await, 1);
        assert_eq!(active_game_count(&db, bob).await, 1);
        let first = repo.get_game(first.id).await.unwrap().unwrap();
        assert_eq!(first.status, GameStatus::Finished);
        let active = repo.get_active_game(alice).await.unwrap().unwrap();
        assert_eq!(active.id, second.id);
        let active = repo.get_active_game(bob).await.unwrap().unwrap();
        assert_eq!(active.id, bobs.id);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_starts_leave_one_active_game() {
        let db = TestDb::new().await;
        let owner = db.insert_user("alice").await;
        let repo = SqliteGameRepository::new(db.pool.clone());

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let repo = repo.clone();
                tokio::spawn(async move { repo.start_game(&new_game(owner, 100, &["A", "B"])).await })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap().expect("Failed to start game");
        }

        assert_eq!(active_game_count(&db, owner).await, 1);
        let games: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM games")
            .fetch_one(&db.pool)
            .await
            .unwrap();
        assert_eq!(games, 8);
    }

    #[tokio::test]
    async fn test_get_active_game_none() {
        let db = TestDb::new().await;
        let owner = db.insert_user("alice").await;
        let repo = SqliteGameRepository::new(db.pool.clone());
        assert!(repo.get_active_game(owner).await.unwrap().is_none());
        assert!(repo.get_game(42).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_finish_game_twice() {
        let db = TestDb::new().await;
        let owner = db.insert_user("alice").await;
        let repo = SqliteGameRepository::new(db.pool.clone());
        let game = repo.start_game(&new_game(owner, 100, &["A"])).await.unwrap();

        repo.finish_game(game.id).await.unwrap();
        repo.finish_game(game.id).await.unwrap();
        let record = repo.get_game(game.id).await.unwrap().unwrap();
        assert_eq!(record.status, GameStatus::Finished);
        assert!(repo.get_active_game(owner).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_score_delta_reaching_winning_score() {
        let db = TestDb::new().await;
        let owner = db.insert_user("alice").await;
        let repo = SqliteGameRepository::new(db.pool.clone());
        let game = repo
            .start_game(&new_game(owner, 100, &["Henry", "Hans"]))
            .await
            .unwrap();
        let henry = game.players[0].id;
        let hans = game.players[1].id;
        set_score(&db, henry, 90).await;

        let change = repo.apply_score_delta(henry, owner, 15).await.unwrap().unwrap();
        assert_eq!(change.player.score, 105);
        assert_eq!(change.player.name, "Henry");
        assert_eq!(change.winning_score, 100);
        assert!(change.game_finished);

        let record = repo.get_game(game.id).await.unwrap().unwrap();
        assert_eq!(record.status, GameStatus::Finished);

        assert!(repo.apply_score_delta(hans, owner, 1).await.unwrap().is_none());
        let players = repo.get_players(game.id).await.unwrap();
        assert_eq!(players[1].score, 0);
    }

    #[tokio::test]
    async fn test_score_delta_exactly_winning_score() {
        let db = TestDb::new().await;
        let owner = db.insert_user("alice").await;
        let repo = SqliteGameRepository::new(db.pool.clone());
        let game = repo.start_game(&new_game(owner, 30, &["A"])).await.unwrap();

        let change = repo
            .apply_score_delta(game.players[0].id, owner, 30)
            .await
            .unwrap()
            .unwrap();
        assert!(change.game_finished);
    }

    #[tokio::test]
    async fn test_negative_score_delta() {
        let db = TestDb::new().await;
        let owner = db.insert_user("alice").await;
        let repo = SqliteGameRepository::new(db.pool.clone());
        let game = repo.start_game(&new_game(owner, 100, &["A"])).await.unwrap();
        let player = game.players[0].id;
        set_score(&db, player, 50).await;

        let change = repo.apply_score_delta(player, owner, -10).await.unwrap().unwrap();
        assert_eq!(change.player.score, 40);
        assert!(!change.game_finished);

        let change = repo.apply_score_delta(player, owner, -100).await.unwrap().unwrap();
        assert_eq!(change.player.score, -60);
    }

    #[tokio::test]
    async fn test_score_delta_overflow_is_rejected() {
        let db = TestDb::new().await;
        let owner = db.insert_user("alice").await;
        let repo = SqliteGameRepository::new(db.pool.clone());
        let game = repo
            .start_game(&new_game(owner, 100, &["A", "B"]))
            .await
            .unwrap();
        let high = game.players[0].id;
        let low = game.players[1].id;
        set_score(&db, high, 50).await;
        set_score(&db, low, -50).await;

        assert!(matches!(
            repo.apply_score_delta(high, owner, i64::MAX).await,
            Err(ServiceError::BadRequest(_))
        ));
        assert!(matches!(
            repo.apply_score_delta(low, owner, i64::MIN).await,
            Err(ServiceError::BadRequest(_))
        ));

        let players = repo.get_players(game.id).await.unwrap();
        assert_eq!(players[0].score, 50);
        assert_eq!(players[1].score, -50);
        let record = repo.get_game(game.id).await.unwrap().unwrap();
        assert_eq!(record.status, GameStatus::Active);

        // the largest delta that still fits is applied
        let change = repo
            .apply_score_delta(high, owner, i64::MAX - 50)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(change.player.score, i64::MAX);
        assert!(change.game_finished);
    }

    #[tokio::test]
    async fn test_start_game_for_unknown_user() {
        let db = TestDb::new().await;
        let repo = SqliteGameRepository::new(db.pool.clone());
        assert!(matches!(
            repo.start_game(&new_game(999, 100, &["A"])).await,
            Err(ServiceError::Unauthorized(_))
        ));
        let games: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM games")
            .fetch_one(&db.pool)
            .await
            .unwrap();
        assert_eq!(games, 0);
    }

    #[tokio::test]
    async fn test_score_delta_for_foreign_player_is_rejected() {
        let db = TestDb::new().await;
        let alice = db.insert_user("alice").await;
        let bob = db.insert_user("bob").await;
        let repo = SqliteGameRepository::new(db.pool.clone());
        let game = repo.start_game(&new_game(alice, 100, &["A"])).await.unwrap();
        let player = game.players[0].id;

        assert!(repo.apply_score_delta(player, bob, 5).await.unwrap().is_none());
        assert!(repo.apply_score_delta(player + 100, alice, 5).await.unwrap().is_none());
        let players = repo.get_players(game.id).await.unwrap();
        assert_eq!(players[0].score, 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_score_deltas_are_not_lost() {
        let db = TestDb::new().await;
        let owner = db.insert_user("alice").await;
        let repo = SqliteGameRepository::new(db.pool.clone());
        let game = repo.start_game(&new_game(owner, 1000, &["A"])).await.unwrap();
        let player = game.players[0].id;

        let handles: Vec<_> = (0..20)
            .map(|_| {
                let repo = repo.clone();
                tokio::spawn(async move { repo.apply_score_delta(player, owner, 3).await })
            })
            .collect();
        for handle in handles {
            assert!(handle.await.unwrap().unwrap().is_some());
        }

        let players = repo.get_players(game.id).await.unwrap();
        assert_eq!(players[0].score, 60);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_winning_deltas_report_one_winner() {
        let db = TestDb::new().await;
        let owner = db.insert_user("alice").await;
        let repo = SqliteGameRepository::new(db.pool.clone());
        let game = repo
            .start_game(&new_game(owner, 10, &["A", "B", "C", "D"]))
            .await
            .unwrap();

        let handles: Vec<_> = game
            .players
            .iter()
            .map(|p| {
                let repo = repo.clone();
                let player = p.id;
                tokio::spawn(async move { repo.apply_score_delta(player, owner, 10).await })
            })
            .collect();
        let mut winners = 0;
        let mut rejected = 0;
        for handle in handles {
            match handle.await.unwrap().unwrap() {
                Some(change) if change.game_finished => winners += 1,
                Some(_) => panic!("winning delta did not finish the game"),
                None => rejected += 1,
            }
        }
        assert_eq!(winners, 1);
        assert_eq!(rejected, 3);
    }
}
