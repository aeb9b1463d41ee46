//! Grid snapshot persistence
//!
//! One row per channel key (see `StateChannel`), whole snapshot as
//! JSON, plus a settings row pointing at the current generation. Reads
//! never fail: absent or unreadable rows materialize as a well-formed
//! empty grid, so a client can always start a session.

use mosaic_common::channel::StateChannel;
use mosaic_common::model::GridState;
use mosaic_common::Result;
use sqlx::{Pool, Sqlite};
use tracing::warn;
use uuid::Uuid;

const CURRENT_GENERATION_KEY: &str = "current_generation";

/// Load the grid for one generation; empty default on absence or
/// corruption
pub async fn load_grid(pool: &Pool<Sqlite>, generation: Uuid) -> GridState {
    let key = StateChannel::Grid.key(generation);
    let row: Option<String> =
        match sqlx::query_scalar("SELECT state FROM grids WHERE channel_key = ?")
            .bind(&key)
            .fetch_optional(pool)
            .await
        {
            Ok(row) => row,
            Err(e) => {
                warn!("Grid read failed for {}, substituting default: {}", key, e);
                None
            }
        };

    let Some(json) = row else {
        return GridState::empty(generation);
    };
    match serde_json::from_str::<GridState>(&json) {
        Ok(grid) if grid.is_well_formed() => grid,
        Ok(_) => {
            warn!("Grid row {} has wrong shape, substituting default", key);
            GridState::empty(generation)
        }
        Err(e) => {
            warn!("Grid row {} unreadable, substituting default: {}", key, e);
            GridState::empty(generation)
        }
    }
}

/// Load the current grid, following the generation pointer; a fresh
/// generation when no pointer exists
pub async fn load_current(pool: &Pool<Sqlite>) -> GridState {
    match current_generation(pool).await {
        Some(generation) => load_grid(pool, generation).await,
        None => GridState::new_generation(),
    }
}

/// Replace the persisted snapshot for `state`'s generation and move the
/// current-generation pointer to it. One transaction: the snapshot and
/// the pointer are never observed half-applied.
pub async fn save_grid(pool: &Pool<Sqlite>, state: &GridState) -> Result<()> {
    let key = StateChannel::Grid.key(state.generation);
    let json = serde_json::to_string(state)
        .map_err(|e| mosaic_common::Error::Persistence(e.to_string()))?;
    let now = chrono::Utc::now().to_rfc3339();

    let mut tx = pool.begin().await?;
    sqlx::query(
        r#"
        INSERT INTO grids (channel_key, state, updated_at) VALUES (?, ?, ?)
        ON CONFLICT(channel_key) DO UPDATE SET state = excluded.state, updated_at = excluded.updated_at
        "#,
    )
    .bind(&key)
    .bind(&json)
    .bind(&now)
    .execute(&mut *tx)
    .await?;

    sqlx::query(
        r#"
        INSERT INTO settings (key, value) VALUES (?, ?)
        ON CONFLICT(key) DO UPDATE SET value = excluded.value
        "#,
    )
    .bind(CURRENT_GENERATION_KEY)
    .bind(state.generation.to_string())
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;
    Ok(())
}

async fn current_generation(pool: &Pool<Sqlite>) -> Option<Uuid> {
    let value: Option<String> = sqlx::query_scalar("SELECT value FROM settings WHERE key = ?")
        .bind(CURRENT_GENERATION_KEY)
        .fetch_optional(pool)
        .await
        .ok()
        .flatten();
    value.and_then(|v| Uuid::parse_str(&v).ok())
}
