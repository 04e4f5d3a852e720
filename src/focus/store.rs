use anyhow::{anyhow, bail, Context, Result};

use crate::db::Database;

use super::state::{ActiveMode, FocusSessionState};

pub const ACTIVE_MODE_KEY: &str = "focus.active_mode";
pub const SESSION_DATA_KEY: &str = "focus.session_data";

/// Focus-session record in the key-value table, split over two keys.
#[derive(Clone)]
pub struct FocusStore {
    db: Database,
}

impl FocusStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// `Ok(None)` when nothing is persisted. Any malformed or contradictory
    /// record is an error.
    pub async fn load(&self) -> Result<Option<FocusSessionState>> {
        let Some(raw_mode) = self.db.get_value(ACTIVE_MODE_KEY).await? else {
            return Ok(None);
        };
        let mode: ActiveMode = serde_json::from_str(&raw_mode)
            .with_context(|| format!("invalid {ACTIVE_MODE_KEY} value: {raw_mode}"))?;
        if mode == ActiveMode::None {
            return Ok(None);
        }

        let raw_state = self
            .db
            .get_value(SESSION_DATA_KEY)
            .await?
            .ok_or_else(|| anyhow!("{ACTIVE_MODE_KEY} is set but {SESSION_DATA_KEY} is missing"))?;
        let state: FocusSessionState = serde_json::from_str(&raw_state)
            .with_context(|| format!("invalid {SESSION_DATA_KEY} value"))?;

        if state.active_mode != mode {
            bail!(
                "persisted mode {:?} disagrees with session data mode {:?}",
                mode,
                state.active_mode
            );
        }
        if !state.is_consistent() {
            bail!("persisted focus session has inconsistent cycle counters");
        }

        Ok(Some(state))
    }

    pub async fn save(&self, state: &FocusSessionState) -> Result<()> {
        let mode = serde_json::to_string(&state.active_mode)?;
        let data = serde_json::to_string(state)?;
        self.db
            .put_values(vec![
                (ACTIVE_MODE_KEY.to_string(), mode),
                (SESSION_DATA_KEY.to_string(), data),
            ])
            .await
            .context("failed to persist focus session")
    }

    pub async fn clear(&self) -> Result<()> {
        self.db
            .delete_values(&[ACTIVE_MODE_KEY, SESSION_DATA_KEY])
            .await
            .context("failed to clear focus session")
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::focus::state::FocusConfig;

    #[tokio::test]
    async fn empty_store_loads_nothing() {
        let store = FocusStore::new(Database::open_in_memory().unwrap());
        assert_eq!(store.load().await.unwrap(), None);
    }

    #[tokio::test]
    async fn saved_state_loads_identically() {
        let db = Database::open_in_memory().unwrap();
        let store = FocusStore::new(db.clone());

        let mut state = FocusSessionState::idle(FocusConfig::default());
        state.begin(Utc::now());
        state.tick();
        store.save(&state).await.unwrap();

        assert_eq!(
            db.get_value(ACTIVE_MODE_KEY).await.unwrap().as_deref(),
            Some("\"focus\"")
        );
        assert_eq!(store.load().await.unwrap(), Some(state));

        store.clear().await.unwrap();
        assert_eq!(store.load().await.unwrap(), None);
    }

    #[tokio::test]
    async fn corrupt_session_data_is_an_error() {
        let db = Database::open_in_memory().unwrap();
        db.put_value(ACTIVE_MODE_KEY, "\"focus\"").await.unwrap();
        db.put_value(SESSION_DATA_KEY, "{not json").await.unwrap();
        assert!(FocusStore::new(db).load().await.is_err());
    }

    #[tokio::test]
    async fn missing_session_data_is_an_error() {
        let db = Database::open_in_memory().unwrap();
        db.put_value(ACTIVE_MODE_KEY, "\"focus\"").await.unwrap();
        assert!(FocusStore::new(db).load().await.is_err());
    }

    #[tokio::test]
    async fn mode_none_means_no_session() {
        let db = Database::open_in_memory().unwrap();
        db.put_value(ACTIVE_MODE_KEY, "\"none\"").await.unwrap();
        assert_eq!(FocusStore::new(db).load().await.unwrap(), None);
    }
}
