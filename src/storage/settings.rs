use anyhow::Result;

use super::schema::Database;

/// Settings key holding the polling interval in minutes.
pub const POLLING_INTERVAL_KEY: &str = "polling_interval_minutes";

impl Database {
    // ========================================================================
    // Settings Operations
    // ========================================================================

    /// Get a single setting value by key, or `None` if not set.
    pub async fn get_setting(&self, key: &str) -> Result<Option<String>> {
        let row: Option<(String,)> = sqlx::query_as("SELECT value FROM settings WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(|(value,)| value))
    }

    /// Set a setting value (UPSERT).
    pub async fn set_setting(&self, key: &str, value: &str) -> Result<()> {
        sqlx::query(
            "INSERT INTO settings (key, value) VALUES (?, ?) \
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
        )
        .bind(key)
        .bind(value)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Polling interval in minutes.
    ///
    /// A missing or unparseable value yields the minimum; anything below the
    /// minimum is raised to it.
    pub async fn get_polling_interval(&self) -> Result<u32> {
        let stored = self
            .get_setting(POLLING_INTERVAL_KEY)
            .await?
            .and_then(|v| v.trim().parse::<u32>().ok())
            .unwrap_or(self.min_polling_interval);
        Ok(stored.max(self.min_polling_interval))
    }

    pub async fn set_polling_interval(&self, minutes: u32) -> Result<()> {
        self.set_setting(POLLING_INTERVAL_KEY, &minutes.to_string())
            .await
    }
}
