//! Equalizer preset queries and the built-in preset catalogue.

use {
    sqlx::{SqliteConnection, query, query_as, query_scalar},
    tracing::info,
};

use crate::{
    error::domain::LibraryError,
    library::{
        database::{LibraryDatabase, now_millis},
        models::EqPreset,
    },
};

/// Built-in presets: name, five band levels (mB), bass boost, virtualizer.
pub const BUILT_IN_PRESETS: &[(&str, [i32; 5], i32, i32)] = &[
    ("Flat", [0, 0, 0, 0, 0], 0, 0),
    ("Bass Boost", [600, 400, 0, 0, 0], 533, 0),
    ("Bass Reducer", [-600, -400, 0, 0, 0], 0, 0),
    ("Treble Boost", [0, 0, 0, 400, 600], 0, 0),
    ("Treble Reducer", [0, 0, 0, -400, -600], 0, 0),
    ("Vocal Boost", [-200, 0, 400, 200, 0], 0, 0),
    ("Rock", [400, 200, -200, 200, 400], 267, 200),
    ("Pop", [-200, 200, 400, 200, -200], 133, 300),
    ("Jazz", [300, 0, 200, 300, 400], 133, 250),
    ("Classical", [0, 0, 0, -200, -400], 0, 400),
    ("Hip Hop", [600, 400, 0, 200, 300], 667, 300),
    ("Electronic", [400, 200, 0, 300, 500], 400, 500),
];

async fn insert(conn: &mut SqliteConnection, preset: &EqPreset) -> Result<i64, LibraryError> {
    let created_at = if preset.created_at > 0 {
        preset.created_at
    } else {
        now_millis()
    };

    let id = query_scalar(
        r#"
        INSERT INTO eq_presets (
            name, is_custom, band_60hz, band_250hz, band_1khz, band_4khz, band_16khz,
            bass_boost, virtualizer, created_at
        )
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        RETURNING id
        "#,
    )
    .bind(&preset.name)
    .bind(preset.is_custom)
    .bind(preset.band_60hz)
    .bind(preset.band_250hz)
    .bind(preset.band_1khz)
    .bind(preset.band_4khz)
    .bind(preset.band_16khz)
    .bind(preset.bass_boost)
    .bind(preset.virtualizer)
    .bind(created_at)
    .fetch_one(conn)
    .await?;
    Ok(id)
}

impl LibraryDatabase {
    /// Lists built-in presets first, then custom ones, each by name.
    ///
    /// # Errors
    ///
    /// Returns `LibraryError` if the query fails.
    pub async fn get_all_presets(&self) -> Result<Vec<EqPreset>, LibraryError> {
        let presets = query_as::<_, EqPreset>(
            "SELECT * FROM eq_presets ORDER BY is_custom ASC, name COLLATE NOCASE ASC",
        )
        .fetch_all(self.pool())
        .await?;
        Ok(presets)
    }

    /// Lists the built-in presets by name.
    ///
    /// # Errors
    ///
    /// Returns `LibraryError` if the query fails.
    pub async fn get_built_in_presets(&self) -> Result<Vec<EqPreset>, LibraryError> {
        let presets = query_as::<_, EqPreset>(
            "SELECT * FROM eq_presets WHERE is_custom = 0 ORDER BY name COLLATE NOCASE ASC",
        )
        .fetch_all(self.pool())
        .await?;
        Ok(presets)
    }

    /// Lists the user-created presets by name.
    ///
    /// # Errors
    ///
    /// Returns `LibraryError` if the query fails.
    pub async fn get_custom_presets(&self) -> Result<Vec<EqPreset>, LibraryError> {
        let presets = query_as::<_, EqPreset>(
            "SELECT * FROM eq_presets WHERE is_custom = 1 ORDER BY name COLLATE NOCASE ASC",
        )
        .fetch_all(self.pool())
        .await?;
        Ok(presets)
    }

    /// Looks up a preset by id.
    ///
    /// # Errors
    ///
    /// Returns `LibraryError` if the query fails.
    pub async fn get_preset_by_id(&self, id: i64) -> Result<Option<EqPreset>, LibraryError> {
        let preset = query_as::<_, EqPreset>("SELECT * FROM eq_presets WHERE id = ?")
            .bind(id)
            .fetch_optional(self.pool())
            .await?;
        Ok(preset)
    }

    /// Looks up a preset by exact name, preferring built-ins.
    ///
    /// # Errors
    ///
    /// Returns `LibraryError` if the query fails.
    pub async fn get_preset_by_name(&self, name: &str) -> Result<Option<EqPreset>, LibraryError> {
        let preset = query_as::<_, EqPreset>(
            "SELECT * FROM eq_presets WHERE name = ? ORDER BY is_custom ASC, id ASC LIMIT 1",
        )
        .bind(name)
        .fetch_optional(self.pool())
        .await?;
        Ok(preset)
    }

    /// Stores a preset and returns its id.
    ///
    /// # Errors
    ///
    /// Returns `LibraryError` for a blank name or a failed statement.
    pub async fn insert_preset(&self, preset: &EqPreset) -> Result<i64, LibraryError> {
        if preset.name.trim().is_empty() {
            return Err(LibraryError::InvalidData {
                reason: "Preset name cannot be empty".to_string(),
            });
        }
        let mut conn = self.pool().acquire().await?;
        insert(&mut conn, preset).await
    }

    /// Overwrites the levels and name of an existing preset.
    ///
    /// # Errors
    ///
    /// Returns `LibraryError::NotFound` if no preset has this id.
    pub async fn update_preset(&self, preset: &EqPreset) -> Result<(), LibraryError> {
        let result = query(
            r#"
            UPDATE eq_presets SET
                name = ?, band_60hz = ?, band_250hz = ?, band_1khz = ?, band_4khz = ?,
                band_16khz = ?, bass_boost = ?, virtualizer = ?
            WHERE id = ?
            "#,
        )
        .bind(&preset.name)
        .bind(preset.band_60hz)
        .bind(preset.band_250hz)
        .bind(preset.band_1khz)
        .bind(preset.band_4khz)
        .bind(preset.band_16khz)
        .bind(preset.bass_boost)
        .bind(preset.virtualizer)
        .bind(preset.id)
        .execute(self.pool())
        .await?;

        if result.rows_affected() == 0 {
            return Err(LibraryError::NotFound {
                entity: "preset".to_string(),
                id: preset.id,
            });
        }
        Ok(())
    }

    /// Deletes a user-created preset. Built-in presets are never deleted.
    ///
    /// # Errors
    ///
    /// Returns `LibraryError` if the statement fails.
    pub async fn delete_custom_preset(&self, id: i64) -> Result<bool, LibraryError> {
        let result = query("DELETE FROM eq_presets WHERE id = ? AND is_custom = 1")
            .bind(id)
            .execute(self.pool())
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Inserts the built-in catalogue when no built-in preset exists yet.
    ///
    /// # Returns
    ///
    /// The number of presets inserted.
    ///
    /// # Errors
    ///
    /// Returns `LibraryError` if a statement fails.
    pub async fn seed_built_in_presets(&self) -> Result<usize, LibraryError> {
        let mut tx = self.pool().begin().await?;

        let existing: i64 = query_scalar("SELECT COUNT(*) FROM eq_presets WHERE is_custom = 0")
            .fetch_one(&mut *tx)
            .await?;
        if existing > 0 {
            return Ok(0);
        }

        let now = now_millis();
        for &(name, bands, bass_boost, virtualizer) in BUILT_IN_PRESETS {
            let preset = EqPreset {
                id: 0,
                name: name.to_string(),
                is_custom: false,
                band_60hz: bands[0],
                band_250hz: bands[1],
                band_1khz: bands[2],
                band_4khz: bands[3],
                band_16khz: bands[4],
                bass_boost,
                virtualizer,
                created_at: now,
            };
            insert(&mut tx, &preset).await?;
        }

        tx.commit().await?;
        info!("Seeded {} built-in equalizer presets", BUILT_IN_PRESETS.len());
        Ok(BUILT_IN_PRESETS.len())
    }
}
