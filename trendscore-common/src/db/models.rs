//! Persistent records and their queries
//!
//! Models and their series are maintained by an external configuration tool;
//! the sync core only reads them. Raw points, scores and the fetch log are
//! written through the score store in `trendscore-sync`.

use crate::regions::DEFAULT_REGION;
use crate::{Error, Result};
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::{Row, SqlitePool};
use std::collections::BTreeSet;
use std::num::NonZeroU32;
use uuid::Uuid;

/// How a model's input data is obtained
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModelKind {
    /// Search-term volumes from Google Trends
    Search,
    /// Region-scoped n-gram counts
    Ngram,
    /// Scores supplied directly as CSV rows
    Csv,
}

impl ModelKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ModelKind::Search => "search",
            ModelKind::Ngram => "ngram",
            ModelKind::Csv => "csv",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "search" => Ok(ModelKind::Search),
            "ngram" => Ok(ModelKind::Ngram),
            "csv" => Ok(ModelKind::Csv),
            other => Err(Error::Config(format!("Unknown model kind '{}'", other))),
        }
    }

    /// Whether runs fetch raw points and score them
    pub fn is_fetched(&self) -> bool {
        !matches!(self, ModelKind::Csv)
    }
}

/// Scoring configuration of a fetched model
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelSettings {
    scoring_function: String,
    window_size: NonZeroU32,
}

impl ModelSettings {
    /// Validate and build settings
    pub fn new(scoring_function: impl Into<String>, window_size: u32) -> Result<Self> {
        let scoring_function = scoring_function.into();
        if scoring_function.trim().is_empty() {
            return Err(Error::Config("Scoring function name is empty".to_string()));
        }
        let window_size = NonZeroU32::new(window_size)
            .ok_or_else(|| Error::Config("Moving average window must be at least 1 day".to_string()))?;
        Ok(Self {
            scoring_function,
            window_size,
        })
    }

    pub fn scoring_function(&self) -> &str {
        &self.scoring_function
    }

    pub fn window_size(&self) -> u32 {
        self.window_size.get()
    }

    /// Window as a signed day count for date arithmetic
    pub fn window_days(&self) -> i64 {
        i64::from(self.window_size.get())
    }
}

/// One named external signal
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct InputSeries {
    pub id: i64,
    pub name: String,
    /// Region scope (n-grams only)
    pub region: Option<String>,
}

/// A scoring configuration and its input series
#[derive(Debug, Clone)]
pub struct Model {
    pub id: i64,
    pub name: String,
    pub kind: ModelKind,
    pub public: bool,
    pub settings: Option<ModelSettings>,
    pub series: Vec<InputSeries>,
}

impl Model {
    /// Settings of a fetched model
    pub fn settings(&self) -> Result<&ModelSettings> {
        self.settings.as_ref().ok_or_else(|| {
            Error::Config(format!("Model '{}' has no scoring settings", self.name))
        })
    }

    /// Regions this model produces scores for
    ///
    /// Region-scoped series score into their own regions; unscoped series
    /// score into the default region.
    pub fn score_regions(&self) -> Vec<String> {
        let mut regions: BTreeSet<String> = BTreeSet::new();
        for series in &self.series {
            match &series.region {
                Some(region) => regions.insert(region.clone()),
                None => regions.insert(DEFAULT_REGION.to_string()),
            };
        }
        if regions.is_empty() {
            regions.insert(DEFAULT_REGION.to_string());
        }
        regions.into_iter().collect()
    }

    /// Series contributing to scores in `region`
    pub fn series_for_region(&self, region: &str) -> Vec<InputSeries> {
        self.series
            .iter()
            .filter(|s| s.region.as_deref().unwrap_or(DEFAULT_REGION) == region)
            .cloned()
            .collect()
    }
}

/// One observation for a series on one day
#[derive(Debug, Clone, PartialEq)]
pub struct RawPoint {
    pub series_id: i64,
    pub day: NaiveDate,
    pub value: f64,
}

/// One output value for a model, region and day
#[derive(Debug, Clone, PartialEq)]
pub struct ComputedScore {
    pub model_id: i64,
    pub region: String,
    pub day: NaiveDate,
    pub value: f64,
}

/// Audit record of a day the source returned data for
#[derive(Debug, Clone, PartialEq)]
pub struct FetchLogEntry {
    pub source: String,
    pub day: NaiveDate,
    pub fetched_at: DateTime<Utc>,
    pub run_id: Uuid,
}

/// Insert a model, returning its id
pub async fn insert_model(
    pool: &SqlitePool,
    name: &str,
    kind: ModelKind,
    public: bool,
    settings: Option<&ModelSettings>,
) -> Result<i64> {
    let result = sqlx::query(
        r#"
        INSERT INTO models (name, kind, public, scoring_function, window_size)
        VALUES (?, ?, ?, ?, ?)
        "#,
    )
    .bind(name)
    .bind(kind.as_str())
    .bind(public)
    .bind(settings.map(|s| s.scoring_function().to_string()))
    .bind(settings.map(|s| i64::from(s.window_size())))
    .execute(pool)
    .await?;

    Ok(result.last_insert_rowid())
}

/// Attach a series to a model, creating the series if it is new
pub async fn add_series_to_model(
    pool: &SqlitePool,
    model_id: i64,
    name: &str,
    region: Option<&str>,
) -> Result<InputSeries> {
    let region_key = region.unwrap_or("");

    sqlx::query("INSERT OR IGNORE INTO input_series (name, region) VALUES (?, ?)")
        .bind(name)
        .bind(region_key)
        .execute(pool)
        .await?;

    let id: i64 = sqlx::query_scalar("SELECT id FROM input_series WHERE name = ? AND region = ?")
        .bind(name)
        .bind(region_key)
        .fetch_one(pool)
        .await?;

    sqlx::query("INSERT OR IGNORE INTO model_series (model_id, series_id) VALUES (?, ?)")
        .bind(model_id)
        .bind(id)
        .execute(pool)
        .await?;

    Ok(InputSeries {
        id,
        name: name.to_string(),
        region: region.map(str::to_string),
    })
}

/// Load a model and its series
///
/// Returns `Ok(None)` for an unknown id and a configuration error when the
/// stored row is malformed.
pub async fn load_model(pool: &SqlitePool, model_id: i64) -> Result<Option<Model>> {
    let row = sqlx::query(
        "SELECT id, name, kind, public, scoring_function, window_size FROM models WHERE id = ?",
    )
    .bind(model_id)
    .fetch_optional(pool)
    .await?;

    let Some(row) = row else {
        return Ok(None);
    };

    let mut model = model_from_row(&row)?;
    model.series = load_series(pool, model.id).await?;
    Ok(Some(model))
}

/// All models ordered by id, without their series
pub async fn list_models(pool: &SqlitePool) -> Result<Vec<Model>> {
    let rows = sqlx::query(
        "SELECT id, name, kind, public, scoring_function, window_size FROM models ORDER BY id",
    )
    .fetch_all(pool)
    .await?;

    rows.iter().map(model_from_row).collect()
}

fn model_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Model> {
    let name: String = row.get("name");
    let kind = ModelKind::parse(row.get::<String, _>("kind").as_str())?;
    let function: Option<String> = row.get("scoring_function");
    let window: Option<i64> = row.get("window_size");

    let settings = match (kind.is_fetched(), function, window) {
        (false, _, _) => None,
        (true, Some(function), Some(window)) => {
            let window = u32::try_from(window).map_err(|_| {
                Error::Config(format!("Model '{}' has invalid window size {}", name, window))
            })?;
            Some(ModelSettings::new(function, window)?)
        }
        (true, _, _) => {
            return Err(Error::Config(format!(
                "Model '{}' is missing its scoring function or window size",
                name
            )))
        }
    };

    Ok(Model {
        id: row.get("id"),
        name,
        kind,
        public: row.get("public"),
        settings,
        series: Vec::new(),
    })
}

async fn load_series(pool: &SqlitePool, model_id: i64) -> Result<Vec<InputSeries>> {
    let rows = sqlx::query(
        r#"
        SELECT s.id, s.name, s.region
        FROM input_series s
        JOIN model_series ms ON ms.series_id = s.id
        WHERE ms.model_id = ?
        ORDER BY s.id
        "#,
    )
    .bind(model_id)
    .fetch_all(pool)
    .await?;

    Ok(rows
        .iter()
        .map(|row| {
            let region: String = row.get("region");
            InputSeries {
                id: row.get("id"),
                name: row.get("name"),
                region: if region.is_empty() { None } else { Some(region) },
            }
        })
        .collect())
}

/// Most recent day with a stored score, in any region
pub async fn latest_score_day(pool: &SqlitePool, model_id: i64) -> Result<Option<NaiveDate>> {
    let day: Option<NaiveDate> =
        sqlx::query_scalar("SELECT MAX(day) FROM model_scores WHERE model_id = ?")
            .bind(model_id)
            .fetch_one(pool)
            .await?;
    Ok(day)
}

/// Scores for one region in `start..=end`, ascending by day
pub async fn scores_between(
    pool: &SqlitePool,
    model_id: i64,
    region: &str,
    start: NaiveDate,
    end: NaiveDate,
) -> Result<Vec<ComputedScore>> {
    let rows = sqlx::query(
        r#"
        SELECT model_id, region, day, value FROM model_scores
        WHERE model_id = ? AND region = ? AND day >= ? AND day <= ?
        ORDER BY day
        "#,
    )
    .bind(model_id)
    .bind(region)
    .bind(start)
    .bind(end)
    .fetch_all(pool)
    .await?;

    Ok(rows
        .iter()
        .map(|row| ComputedScore {
            model_id: row.get("model_id"),
            region: row.get("region"),
            day: row.get("day"),
            value: row.get("value"),
        })
        .collect())
}
