//! External calculator process oracle
//!
//! Each evaluation spawns the configured program with templated arguments.
//! The beatmap is written into a private temporary directory on first use,
//! passed by path, and removed again when the beatmap is released. Standard output must contain either a bare number or a JSON
//! document with a `star_rating` field somewhere inside it.

use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tokio::sync::Mutex;
use tracing::{debug, trace, warn};

use super::{ModSettings, OracleError, OracleResult, ScoringOracle, RANDOM_MOD_ACRONYM};
use crate::fetcher::DecodedBeatmap;
use crate::BeatmapId;

const DEFAULT_TIMEOUT_SECS: u64 = 120;
const STAR_RATING_KEY: &str = "star_rating";

fn default_baseline_args() -> Vec<String> {
    vec!["{beatmap}".to_string()]
}

fn default_variant_args() -> Vec<String> {
    [
        "{beatmap}",
        "--mod",
        "{mods}",
        "--seed",
        "{seed}",
        "--angle-sharpness",
        "{angle_sharpness}",
    ]
    .iter()
    .map(|arg| (*arg).to_string())
    .collect()
}

fn default_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

/// How to invoke the external calculator
///
/// Argument templates may contain `{beatmap}`, `{mods}`, `{seed}` and
/// `{angle_sharpness}`. Arguments that expand to nothing are dropped.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct OracleCommandSettings {
    /// Executable to run
    pub program: String,
    /// Arguments for the unmodified rating
    #[serde(default = "default_baseline_args")]
    pub baseline_args: Vec<String>,
    /// Arguments for a Random-mod rating
    #[serde(default = "default_variant_args")]
    pub variant_args: Vec<String>,
    /// Per-evaluation timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl OracleCommandSettings {
    /// Settings for `program` with default argument templates.
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            baseline_args: default_baseline_args(),
            variant_args: default_variant_args(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }
}

/// [`ScoringOracle`] that shells out to an external calculator
#[derive(Debug)]
pub struct CommandOracle {
    settings: OracleCommandSettings,
    work_dir: tempfile::TempDir,
    written: Mutex<HashSet<BeatmapId>>,
}

impl CommandOracle {
    /// Create the oracle and its scratch directory.
    pub fn new(settings: OracleCommandSettings) -> OracleResult<Self> {
        let work_dir = tempfile::Builder::new()
            .prefix("random-mod-collector-")
            .tempdir()
            .map_err(|e| OracleError::Io(format!("failed to create scratch directory: {e}")))?;
        Ok(Self {
            settings,
            work_dir,
            written: Mutex::new(HashSet::new()),
        })
    }

    /// Scratch directory holding beatmap files for the calculator
    pub fn work_dir(&self) -> &Path {
        self.work_dir.path()
    }

    async fn beatmap_path(&self, beatmap: &DecodedBeatmap) -> OracleResult<PathBuf> {
        let path = self.scratch_path(beatmap.id);
        let mut written = self.written.lock().await;
        if !written.contains(&beatmap.id) {
            tokio::fs::write(&path, beatmap.raw())
                .await
                .map_err(|e| OracleError::Io(format!("failed to write {}: {e}", path.display())))?;
            written.insert(beatmap.id);
        }
        Ok(path)
    }

    fn scratch_path(&self, id: BeatmapId) -> PathBuf {
        self.work_dir.path().join(format!("{id}.osu"))
    }

    async fn run(&self, templates: &[String], beatmap: &Path, mods: Option<ModSettings>) -> OracleResult<f64> {
        let args = expand_args(templates, beatmap, mods);
        trace!(program = %self.settings.program, ?args, "Spawning calculator");

        let child = Command::new(&self.settings.program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| OracleError::Io(format!("failed to start {}: {e}", self.settings.program)))?;

        let timeout = Duration::from_secs(self.settings.timeout_secs);
        let output = tokio::time::timeout(timeout, child.wait_with_output())
            .await
            .map_err(|_| OracleError::Timeout(timeout))?
            .map_err(|e| OracleError::Io(e.to_string()))?;

        if !output.status.success() {
            return Err(OracleError::Failed {
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let rating = parse_rating(&stdout)?;
        debug!(rating, ?mods, "Calculator finished");
        Ok(rating)
    }
}

#[async_trait]
impl ScoringOracle for CommandOracle {
    async fn baseline(&self, beatmap: &DecodedBeatmap) -> OracleResult<f64> {
        let path = self.beatmap_path(beatmap).await?;
        self.run(&self.settings.baseline_args, &path, None).await
    }

    async fn evaluate(&self, beatmap: &DecodedBeatmap, mods: ModSettings) -> OracleResult<f64> {
        let path = self.beatmap_path(beatmap).await?;
        self.run(&self.settings.variant_args, &path, Some(mods)).await
    }

    async fn release(&self, beatmap: &DecodedBeatmap) {
        let mut written = self.written.lock().await;
        if !written.remove(&beatmap.id) {
            return;
        }

        let path = self.scratch_path(beatmap.id);
        if let Err(e) = tokio::fs::remove_file(&path).await {
            warn!(path = %path.display(), error = %e, "Failed to remove scratch beatmap");
        }
    }
}

/// Substitute placeholders in every template, dropping arguments that end up empty.
pub fn expand_args(templates: &[String], beatmap: &Path, mods: Option<ModSettings>) -> Vec<String> {
    let beatmap = beatmap.display().to_string();
    let (acronym, seed, angle) = match mods {
        Some(mods) => (
            RANDOM_MOD_ACRONYM.to_string(),
            mods.seed().to_string(),
            mods.angle_sharpness().to_string(),
        ),
        None => (String::new(), String::new(), String::new()),
    };

    templates
        .iter()
        .map(|template| {
            template
                .replace("{beatmap}", &beatmap)
                .replace("{mods}", &acronym)
                .replace("{seed}", &seed)
                .replace("{angle_sharpness}", &angle)
        })
        .filter(|arg| !arg.is_empty())
        .collect()
}

/// Read a star rating from calculator output.
///
/// Accepts a bare number on the last non-empty line, or JSON containing a
/// numeric `star_rating` at any depth.
pub fn parse_rating(stdout: &str) -> OracleResult<f64> {
    let trimmed = stdout.trim();
    if let Some(last) = trimmed.lines().map(str::trim).filter(|l| !l.is_empty()).last() {
        if let Ok(value) = last.parse::<f64>() {
            if value.is_finite() {
                return Ok(value);
            }
        }
    }

    let json: serde_json::Value = serde_json::from_str(trimmed)
        .map_err(|_| OracleError::InvalidOutput(excerpt(trimmed)))?;
    find_star_rating(&json).ok_or_else(|| OracleError::InvalidOutput(excerpt(trimmed)))
}

fn find_star_rating(value: &serde_json::Value) -> Option<f64> {
    match value {
        serde_json::Value::Object(map) => map
            .get(STAR_RATING_KEY)
            .and_then(serde_json::Value::as_f64)
            .or_else(|| map.values().find_map(find_star_rating)),
        serde_json::Value::Array(items) => items.iter().find_map(find_star_rating),
        _ => None,
    }
}

fn excerpt(text: &str) -> String {
    text.chars().take(120).collect()
}
