//! Beatmap retrieval
//!
//! [`BeatmapFetcher`] downloads the raw beatmap file through the shared
//! [`ApiClient`] and hands the bytes to a [`BeatmapDecoder`]. It has no retry
//! logic of its own: admission waits happen inside the client and failed items
//! are skipped by the sampling loop.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

use crate::api::{ApiClient, ApiError};
use crate::shutdown::ShutdownCoordinator;
use crate::BeatmapId;

pub mod osu_parser;

pub use osu_parser::{BeatmapDecoder, DecodeError, DecodedBeatmap, OsuFileDecoder, Ruleset};

/// Where raw beatmap files are served from; `{id}` is replaced by the identifier.
pub const DEFAULT_BEATMAP_URL_TEMPLATE: &str = "https://osu.ppy.sh/osu/{id}";

/// Placeholder substituted in beatmap URL templates
pub const ID_PLACEHOLDER: &str = "{id}";

/// Fetch errors
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    /// Request failed
    #[error(transparent)]
    Api(#[from] ApiError),

    /// Body could not be decoded
    #[error("decode error: {0}")]
    Decode(#[from] DecodeError),
}

impl FetchError {
    /// Whether the error should abort the whole run rather than one item
    pub fn is_fatal(&self) -> bool {
        match self {
            FetchError::Api(e) => e.is_fatal(),
            FetchError::Decode(_) => false,
        }
    }
}

/// Result type for fetch operations
pub type FetchResult<T> = Result<T, FetchError>;

/// Anything that can produce a decoded beatmap by identifier
#[async_trait]
pub trait BeatmapSource: Send + Sync {
    /// Retrieve and decode beatmap `id`.
    async fn fetch(&self, id: BeatmapId, shutdown: &ShutdownCoordinator) -> FetchResult<DecodedBeatmap>;
}

/// Downloads beatmaps over the API and decodes them
pub struct BeatmapFetcher {
    client: Arc<ApiClient>,
    decoder: Arc<dyn BeatmapDecoder>,
    url_template: String,
}

impl std::fmt::Debug for BeatmapFetcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BeatmapFetcher")
            .field("url_template", &self.url_template)
            .finish_non_exhaustive()
    }
}

impl BeatmapFetcher {
    /// Create a fetcher using the default beatmap URL.
    pub fn new(client: Arc<ApiClient>, decoder: Arc<dyn BeatmapDecoder>) -> Self {
        Self {
            client,
            decoder,
            url_template: DEFAULT_BEATMAP_URL_TEMPLATE.to_string(),
        }
    }

    /// Override the URL template (`{id}` is substituted).
    pub fn with_url_template(mut self, url_template: impl Into<String>) -> Self {
        self.url_template = url_template.into();
        self
    }

    /// URL the beatmap `id` is downloaded from
    pub fn beatmap_url(&self, id: BeatmapId) -> String {
        self.url_template.replace(ID_PLACEHOLDER, &id.to_string())
    }
}

#[async_trait]
impl BeatmapSource for BeatmapFetcher {
    async fn fetch(&self, id: BeatmapId, shutdown: &ShutdownCoordinator) -> FetchResult<DecodedBeatmap> {
        let url = self.beatmap_url(id);
        let raw = self.client.get(&url, shutdown).await?;
        debug!(beatmap_id = id, bytes = raw.len(), "Downloaded beatmap");

        let beatmap = self.decoder.decode(id, raw)?;
        debug!(
            beatmap_id = id,
            title = %beatmap.title,
            difficulty = %beatmap.difficulty_name,
            hit_objects = beatmap.hit_objects,
            "Decoded beatmap"
        );
        Ok(beatmap)
    }
}
