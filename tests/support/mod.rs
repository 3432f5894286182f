//! Shared fakes for integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use bytes::Bytes;
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use random_mod_collector::api::{
    ApiClient, ApiError, ApiRequest, ApiResponse, ApiResult, ClientCredentials, HttpMethod,
    HttpTransport, RateLimiter, RateLimiterOptions,
};
use random_mod_collector::fetcher::{
    BeatmapDecoder, BeatmapSource, DecodeError, DecodedBeatmap, FetchError, FetchResult,
    OsuFileDecoder,
};
use random_mod_collector::oracle::{ModSettings, OracleError, OracleResult, ScoringOracle};
use random_mod_collector::shutdown::ShutdownCoordinator;
use random_mod_collector::BeatmapId;

pub const TOKEN_URL: &str = "https://osu.test/oauth/token";

pub const OSU_FILE: &str = "osu file format v14\n\
    \n\
    [General]\n\
    Mode: 0\n\
    \n\
    [Metadata]\n\
    Title:Test Map\n\
    Artist:Tester\n\
    Version:Insane\n\
    \n\
    [HitObjects]\n\
    256,192,1000,1,0,0:0:0:0:\n";

pub fn client_credentials() -> ClientCredentials {
    ClientCredentials {
        client_id: "4242".to_string(),
        client_secret: "secret".to_string(),
        token_url: TOKEN_URL.to_string(),
        scope: "public".to_string(),
    }
}

pub fn unlimited() -> RateLimiterOptions {
    RateLimiterOptions {
        token_limit: 1000,
        tokens_per_period: 1000,
        replenishment_period: Duration::from_secs(1),
        queue_limit: 1000,
    }
}

pub fn token_response(token: &str, expires_in: u64) -> ApiResponse {
    ApiResponse {
        status: 200,
        body: Bytes::from(
            serde_json::json!({
                "token_type": "Bearer",
                "expires_in": expires_in,
                "access_token": token,
            })
            .to_string(),
        ),
    }
}

pub fn status_response(status: u16, body: &'static str) -> ApiResponse {
    ApiResponse {
        status,
        body: Bytes::from_static(body.as_bytes()),
    }
}

pub fn decoded(id: BeatmapId) -> DecodedBeatmap {
    OsuFileDecoder::default()
        .decode(id, Bytes::from_static(OSU_FILE.as_bytes()))
        .unwrap()
}

type Handler = Box<dyn Fn(&ApiRequest) -> ApiResponse + Send + Sync>;

/// Transport answering from a closure and recording every request
pub struct ScriptedTransport {
    handler: Handler,
    latency: Duration,
    requests: Mutex<Vec<ApiRequest>>,
}

impl ScriptedTransport {
    pub fn new<F>(handler: F) -> Self
    where
        F: Fn(&ApiRequest) -> ApiResponse + Send + Sync + 'static,
    {
        Self {
            handler: Box::new(handler),
            latency: Duration::ZERO,
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Token endpoint issues `expires_in` credentials, everything else gets an osu file.
    pub fn osu_api(expires_in: u64) -> Self {
        let issued = AtomicUsize::new(0);
        Self::new(move |request| {
            if request.url == TOKEN_URL {
                let n = issued.fetch_add(1, Ordering::SeqCst) + 1;
                token_response(&format!("token-{n}"), expires_in)
            } else {
                status_response(200, OSU_FILE)
            }
        })
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn requests(&self) -> Vec<ApiRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn count_to(&self, url: &str) -> usize {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|request| request.url == url)
            .count()
    }
}

#[async_trait]
impl HttpTransport for ScriptedTransport {
    async fn execute(&self, request: &ApiRequest) -> ApiResult<ApiResponse> {
        self.requests.lock().unwrap().push(request.clone());
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        Ok((self.handler)(request))
    }
}

pub fn api_client(transport: Arc<ScriptedTransport>, options: RateLimiterOptions) -> ApiClient {
    ApiClient::new(
        transport,
        Arc::new(RateLimiter::new(options).unwrap()),
        client_credentials(),
        "20240101",
    )
}

/// In-memory beatmap source with configurable failures
#[derive(Default)]
pub struct FakeSource {
    failing: HashSet<BeatmapId>,
    auth_failing: HashSet<BeatmapId>,
    fetched: Mutex<Vec<BeatmapId>>,
}

impl FakeSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing(mut self, ids: &[BeatmapId]) -> Self {
        self.failing.extend(ids);
        self
    }

    pub fn auth_failing(mut self, ids: &[BeatmapId]) -> Self {
        self.auth_failing.extend(ids);
        self
    }

    pub fn fetched(&self) -> Vec<BeatmapId> {
        self.fetched.lock().unwrap().clone()
    }
}

#[async_trait]
impl BeatmapSource for FakeSource {
    async fn fetch(&self, id: BeatmapId, shutdown: &ShutdownCoordinator) -> FetchResult<DecodedBeatmap> {
        shutdown.check().map_err(ApiError::from)?;
        self.fetched.lock().unwrap().push(id);

        if self.auth_failing.contains(&id) {
            return Err(FetchError::Api(ApiError::AuthFailure(
                "token endpoint returned 401".to_string(),
            )));
        }
        if self.failing.contains(&id) {
            return Err(FetchError::Decode(DecodeError::Empty));
        }
        Ok(decoded(id))
    }
}

/// Deterministic oracle: baseline is `id / 100`, variants add `angle / 10`.
#[derive(Default)]
pub struct FakeOracle {
    failing_variants: HashSet<BeatmapId>,
    evaluations: Mutex<Vec<(BeatmapId, ModSettings)>>,
    released: Mutex<Vec<BeatmapId>>,
    shutdown_after: Option<(usize, Arc<ShutdownCoordinator>)>,
}

impl FakeOracle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_variants(mut self, ids: &[BeatmapId]) -> Self {
        self.failing_variants.extend(ids);
        self
    }

    /// Request shutdown once `count` variants have been evaluated.
    pub fn shutdown_after(mut self, count: usize, shutdown: Arc<ShutdownCoordinator>) -> Self {
        self.shutdown_after = Some((count, shutdown));
        self
    }

    pub fn evaluations(&self) -> Vec<(BeatmapId, ModSettings)> {
        self.evaluations.lock().unwrap().clone()
    }

    pub fn released(&self) -> Vec<BeatmapId> {
        self.released.lock().unwrap().clone()
    }

    pub fn baseline_for(id: BeatmapId) -> f64 {
        f64::from(id) / 100.0
    }
}

#[async_trait]
impl ScoringOracle for FakeOracle {
    async fn baseline(&self, beatmap: &DecodedBeatmap) -> OracleResult<f64> {
        Ok(Self::baseline_for(beatmap.id))
    }

    async fn evaluate(&self, beatmap: &DecodedBeatmap, mods: ModSettings) -> OracleResult<f64> {
        let evaluated = {
            let mut evaluations = self.evaluations.lock().unwrap();
            evaluations.push((beatmap.id, mods));
            evaluations.len()
        };

        if let Some((count, shutdown)) = &self.shutdown_after {
            if evaluated >= *count {
                shutdown.request_shutdown();
            }
        }

        if self.failing_variants.contains(&beatmap.id) {
            return Err(OracleError::Failed {
                status: "exit status: 1".to_string(),
                stderr: "unsupported beatmap".to_string(),
            });
        }
        Ok(Self::baseline_for(beatmap.id) + f64::from(mods.angle_sharpness()) / 10.0)
    }

    async fn release(&self, beatmap: &DecodedBeatmap) {
        self.released.lock().unwrap().push(beatmap.id);
    }
}

pub fn is_get(request: &ApiRequest) -> bool {
    request.method == HttpMethod::Get
}
