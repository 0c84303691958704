// crates/adtrack-validator/src/peers.rs

//! Peer requests and the fan-out used to send them
//!
//! Miners are pinged for liveness and report the campaign items they hold.
//! Validators are asked for visits observed after the sync offset. Miners are
//! told about orders applied to their visits.

use {
    crate::error::{Result, ValidatorError},
    adtrack_common::{
        config::Setting,
        types::{Campaign, MinerAssignment, VisitRecord},
    },
    async_trait::async_trait,
    chrono::{DateTime, Utc},
    futures::{stream, StreamExt},
    serde::{de::DeserializeOwned, Deserialize, Serialize},
    std::{
        collections::{BTreeMap, HashMap},
        future::Future,
        time::Duration,
    },
    tokio::time,
    tracing::{debug, warn},
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PingRequest {
    pub hotkey: String,
    pub block: u64,
    pub active_miners: Vec<String>,
    pub active_validators: Vec<String>,
    pub campaigns: Vec<Campaign>,
    pub settings: Vec<Setting>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PingResponse {
    pub hotkey: String,
    pub block: u64,
    /// Campaign items the miner currently holds.
    #[serde(default)]
    pub assignments: Vec<MinerAssignment>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncVisitsRequest {
    pub offset: Option<DateTime<Utc>>,
    pub limit: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotifyOrderRequest {
    pub visit: VisitRecord,
}

#[async_trait]
pub trait PeerClient: Send + Sync + 'static {
    async fn ping(&self, peer: &str, request: &PingRequest) -> Result<PingResponse>;

    async fn sync_visits(&self, peer: &str, request: &SyncVisitsRequest) -> Result<Vec<VisitRecord>>;

    async fn notify_order(&self, peer: &str, request: &NotifyOrderRequest) -> Result<()>;
}

/// Send `call` to every peer, at most `max_concurrent` at a time, and collect
/// whatever answered before `timeout`.
///
/// Peers that fail or do not answer in time are left out of the map.
pub async fn broadcast<T, F, Fut>(
    peers: &[String],
    max_concurrent: usize,
    timeout: Duration,
    call: F,
) -> BTreeMap<String, T>
where
    F: Fn(String) -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut order = peers.to_vec();
    fastrand::shuffle(&mut order);

    let mut responses = BTreeMap::new();
    let round = async {
        let mut calls = stream::iter(order)
            .map(|peer| {
                let request = call(peer.clone());
                async move { (peer, request.await) }
            })
            .buffer_unordered(max_concurrent.max(1));

        while let Some((peer, result)) = calls.next().await {
            match result {
                Ok(response) => {
                    responses.insert(peer, response);
                }
                Err(e) => debug!("Peer {} failed: {}", peer, e),
            }
        }
    };

    if time::timeout(timeout, round).await.is_err() {
        warn!(
            "Peer round timed out after {:?}, {} of {} peers answered",
            timeout,
            responses.len(),
            peers.len()
        );
    }
    responses
}

/// JSON over HTTP. Peer hotkeys resolve to base urls through the address book.
pub struct HttpPeerClient {
    client: reqwest::Client,
    addresses: HashMap<String, String>,
}

impl HttpPeerClient {
    pub fn new(addresses: HashMap<String, String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ValidatorError::Other(e.into()))?;
        Ok(Self { client, addresses })
    }

    async fn post<Req, Resp>(&self, peer: &str, path: &str, request: &Req) -> Result<Resp>
    where
        Req: Serialize + Sync,
        Resp: DeserializeOwned,
    {
        let base = self
            .addresses
            .get(peer)
            .ok_or_else(|| ValidatorError::peer(peer, "no address known"))?;
        let url = format!("{}/{}", base.trim_end_matches('/'), path);

        let response = self
            .client
            .post(&url)
            .json(request)
            .send()
            .await
            .map_err(|e| ValidatorError::peer(peer, format!("HTTP request failed: {e}")))?;

        if !response.status().is_success() {
            return Err(ValidatorError::peer(peer, format!("HTTP error: {}", response.status())));
        }

        response
            .json::<Resp>()
            .await
            .map_err(|e| ValidatorError::peer(peer, format!("Failed to parse response: {e}")))
    }
}

#[async_trait]
impl PeerClient for HttpPeerClient {
    async fn ping(&self, peer: &str, request: &PingRequest) -> Result<PingResponse> {
        self.post(peer, "ping", request).await
    }

    async fn sync_visits(&self, peer: &str, request: &SyncVisitsRequest) -> Result<Vec<VisitRecord>> {
        self.post(peer, "visits/sync", request).await
    }

    async fn notify_order(&self, peer: &str, request: &NotifyOrderRequest) -> Result<()> {
        let _: serde_json::Value = self.post(peer, "orders/notify", request).await?;
        Ok(())
    }
}
