//! HTTP client for a remote optimizer service.
//!
//! The service speaks JSON over a small REST surface rooted at the base
//! URL:
//!
//! | Call | Endpoint |
//! |------|----------|
//! | connectivity | `GET /health` |
//! | clear history | `DELETE /namespaces/{ns}/history` |
//! | submit score | `POST /namespaces/{ns}/scores` |
//! | live populate | `POST /namespaces/{ns}/populate` |
//! | prefetch batch | `POST /namespaces/{ns}/batch` |
//! | draw from cache | `POST /namespaces/{ns}/cache/draw` (404 when empty) |

use std::time::Duration;

use async_trait::async_trait;
use evotrial_core::{Candidate, FitnessRecord, Namespace};
use reqwest::{Client, ClientBuilder, Response, StatusCode, Url};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::{OptimizerClient, OptimizerError, PopulateRequest, Result};

#[derive(Debug, Serialize)]
struct ScoreBody {
    params: Candidate,
    score: f64,
}

#[derive(Debug, Serialize)]
struct PopulateBody<'a> {
    parameter_names: &'a [String],
    generation_count: u32,
    mutation_rate: f64,
    service_flag: bool,
}

#[derive(Debug, Serialize)]
struct BatchBody<'a> {
    parameter_names: &'a [String],
    count: usize,
}

#[derive(Debug, Deserialize)]
struct CandidateResponse {
    params: Candidate,
}

#[derive(Debug, Deserialize)]
struct BatchResponse {
    candidates: Vec<Candidate>,
}

/// Optimizer client backed by a remote HTTP service.
#[derive(Clone)]
pub struct HttpOptimizerClient {
    /// HTTP client
    client: Client,

    /// Service root
    base: Url,
}

impl HttpOptimizerClient {
    /// Create a client for the service at `base_url`.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let base = Url::parse(base_url)
            .map_err(|e| OptimizerError::InvalidRequest(format!("bad base URL {base_url}: {e}")))?;
        if base.cannot_be_a_base() {
            return Err(OptimizerError::InvalidRequest(format!(
                "base URL {base_url} cannot carry a path"
            )));
        }

        let client = ClientBuilder::new().timeout(timeout).build()?;
        Ok(Self { client, base })
    }

    /// Service root URL.
    pub fn base_url(&self) -> &Url {
        &self.base
    }

    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    fn namespace_endpoint(&self, namespace: &Namespace, tail: &[&str]) -> Url {
        let mut segments = vec!["namespaces", namespace.as_str()];
        segments.extend_from_slice(tail);
        self.endpoint(&segments)
    }
}

/// Turn a non-success response into [`OptimizerError::Rejected`].
async fn check(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let message = response.text().await.unwrap_or_default();
    Err(OptimizerError::Rejected { status: status.as_u16(), message })
}

#[async_trait]
impl OptimizerClient for HttpOptimizerClient {
    async fn has_connectivity(&self) -> bool {
        match self.client.get(self.endpoint(&["health"])).send().await {
            Ok(resp) => resp.status().is_success(),
            Err(e) => {
                warn!("Optimizer health check failed: {}", e);
                false
            }
        }
    }

    async fn clear_history(&self, namespace: &Namespace) -> Result<()> {
        let url = self.namespace_endpoint(namespace, &["history"]);
        let response = self.client.delete(url).send().await?;

        // Clearing an unknown namespace is not an error
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(());
        }
        check(response).await?;
        Ok(())
    }

    async fn submit_score(&self, record: &FitnessRecord) -> Result<()> {
        let url = self.namespace_endpoint(record.namespace(), &["scores"]);
        let body = ScoreBody {
            params: record.params().to_candidate(),
            score: record.score(),
        };
        check(self.client.post(url).json(&body).send().await?).await?;
        debug!("Submitted score {:.4} for {}", record.score(), record.namespace());
        Ok(())
    }

    async fn populate_live(&self, request: &PopulateRequest) -> Result<Candidate> {
        let url = self.namespace_endpoint(&request.namespace, &["populate"]);
        let body = PopulateBody {
            parameter_names: &request.parameter_names,
            generation_count: request.generation_count,
            mutation_rate: request.mutation_rate,
            service_flag: request.service_flag,
        };
        let response = check(self.client.post(url).json(&body).send().await?).await?;
        let parsed: CandidateResponse = serde_json::from_slice(&response.bytes().await?)?;
        Ok(parsed.params)
    }

    async fn prefetch_batch(
        &self,
        namespace: &Namespace,
        parameter_names: &[String],
        count: usize,
    ) -> Result<Vec<Candidate>> {
        let url = self.namespace_endpoint(namespace, &["batch"]);
        let body = BatchBody { parameter_names, count };
        let response = check(self.client.post(url).json(&body).send().await?).await?;
        let parsed: BatchResponse = serde_json::from_slice(&response.bytes().await?)?;
        Ok(parsed.candidates)
    }

    async fn draw_from_cache(&self, namespace: &Namespace) -> Result<Option<Candidate>> {
        let url = self.namespace_endpoint(namespace, &["cache", "draw"]);
        let response = self.client.post(url).send().await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let response = check(response).await?;
        let parsed: CandidateResponse = serde_json::from_slice(&response.bytes().await?)?;
        Ok(Some(parsed.params))
    }
}
