//! Face embedders.
//!
//! The face model itself lives outside this crate. These adapters turn an
//! uploaded image into a [`FaceScan`]: one embedding per face found.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::Embedding;
use crate::error::{EmbeddingError, Result};

/// Faces found in one image.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FaceScan {
    /// One embedding per detected face, in detection order.
    pub faces: Vec<Embedding>,
}

impl FaceScan {
    /// Create a scan from detected faces.
    pub fn new(faces: Vec<Embedding>) -> Self {
        Self { faces }
    }

    /// A scan with exactly one face.
    pub fn single(face: Embedding) -> Self {
        Self { faces: vec![face] }
    }

    /// Number of faces detected.
    pub fn face_count(&self) -> usize {
        self.faces.len()
    }

    /// The face used for matching: the first one detected.
    pub fn primary(&self) -> Option<&Embedding> {
        self.faces.first()
    }

    /// Fail unless every face has `dimension` components.
    pub fn check_dimension(&self, dimension: usize) -> Result<()> {
        match self.faces.iter().find(|face| face.len() != dimension) {
            Some(face) => Err(EmbeddingError::DimensionMismatch {
                expected: dimension,
                actual: face.len(),
            }),
            None => Ok(()),
        }
    }
}

/// Trait for face embedders.
#[async_trait]
pub trait FaceEmbedder: Send + Sync {
    /// Get the name of this embedder.
    fn name(&self) -> &str;

    /// Dimension of the embeddings this embedder produces.
    fn dimension(&self) -> usize;

    /// Detect faces in `image` and embed each of them.
    async fn embed_faces(&self, image: &[u8]) -> Result<FaceScan>;
}

/// Embedder for payloads that already carry the embeddings.
///
/// The image bytes are a JSON [`FaceScan`] document such as
/// `{"faces": [[0.1, 0.2, ...]]}`. Useful when faces are embedded on the
/// capture device and for tests.
pub struct JsonFaceEmbedder {
    dimension: usize,
}

impl JsonFaceEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self { dimension }
    }
}

#[async_trait]
impl FaceEmbedder for JsonFaceEmbedder {
    fn name(&self) -> &str {
        "json"
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn embed_faces(&self, image: &[u8]) -> Result<FaceScan> {
        let scan: FaceScan = serde_json::from_slice(image)?;
        scan.check_dimension(self.dimension)?;
        debug!("Parsed {} precomputed faces", scan.face_count());
        Ok(scan)
    }
}

/// Embedder backed by a remote face embedding service.
///
/// The image bytes are posted as-is; the service answers with a JSON
/// [`FaceScan`].
pub struct HttpFaceEmbedder {
    /// Endpoint URL.
    url: String,

    /// Bearer token, if the service wants one.
    api_key: Option<String>,

    /// HTTP client.
    client: reqwest::Client,

    /// Expected embedding dimension.
    dimension: usize,
}

impl HttpFaceEmbedder {
    /// Create a new HTTP embedder.
    pub fn new(url: impl Into<String>, dimension: usize) -> Self {
        Self {
            url: url.into(),
            api_key: None,
            client: reqwest::Client::new(),
            dimension,
        }
    }

    /// Set the API key.
    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    /// Use a preconfigured HTTP client.
    pub fn with_client(mut self, client: reqwest::Client) -> Self {
        self.client = client;
        self
    }
}

#[async_trait]
impl FaceEmbedder for HttpFaceEmbedder {
    fn name(&self) -> &str {
        "http"
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn embed_faces(&self, image: &[u8]) -> Result<FaceScan> {
        debug!("Requesting face embeddings for {} byte image", image.len());

        let mut request = self
            .client
            .post(&self.url)
            .header("Content-Type", "application/octet-stream")
            .body(image.to_vec());
        if let Some(api_key) = &self.api_key {
            request = request.header("Authorization", format!("Bearer {api_key}"));
        }

        let response = request.send().await?;

        if response.status() == reqwest::StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.parse().ok())
                .unwrap_or(60);

            return Err(EmbeddingError::RateLimited {
                retry_after_secs: retry_after,
            });
        }

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(EmbeddingError::ApiRequest(format!(
                "{status}: {error_text}"
            )));
        }

        let body = response.bytes().await?;
        let scan: FaceScan = serde_json::from_slice(&body)
            .map_err(|e| EmbeddingError::InvalidResponse(e.to_string()))?;
        scan.check_dimension(self.dimension)?;

        info!("Face embedder found {} faces", scan.face_count());
        Ok(scan)
    }
}
