//! Attendance engine: registration and capture flows.

use std::sync::Arc;

use chrono::{DateTime, SecondsFormat, Utc};
use rollcall_embeddings::{
    EmbeddingStore, FaceEmbedder, HttpFaceEmbedder, JsonFaceEmbedder, Matcher, StoreStats,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::config::{EmbedderConfig, RollcallConfig};
use crate::durable::DurableStore;
use crate::error::{EngineError, EnrollmentError, ErrorKind, Result};
use crate::file_store::JsonFileStore;
use crate::guard::EnrollmentGuard;
use crate::model::{AttendanceRecord, Identity};
use crate::service::{AttendanceOutcome, RecognitionService};

/// Entry point tying the embedding store to its collaborators.
///
/// It coordinates:
/// - Warming the embedding store from durable storage
/// - Turning uploaded images into face embeddings
/// - Duplicate-safe enrollment
/// - Recognition and attendance logging
pub struct AttendanceEngine {
    /// Configuration.
    config: RollcallConfig,

    /// In-memory embedding cache.
    store: Arc<EmbeddingStore>,

    /// Face embedder.
    embedder: Arc<dyn FaceEmbedder>,

    /// Durable storage.
    durable: Arc<dyn DurableStore>,

    /// Enrollment guard.
    guard: EnrollmentGuard,

    /// Recognition service.
    recognition: RecognitionService,
}

impl AttendanceEngine {
    /// Create a new engine builder.
    pub fn builder() -> AttendanceEngineBuilder {
        AttendanceEngineBuilder::new()
    }

    /// Build an engine and warm its store from `durable`.
    ///
    /// A durable store that cannot be read is logged and the engine starts
    /// with an empty store.
    pub async fn new(
        config: RollcallConfig,
        embedder: Arc<dyn FaceEmbedder>,
        durable: Arc<dyn DurableStore>,
    ) -> Result<Self> {
        config.validate()?;
        if embedder.dimension() != config.dimension {
            return Err(EngineError::Config(format!(
                "embedder {} produces {}-dimensional embeddings, store expects {}",
                embedder.name(),
                embedder.dimension(),
                config.dimension
            )));
        }

        info!(
            "Initializing attendance engine (embedder: {}, durable store: {})",
            embedder.name(),
            durable.name()
        );

        let store = Arc::new(EmbeddingStore::new(config.dimension));
        let matcher = Matcher::new(config.recognition_threshold)?;
        let guard = EnrollmentGuard::new(
            Arc::clone(&store),
            Arc::clone(&durable),
            matcher,
            config.duplicate_tolerance,
        )?;
        let recognition = RecognitionService::new(Arc::clone(&store), matcher);

        let engine = Self {
            config,
            store,
            embedder,
            durable,
            guard,
            recognition,
        };
        engine.warm().await;

        info!("Attendance engine initialized");
        Ok(engine)
    }

    async fn warm(&self) {
        let pairs = match self.durable.scan_embeddings().await {
            Ok(pairs) => pairs,
            Err(e) => {
                error!("Could not load enrolled faces, starting with an empty store: {e}");
                return;
            }
        };

        match self.store.load(pairs) {
            Ok(count) => info!("Loaded {count} faces from {}", self.durable.name()),
            Err(e) => error!("Enrolled faces rejected, starting with an empty store: {e}"),
        }
    }

    /// Register `identity` from an uploaded image.
    ///
    /// The embedder call, the duplicate checks and the durable write run
    /// under the configured enrollment timeout. A timed-out enrollment
    /// leaves no trace in the store.
    pub async fn register(
        &self,
        identity: Identity,
        image: &[u8],
    ) -> std::result::Result<RegistrationReceipt, EnrollmentError> {
        let timeout = self.config.enrollment_timeout();
        let result = tokio::time::timeout(timeout, async {
            let scan = self
                .embedder
                .embed_faces(image)
                .await
                .map_err(EnrollmentError::Embedder)?;
            self.guard.try_enroll(&identity, &scan).await
        })
        .await
        .unwrap_or(Err(EnrollmentError::Timeout {
            secs: timeout.as_secs(),
        }));

        if let Err(e) = result {
            log_enrollment_error(&identity, &e);
            return Err(e);
        }

        Ok(RegistrationReceipt {
            message: format!(
                "Student {} ({}) registered successfully.",
                identity.display_name(),
                identity.id
            ),
            identity_id: identity.id,
        })
    }

    /// Recognize the face in an uploaded image and log attendance.
    ///
    /// Every outcome, including collaborator failures, is reported in the
    /// returned [`CaptureResponse`]; the store is never modified.
    pub async fn capture(&self, image: &[u8]) -> CaptureResponse {
        let now = Utc::now();

        let scan = match self.embedder.embed_faces(image).await {
            Ok(scan) => scan,
            Err(e) if e.is_programming_error() => {
                error!("Face embedder returned unusable embeddings: {e}");
                return CaptureResponse::failure("Face could not be processed.", now);
            }
            Err(e) => {
                warn!("Face embedder failed during capture: {e}");
                return CaptureResponse::failure("Face could not be processed.", now);
            }
        };

        let snapshot = self.store.snapshot();
        let outcome = match self.recognition.recognize_in(&snapshot, &scan) {
            Ok(outcome) => outcome,
            Err(e) => {
                error!("Recognition failed on a programming error: {e}");
                return CaptureResponse::failure("Face could not be processed.", now);
            }
        };

        let (identity_id, distance) = match outcome {
            AttendanceOutcome::NoFaceDetected => {
                return CaptureResponse::failure("No face detected.", now);
            }
            AttendanceOutcome::NotRecognized if snapshot.is_empty() => {
                return CaptureResponse::failure("No registered students in database.", now);
            }
            AttendanceOutcome::NotRecognized => {
                return CaptureResponse::failure("Face not recognized.", now);
            }
            AttendanceOutcome::Recognized {
                identity_id,
                distance,
            } => (identity_id, distance),
        };
        debug!("Recognized {identity_id} at distance {distance}");

        let name = match self.durable.display_name(&identity_id).await {
            Ok(name) => name.unwrap_or_else(|| "Unknown".to_string()),
            Err(e) => {
                error!("Could not look up {identity_id}: {e}");
                return CaptureResponse::failure("Database error logging attendance.", now);
            }
        };

        let record = AttendanceRecord::present(identity_id.clone(), now);
        if let Err(e) = self.durable.record_attendance(&record).await {
            error!("Could not record attendance for {identity_id}: {e}");
            return CaptureResponse::failure("Database error logging attendance.", now);
        }

        info!("Attendance recorded for {identity_id}");
        CaptureResponse {
            success: true,
            message: "Attendance recorded.".to_string(),
            identity_id: Some(identity_id),
            display_name: Some(name),
            timestamp: format_timestamp(now),
        }
    }

    /// The embedding store shared by the guard and the recognition service.
    pub fn store(&self) -> &Arc<EmbeddingStore> {
        &self.store
    }

    pub fn config(&self) -> &RollcallConfig {
        &self.config
    }

    /// Get engine statistics.
    pub fn stats(&self) -> EngineStats {
        EngineStats {
            store: self.store.stats(),
            embedder: self.embedder.name().to_string(),
            durable_store: self.durable.name().to_string(),
            recognition_threshold: self.recognition.matcher().recognition_threshold(),
            duplicate_tolerance: self.guard.tolerance(),
        }
    }
}

fn log_enrollment_error(identity: &Identity, e: &EnrollmentError) {
    match e.kind() {
        ErrorKind::InputRejection => debug!("Enrollment of {} rejected: {e}", identity.id),
        ErrorKind::StateConflict => info!("Enrollment of {} refused: {e}", identity.id),
        ErrorKind::CollaboratorFailure => error!("Enrollment of {} failed: {e}", identity.id),
        ErrorKind::ProgrammingError => {
            error!("Enrollment of {} hit a programming error: {e}", identity.id);
        }
    }
}

fn format_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Successful registration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistrationReceipt {
    pub identity_id: String,
    pub message: String,
}

/// Outcome of a capture, shaped for any transport.
///
/// `identity_id` and `display_name` are present only when `success` is true.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptureResponse {
    pub success: bool,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identity_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    pub timestamp: String,
}

impl CaptureResponse {
    fn failure(message: &str, at: DateTime<Utc>) -> Self {
        Self {
            success: false,
            message: message.to_string(),
            identity_id: None,
            display_name: None,
            timestamp: format_timestamp(at),
        }
    }
}

/// Builder for the attendance engine.
pub struct AttendanceEngineBuilder {
    config: RollcallConfig,
    embedder: Option<Arc<dyn FaceEmbedder>>,
    durable: Option<Arc<dyn DurableStore>>,
}

impl AttendanceEngineBuilder {
    /// Create a new builder.
    pub fn new() -> Self {
        Self {
            config: RollcallConfig::default(),
            embedder: None,
            durable: None,
        }
    }

    /// Replace the configuration.
    pub fn with_config(mut self, config: RollcallConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the data directory for the JSON file store.
    pub fn with_data_dir(mut self, dir: impl Into<std::path::PathBuf>) -> Self {
        self.config.data_dir = dir.into();
        self
    }

    /// Use a specific face embedder instead of the configured one.
    pub fn with_embedder(mut self, embedder: Arc<dyn FaceEmbedder>) -> Self {
        self.embedder = Some(embedder);
        self
    }

    /// Use a specific durable store instead of the JSON file store.
    pub fn with_durable_store(mut self, durable: Arc<dyn DurableStore>) -> Self {
        self.durable = Some(durable);
        self
    }

    /// Build the engine.
    pub async fn build(self) -> Result<AttendanceEngine> {
        let embedder = match self.embedder {
            Some(embedder) => embedder,
            None => embedder_from_config(&self.config),
        };
        let durable: Arc<dyn DurableStore> = match self.durable {
            Some(durable) => durable,
            None => Arc::new(JsonFileStore::open(&self.config.data_dir).await?),
        };
        AttendanceEngine::new(self.config, embedder, durable).await
    }
}

impl Default for AttendanceEngineBuilder {
    fn default() -> Self {
        Self::new()
    }
}

fn embedder_from_config(config: &RollcallConfig) -> Arc<dyn FaceEmbedder> {
    match &config.embedder {
        EmbedderConfig::Json => Arc::new(JsonFaceEmbedder::new(config.dimension)),
        EmbedderConfig::Http { url, api_key } => {
            let mut embedder = HttpFaceEmbedder::new(url.clone(), config.dimension);
            if let Some(key) = api_key {
                embedder = embedder.with_api_key(key.clone());
            }
            Arc::new(embedder)
        }
    }
}

/// Statistics about the attendance engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineStats {
    /// Embedding store statistics.
    pub store: StoreStats,

    /// Name of the face embedder.
    pub embedder: String,

    /// Name of the durable store.
    pub durable_store: String,

    /// Recognition threshold in use.
    pub recognition_threshold: f32,

    /// Duplicate tolerance in use.
    pub duplicate_tolerance: f32,
}
