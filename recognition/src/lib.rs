//! # Recognition
//!
//! Enrollment and attendance recognition on top of the rollcall embedding
//! store:
//!
//! - **Enrollment Guard**: Duplicate-safe registration of new identities
//! - **Recognition Service**: Best-match lookups for captured faces
//! - **Durable Stores**: Startup seeding and persistence of enrollments and
//!   attendance
//! - **Attendance Engine**: Registration and capture flows for any transport
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                      Attendance Engine                          │
//! ├─────────────────────────────────────────────────────────────────┤
//! │                                                                  │
//! │  image ──► FaceEmbedder ──► FaceScan                             │
//! │                                │                                 │
//! │                ┌───────────────┴───────────────┐                 │
//! │                ▼                               ▼                 │
//! │        ┌──────────────┐               ┌──────────────┐           │
//! │        │  Enrollment  │               │ Recognition  │           │
//! │        │    Guard     │               │   Service    │           │
//! │        └──────────────┘               └──────────────┘           │
//! │           │        │                         │                   │
//! │           ▼        ▼                         ▼                   │
//! │     DurableStore  EmbeddingStore ◄──── snapshot                  │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! use rollcall_recognition::{AttendanceEngine, Identity};
//!
//! let engine = AttendanceEngine::builder()
//!     .with_data_dir("/var/lib/rollcall")
//!     .build()
//!     .await?;
//!
//! engine.register(Identity::new("S001", "Ada", "Lovelace"), &image).await?;
//! let response = engine.capture(&snapshot_image).await;
//! ```

pub mod config;
pub mod durable;
pub mod engine;
pub mod error;
pub mod file_store;
pub mod guard;
pub mod model;
pub mod service;

pub use config::{EmbedderConfig, RollcallConfig};
pub use durable::{DurableStore, MemoryDurableStore};
pub use engine::{
    AttendanceEngine, AttendanceEngineBuilder, CaptureResponse, EngineStats, RegistrationReceipt,
};
pub use error::{
    EngineError, EnrollmentError, ErrorKind, Result, StorageError, StorageResult,
};
pub use file_store::JsonFileStore;
pub use guard::EnrollmentGuard;
pub use model::{AttendanceRecord, AttendanceStatus, EnrolledFace, Identity};
pub use service::{AttendanceOutcome, RecognitionService};

// Re-export from dependencies for convenience
pub use rollcall_embeddings::{Embedding, EmbeddingStore, FaceEmbedder, FaceScan, Matcher};
