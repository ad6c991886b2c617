//! JSON file durable store.
//!
//! Enrolled faces live in one `rollcall.json` document under the data
//! directory. Each enrollment builds the next document, writes it to a temp
//! file and renames it into place, so a failed write leaves both the file and
//! the in-memory copy untouched. Attendance is appended to
//! `attendance.jsonl`, one record per line.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::Utc;
use rollcall_embeddings::Embedding;
use serde::{Deserialize, Serialize};
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::durable::DurableStore;
use crate::error::{StorageError, StorageResult};
use crate::model::{AttendanceRecord, EnrolledFace, Identity};

const DOCUMENT_FILE: &str = "rollcall.json";
const ATTENDANCE_FILE: &str = "attendance.jsonl";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct Document {
    #[serde(default)]
    faces: Vec<EnrolledFace>,
}

/// Durable store backed by JSON files on disk.
pub struct JsonFileStore {
    /// Root directory for the document and the attendance log.
    root: PathBuf,

    /// Last successfully written document.
    document: Mutex<Document>,

    /// Serializes appends to the attendance log.
    attendance_log: Mutex<()>,
}

impl JsonFileStore {
    /// Open the store at `root`, creating the directory if needed.
    pub async fn open(root: impl AsRef<Path>) -> StorageResult<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root).await.map_err(|e| {
            StorageError::Unavailable(format!("{}: {e}", root.display()))
        })?;

        let path = root.join(DOCUMENT_FILE);
        let document = if fs::try_exists(&path).await? {
            let content = fs::read_to_string(&path).await?;
            let document: Document = serde_json::from_str(&content)?;
            validate(&document)?;
            info!(
                "Loaded {} enrolled faces from {}",
                document.faces.len(),
                path.display()
            );
            document
        } else {
            Document::default()
        };

        Ok(Self {
            root,
            document: Mutex::new(document),
            attendance_log: Mutex::new(()),
        })
    }

    /// Path of the enrollment document.
    pub fn document_path(&self) -> PathBuf {
        self.root.join(DOCUMENT_FILE)
    }

    /// Path of the attendance log.
    pub fn attendance_path(&self) -> PathBuf {
        self.root.join(ATTENDANCE_FILE)
    }

    /// All attendance records, oldest first.
    pub async fn attendance(&self) -> StorageResult<Vec<AttendanceRecord>> {
        let path = self.attendance_path();
        let _log = self.attendance_log.lock().await;
        if !fs::try_exists(&path).await? {
            return Ok(Vec::new());
        }

        let content = fs::read_to_string(&path).await?;
        content
            .lines()
            .enumerate()
            .filter(|(_, line)| !line.trim().is_empty())
            .map(|(number, line)| {
                serde_json::from_str(line).map_err(|e| {
                    StorageError::Corrupt(format!(
                        "{} line {}: {e}",
                        path.display(),
                        number + 1
                    ))
                })
            })
            .collect()
    }

    async fn save(&self, document: &Document) -> StorageResult<()> {
        let path = self.document_path();
        let content = serde_json::to_string_pretty(document)?;

        // Write atomically using a temp file
        let temp_path = path.with_extension("json.tmp");
        fs::write(&temp_path, &content).await.map_err(|e| {
            StorageError::Unavailable(format!("{}: {e}", temp_path.display()))
        })?;
        fs::rename(&temp_path, &path).await.map_err(|e| {
            StorageError::Unavailable(format!("{}: {e}", path.display()))
        })?;

        debug!("Saved rollcall document to {}", path.display());
        Ok(())
    }
}

fn validate(document: &Document) -> StorageResult<()> {
    let mut seen = HashSet::new();
    for face in &document.faces {
        if !seen.insert(face.identity.id.as_str()) {
            return Err(StorageError::Corrupt(format!(
                "identity {} enrolled twice",
                face.identity.id
            )));
        }
    }
    Ok(())
}

#[async_trait]
impl DurableStore for JsonFileStore {
    fn name(&self) -> &str {
        "json-file"
    }

    async fn scan_embeddings(&self) -> StorageResult<Vec<(String, Embedding)>> {
        let document = self.document.lock().await;
        Ok(document
            .faces
            .iter()
            .map(|face| (face.identity.id.clone(), face.embedding.clone()))
            .collect())
    }

    async fn persist_enrollment(
        &self,
        identity: &Identity,
        embedding: &Embedding,
    ) -> StorageResult<()> {
        let mut document = self.document.lock().await;
        if document
            .faces
            .iter()
            .any(|face| face.identity.id == identity.id)
        {
            return Err(StorageError::Conflict(identity.id.clone()));
        }

        let mut next = document.clone();
        next.faces.push(EnrolledFace {
            identity: identity.clone(),
            embedding: embedding.clone(),
            enrolled_at: Utc::now(),
        });
        self.save(&next).await?;
        *document = next;

        info!("Persisted enrollment for {}", identity.id);
        Ok(())
    }

    async fn display_name(&self, identity_id: &str) -> StorageResult<Option<String>> {
        let document = self.document.lock().await;
        Ok(document
            .faces
            .iter()
            .find(|face| face.identity.id == identity_id)
            .map(|face| face.identity.display_name()))
    }

    async fn record_attendance(&self, record: &AttendanceRecord) -> StorageResult<()> {
        let mut line = serde_json::to_string(record)?;
        line.push('\n');

        let path = self.attendance_path();
        let _log = self.attendance_log.lock().await;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .map_err(|e| StorageError::Unavailable(format!("{}: {e}", path.display())))?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;

        debug!("Recorded attendance for {}", record.identity_id);
        Ok(())
    }
}
