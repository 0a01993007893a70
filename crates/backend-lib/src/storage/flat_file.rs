//! Flat-file storage.
//!
//! Layout under the data directory:
//! - `experts/<id>.json`: one document per expert, calendar embedded,
//!   replaced through a fsynced temp file + rename; a document that cannot
//!   be read on open is renamed to `<id>.json.corrupt` and skipped
//! - `reservations.log`: one JSON reservation per line, appended on insert
//!   and on every status change; the last line for an id wins. A torn tail
//!   left by a crash is truncated on open
//!
//! All reads are served from a [`MemoryStorage`] index, which also performs
//! the conditional slot write and the uniqueness check. A failed disk write
//! rolls the index change back before the error is returned.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, LazyLock};

use async_trait::async_trait;
use regex::Regex;
use slotbook_common::{BookingStatus, Expert, Reservation, SlotKey};
use tokio::{fs as tokio_fs, io::AsyncWriteExt, sync::Mutex};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use super::{ExpertPage, ExpertQuery, MemoryStorage, ReconcileReport, SlotLookup, Storage, StorageError};

const EXPERTS_DIR: &str = "experts";
const RESERVATIONS_LOG: &str = "reservations.log";
const QUARANTINE_EXT: &str = "json.corrupt";

static FILE_SAFE_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9-]{1,64}$").expect("valid regex"));

/// Flat-file implementation of the Storage trait
#[derive(Clone)]
pub struct FlatFileStorage {
    root: PathBuf,
    index: MemoryStorage,
    write_lock: Arc<Mutex<()>>,
}

impl FlatFileStorage {
    /// Open (or create) a store, replay it and reconcile slot flags.
    pub async fn open<P: AsRef<Path>>(root: P) -> anyhow::Result<Self> {
        let root = root.as_ref().to_path_buf();
        tokio_fs::create_dir_all(root.join(EXPERTS_DIR)).await?;

        let storage = Self {
            root,
            index: MemoryStorage::new(),
            write_lock: Arc::new(Mutex::new(())),
        };
        storage.load_experts().await?;
        storage.replay_reservations().await?;

        let report = storage.reconcile().await?;
        info!(
            root = %storage.root.display(),
            experts = storage.index.experts().len(),
            reservations = storage.index.reservations().len(),
            repaired = !report.is_clean(),
            "flat-file storage opened"
        );
        Ok(storage)
    }

    /// Re-run reconciliation and persist whatever it repaired
    pub async fn reconcile(&self) -> Result<ReconcileReport, StorageError> {
        let report = self.index.reconcile();
        for expert_id in report.touched_experts() {
            self.persist_expert(&expert_id).await?;
        }
        if !report.is_clean() {
            metrics::counter!(crate::metrics::RECONCILE_REPAIRED)
                .increment((report.released.len() + report.marked.len()) as u64);
        }
        Ok(report)
    }

    fn expert_path(&self, expert_id: &str) -> PathBuf {
        self.root.join(EXPERTS_DIR).join(format!("{expert_id}.json"))
    }

    fn log_path(&self) -> PathBuf {
        self.root.join(RESERVATIONS_LOG)
    }

    async fn load_experts(&self) -> Result<(), StorageError> {
        let mut entries = tokio_fs::read_dir(self.root.join(EXPERTS_DIR)).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            match path.extension().and_then(|ext| ext.to_str()) {
                Some("json") => {},
                // left behind by a write that never reached its rename
                Some("tmp") => {
                    tokio_fs::remove_file(&path).await?;
                    continue;
                },
                _ => continue,
            }
            match self.load_expert(&path).await {
                Ok(()) => {},
                Err(e @ (StorageError::Json(_) | StorageError::InvalidCalendar(_))) => {
                    self.quarantine(&path, &e).await?;
                },
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    async fn load_expert(&self, path: &Path) -> Result<(), StorageError> {
        let content = tokio_fs::read(path).await?;
        let expert: Expert = serde_json::from_slice(&content)?;
        self.index.put_expert(expert)?;
        Ok(())
    }

    /// Move an unparsable expert document aside so the store can still open
    async fn quarantine(&self, path: &Path, cause: &StorageError) -> Result<(), StorageError> {
        let target = path.with_extension(QUARANTINE_EXT);
        warn!(
            path = %path.display(),
            moved_to = %target.display(),
            error = %cause,
            "quarantining unreadable expert document"
        );
        tokio_fs::rename(path, &target).await?;
        metrics::counter!(crate::metrics::EXPERT_QUARANTINED).increment(1);
        Ok(())
    }

    async fn replay_reservations(&self) -> Result<(), StorageError> {
        let path = self.log_path();
        if !tokio_fs::try_exists(&path).await? {
            return Ok(());
        }

        let content = tokio_fs::read_to_string(&path).await?;
        let complete = match content.rfind('\n') {
            Some(pos) => pos + 1,
            None => 0,
        };
        if complete < content.len() {
            // a torn final write; cut it off so the next append starts on a fresh line
            warn!(
                dropped_bytes = content.len() - complete,
                "truncating incomplete reservation log tail"
            );
            let file = tokio_fs::OpenOptions::new().write(true).open(&path).await?;
            file.set_len(complete as u64).await?;
            file.sync_all().await?;
        }

        let mut latest: HashMap<Uuid, Reservation> = HashMap::new();
        for (line_no, line) in content[..complete].lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<Reservation>(line) {
                Ok(reservation) => {
                    latest.insert(reservation.id, reservation);
                },
                Err(e) => warn!(line = line_no + 1, error = %e, "skipping unreadable reservation line"),
            }
        }

        let mut records: Vec<Reservation> = latest.into_values().collect();
        records.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        for reservation in records {
            if let Err(e) = self.index.insert(&reservation) {
                warn!(id = %reservation.id, error = %e, "dropping duplicate reservation from log");
            }
        }
        Ok(())
    }

    /// Write the index's current copy of an expert to disk
    async fn persist_expert(&self, expert_id: &str) -> Result<(), StorageError> {
        let _guard = self.write_lock.lock().await;
        // snapshot under the lock so the last writer always writes the newest state
        let expert = self
            .index
            .get_expert(expert_id)
            .ok_or_else(|| StorageError::ExpertNotFound(expert_id.to_string()))?;

        let path = self.expert_path(expert_id);
        let tmp = path.with_extension("json.tmp");
        let json = serde_json::to_vec_pretty(&expert)?;

        let mut file = tokio_fs::File::create(&tmp).await?;
        file.write_all(&json).await?;
        file.sync_all().await?;
        drop(file);

        tokio_fs::rename(&tmp, &path).await?;
        sync_dir(&self.root.join(EXPERTS_DIR)).await?;
        Ok(())
    }

    /// Append a JSON line to `reservations.log`
    async fn append_reservation(&self, reservation: &Reservation) -> Result<(), StorageError> {
        let mut line = serde_json::to_string(reservation)?;
        line.push('\n');

        let _guard = self.write_lock.lock().await;
        let mut file = tokio_fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.log_path())
            .await?;
        let start = file.metadata().await?.len();
        let written = async {
            file.write_all(line.as_bytes()).await?;
            file.sync_data().await
        }
        .await;
        if let Err(e) = written {
            // drop any partial line so the log still ends on a record boundary
            if let Err(trunc) = file.set_len(start).await {
                warn!(error = %trunc, "failed to trim partial reservation line");
            }
            return Err(e.into());
        }
        Ok(())
    }
}

/// Flush a directory entry change (create, rename) to disk
async fn sync_dir(dir: &Path) -> std::io::Result<()> {
    tokio_fs::File::open(dir).await?.sync_all().await
}

#[async_trait]
impl Storage for FlatFileStorage {
    async fn upsert_expert(&self, expert: Expert) -> Result<(), StorageError> {
        if !FILE_SAFE_ID.is_match(&expert.id) {
            return Err(StorageError::InvalidExpertId(expert.id));
        }
        let id = expert.id.clone();
        let previous = self.index.put_expert(expert)?;
        if let Err(e) = self.persist_expert(&id).await {
            self.index.restore_expert(&id, previous);
            return Err(e);
        }
        Ok(())
    }

    async fn find_expert(&self, expert_id: &str) -> Result<Option<Expert>, StorageError> {
        Ok(self.index.get_expert(expert_id))
    }

    async fn list_experts(&self, query: &ExpertQuery) -> Result<ExpertPage, StorageError> {
        Ok(self.index.list(query))
    }

    async fn expert_count(&self) -> Result<usize, StorageError> {
        Ok(self.index.experts().len())
    }

    async fn find_free_slot(&self, key: &SlotKey) -> Result<SlotLookup, StorageError> {
        Ok(self.index.lookup(key))
    }

    #[instrument(skip_all, fields(slot = %key))]
    async fn mark_taken(&self, key: &SlotKey) -> Result<bool, StorageError> {
        if !self.index.try_mark(key) {
            return Ok(false);
        }
        if let Err(e) = self.persist_expert(&key.expert_id).await {
            self.index.try_release(key);
            return Err(e);
        }
        Ok(true)
    }

    #[instrument(skip_all, fields(slot = %key))]
    async fn release_slot(&self, key: &SlotKey) -> Result<bool, StorageError> {
        if !self.index.try_release(key) {
            return Ok(false);
        }
        if let Err(e) = self.persist_expert(&key.expert_id).await {
            self.index.try_mark(key);
            return Err(e);
        }
        Ok(true)
    }

    #[instrument(skip_all, fields(slot = %reservation.key()))]
    async fn insert_reservation(&self, reservation: &Reservation) -> Result<(), StorageError> {
        self.index.insert(reservation)?;
        if let Err(e) = self.append_reservation(reservation).await {
            self.index.remove(reservation);
            return Err(e);
        }
        Ok(())
    }

    async fn find_reservation(&self, key: &SlotKey) -> Result<Option<Reservation>, StorageError> {
        Ok(self.index.reservation(key))
    }

    async fn reservations_by_email(&self, email: &str) -> Result<Vec<Reservation>, StorageError> {
        Ok(self.index.by_email(email))
    }

    async fn update_status(
        &self,
        id: Uuid,
        status: BookingStatus,
    ) -> Result<Option<Reservation>, StorageError> {
        let Some((previous, updated)) = self.index.set_status(id, status) else {
            return Ok(None);
        };
        if let Err(e) = self.append_reservation(&updated).await {
            self.index.set_status(id, previous);
            return Err(e);
        }
        Ok(Some(updated))
    }
}
