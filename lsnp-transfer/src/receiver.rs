//! Receiver-side file-transfer state machine (spec §4.8).
//!
//! States per `FILEID`: `Offered → Accepted → Receiving → Complete`, or
//! `Offered → Rejected`, or any state → `Aborted` on timeout. Chunks are
//! base64-decoded as they arrive (not at the end), so a malformed chunk
//! fails fast and peak memory stays bounded to `total_chunks ×
//! MAX_CHUNK_SIZE` instead of holding the encoded form too.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Instant;

use base64::Engine;
use lsnp_types::{FullId, TRANSFER_STALL_TIMEOUT_SECS};
use thiserror::Error;
use tokio::sync::Mutex;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IncomingState {
    Offered,
    Accepted,
    Receiving,
    Complete,
    Rejected,
    Aborted,
}

pub struct IncomingTransfer {
    pub file_id: Uuid,
    pub sender: FullId,
    pub filename: String,
    pub filesize: u64,
    pub filetype: String,
    pub state: IncomingState,
    total_chunks: Option<u32>,
    chunks: HashMap<u32, Vec<u8>>,
    last_progress: Instant,
}

#[derive(Debug, Clone)]
pub struct TransferSummary {
    pub file_id: Uuid,
    pub sender: FullId,
    pub filename: String,
    pub filesize: u64,
    pub state: IncomingState,
}

#[derive(Debug, Error)]
pub enum ChunkError {
    #[error("chunk data is not valid base64")]
    BadBase64,
    #[error("reassembled file has a gap before chunk index {0}")]
    Gap(u32),
    #[error("reassembled file is {actual} bytes, expected {expected}")]
    SizeMismatch { expected: u64, actual: u64 },
    #[error("failed to write completed file: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, PartialEq, Eq)]
pub enum ChunkOutcome {
    Dropped,
    InProgress,
    Completed(PathBuf),
}

/// Owns every transfer this peer is receiving, keyed by `FILEID`.
pub struct FileTransferEngine {
    base_dir: PathBuf,
    transfers: Mutex<HashMap<Uuid, IncomingTransfer>>,
}

impl FileTransferEngine {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self { base_dir: base_dir.into(), transfers: Mutex::new(HashMap::new()) }
    }

    /// Records an inbound `FILE_OFFER`. Returns `false` (and does nothing)
    /// if this `FILEID` is already known in any state — offers for a
    /// known id are dropped silently (spec §4.8 edge cases).
    pub async fn offer_received(
        &self,
        file_id: Uuid,
        sender: FullId,
        filename: String,
        filesize: u64,
        filetype: String,
    ) -> bool {
        let mut transfers = self.transfers.lock().await;
        if transfers.contains_key(&file_id) {
            return false;
        }
        transfers.insert(
            file_id,
            IncomingTransfer {
                file_id,
                sender,
                filename,
                filesize,
                filetype,
                state: IncomingState::Offered,
                total_chunks: None,
                chunks: HashMap::new(),
                last_progress: Instant::now(),
            },
        );
        true
    }

    /// Local "acceptfile <fileid>" command. Returns `false` if there is no
    /// offer in `Offered` state under this id.
    pub async fn accept(&self, file_id: Uuid) -> bool {
        let mut transfers = self.transfers.lock().await;
        match transfers.get_mut(&file_id) {
            Some(t) if t.state == IncomingState::Offered => {
                t.state = IncomingState::Accepted;
                t.last_progress = Instant::now();
                true
            }
            _ => false,
        }
    }

    /// Local "rejectfile <fileid>" command.
    pub async fn reject(&self, file_id: Uuid) -> bool {
        let mut transfers = self.transfers.lock().await;
        match transfers.get_mut(&file_id) {
            Some(t) if t.state == IncomingState::Offered => {
                t.state = IncomingState::Rejected;
                true
            }
            _ => false,
        }
    }

    /// Applies an inbound `FILE_CHUNK`. Unknown/unaccepted ids and chunks
    /// arriving after `Complete` are dropped per spec.
    pub async fn on_chunk(
        &self,
        file_id: Uuid,
        chunk_index: u32,
        total_chunks: u32,
        data_b64: &str,
    ) -> Result<ChunkOutcome, ChunkError> {
        let mut transfers = self.transfers.lock().await;
        let Some(transfer) = transfers.get_mut(&file_id) else {
            return Ok(ChunkOutcome::Dropped);
        };
        if !matches!(transfer.state, IncomingState::Accepted | IncomingState::Receiving) {
            return Ok(ChunkOutcome::Dropped);
        }

        if transfer.chunks.contains_key(&chunk_index) {
            return Ok(ChunkOutcome::InProgress);
        }

        let bytes = base64::engine::general_purpose::STANDARD
            .decode(data_b64)
            .map_err(|_| ChunkError::BadBase64)?;

        transfer.chunks.insert(chunk_index, bytes);
        transfer.total_chunks = Some(total_chunks);
        transfer.state = IncomingState::Receiving;
        transfer.last_progress = Instant::now();

        if transfer.chunks.len() as u32 != total_chunks {
            return Ok(ChunkOutcome::InProgress);
        }

        let mut assembled = Vec::with_capacity(transfer.filesize as usize);
        for index in 0..total_chunks {
            let Some(piece) = transfer.chunks.get(&index) else {
                return Err(ChunkError::Gap(index));
            };
            assembled.extend_from_slice(piece);
        }

        if assembled.len() as u64 != transfer.filesize {
            transfer.state = IncomingState::Aborted;
            transfer.chunks.clear();
            return Err(ChunkError::SizeMismatch {
                expected: transfer.filesize,
                actual: assembled.len() as u64,
            });
        }

        let dest_dir = self.base_dir.join(transfer.sender.to_string()).join("downloads");
        tokio::fs::create_dir_all(&dest_dir).await?;
        let dest_path = unique_destination(&dest_dir, &transfer.filename).await;
        tokio::fs::write(&dest_path, &assembled).await?;

        transfer.state = IncomingState::Complete;
        transfer.chunks.clear();
        Ok(ChunkOutcome::Completed(dest_path))
    }

    /// Aborts any `Offered`/`Accepted`/`Receiving` transfer that hasn't
    /// progressed within the stall timeout; returns the ids aborted.
    pub async fn abort_stalled(&self) -> Vec<Uuid> {
        let mut transfers = self.transfers.lock().await;
        let deadline = std::time::Duration::from_secs(TRANSFER_STALL_TIMEOUT_SECS);
        let now = Instant::now();
        let mut aborted = Vec::new();
        for (id, transfer) in transfers.iter_mut() {
            let stallable = matches!(
                transfer.state,
                IncomingState::Offered | IncomingState::Accepted | IncomingState::Receiving
            );
            if stallable && now.duration_since(transfer.last_progress) >= deadline {
                transfer.state = IncomingState::Aborted;
                aborted.push(*id);
            }
        }
        aborted
    }

    pub async fn pending_offers(&self) -> Vec<TransferSummary> {
        self.snapshot_where(|t| t.state == IncomingState::Offered).await
    }

    pub async fn all_transfers(&self) -> Vec<TransferSummary> {
        self.snapshot_where(|_| true).await
    }

    async fn snapshot_where(
        &self,
        predicate: impl Fn(&IncomingTransfer) -> bool,
    ) -> Vec<TransferSummary> {
        self.transfers
            .lock()
            .await
            .values()
            .filter(|t| predicate(t))
            .map(|t| TransferSummary {
                file_id: t.file_id,
                sender: t.sender.clone(),
                filename: t.filename.clone(),
                filesize: t.filesize,
                state: t.state,
            })
            .collect()
    }
}

/// Appends ` (n)` before the extension until `name` doesn't collide with
/// an existing file in `dir` (spec §4.8 edge cases).
async fn unique_destination(dir: &Path, filename: &str) -> PathBuf {
    let candidate = dir.join(filename);
    if tokio::fs::metadata(&candidate).await.is_err() {
        return candidate;
    }
    let path = Path::new(filename);
    let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or(filename);
    let ext = path.extension().and_then(|e| e.to_str());
    for n in 1.. {
        let name = match ext {
            Some(ext) => format!("{stem} ({n}).{ext}"),
            None => format!("{stem} ({n})"),
        };
        let candidate = dir.join(&name);
        if tokio::fs::metadata(&candidate).await.is_err() {
            return candidate;
        }
    }
    unreachable!("filename collision loop is unbounded")
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::Engine as _;
    use std::net::Ipv4Addr;

    fn alice() -> FullId {
        FullId::new("alice", Ipv4Addr::new(192, 168, 1, 5))
    }

    fn b64(bytes: &[u8]) -> String {
        base64::engine::general_purpose::STANDARD.encode(bytes)
    }

    #[tokio::test]
    async fn duplicate_offer_for_known_fileid_is_dropped() {
        let dir = tempfile::tempdir().unwrap();
        let engine = FileTransferEngine::new(dir.path());
        let file_id = Uuid::new_v4();
        assert!(
            engine
                .offer_received(file_id, alice(), "a.txt".into(), 3, "text/plain".into())
                .await
        );
        assert!(
            !engine
                .offer_received(file_id, alice(), "a.txt".into(), 3, "text/plain".into())
                .await
        );
    }

    #[tokio::test]
    async fn chunk_before_accept_is_dropped() {
        let dir = tempfile::tempdir().unwrap();
        let engine = FileTransferEngine::new(dir.path());
        let file_id = Uuid::new_v4();
        engine.offer_received(file_id, alice(), "a.txt".into(), 3, "text/plain".into()).await;
        let outcome = engine.on_chunk(file_id, 0, 1, &b64(b"hi!")).await.unwrap();
        assert_eq!(outcome, ChunkOutcome::Dropped);
    }

    #[tokio::test]
    async fn full_transfer_reassembles_byte_for_byte() {
        let dir = tempfile::tempdir().unwrap();
        let engine = FileTransferEngine::new(dir.path());
        let file_id = Uuid::new_v4();
        let body = b"hello world, this is a test payload".to_vec();

        engine
            .offer_received(file_id, alice(), "greeting.txt".into(), body.len() as u64, "text/plain".into())
            .await;
        engine.accept(file_id).await;

        let chunk0 = &body[0..10];
        let chunk1 = &body[10..];
        let r0 = engine.on_chunk(file_id, 0, 2, &b64(chunk0)).await.unwrap();
        assert_eq!(r0, ChunkOutcome::InProgress);
        let r1 = engine.on_chunk(file_id, 1, 2, &b64(chunk1)).await.unwrap();
        let ChunkOutcome::Completed(path) = r1 else { panic!("expected completion") };

        let written = tokio::fs::read(&path).await.unwrap();
        assert_eq!(written, body);
        assert!(path.to_string_lossy().contains("alice@192.168.1.5"));
    }

    #[tokio::test]
    async fn duplicate_chunk_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let engine = FileTransferEngine::new(dir.path());
        let file_id = Uuid::new_v4();
        engine.offer_received(file_id, alice(), "a.txt".into(), 4, "text/plain".into()).await;
        engine.accept(file_id).await;
        engine.on_chunk(file_id, 0, 2, &b64(b"ab")).await.unwrap();
        let outcome = engine.on_chunk(file_id, 0, 2, &b64(b"ab")).await.unwrap();
        assert_eq!(outcome, ChunkOutcome::InProgress);
    }

    #[tokio::test]
    async fn chunk_after_complete_is_dropped() {
        let dir = tempfile::tempdir().unwrap();
        let engine = FileTransferEngine::new(dir.path());
        let file_id = Uuid::new_v4();
        engine.offer_received(file_id, alice(), "a.txt".into(), 2, "text/plain".into()).await;
        engine.accept(file_id).await;
        engine.on_chunk(file_id, 0, 1, &b64(b"ab")).await.unwrap();

        let outcome = engine.on_chunk(file_id, 0, 1, &b64(b"ab")).await.unwrap();
        assert_eq!(outcome, ChunkOutcome::Dropped);
    }

    #[tokio::test]
    async fn filesize_mismatch_aborts_without_writing() {
        let dir = tempfile::tempdir().unwrap();
        let engine = FileTransferEngine::new(dir.path());
        let file_id = Uuid::new_v4();
        // advertised filesize disagrees with what the chunks actually add up to
        engine.offer_received(file_id, alice(), "a.txt".into(), 99, "text/plain".into()).await;
        engine.accept(file_id).await;

        let err = engine.on_chunk(file_id, 0, 1, &b64(b"ab")).await.unwrap_err();
        assert!(matches!(err, ChunkError::SizeMismatch { expected: 99, actual: 2 }));

        let dest_dir = dir.path().join(alice().to_string()).join("downloads");
        assert!(!dest_dir.join("a.txt").exists());
        let summary = engine.all_transfers().await;
        assert_eq!(summary[0].state, IncomingState::Aborted);
    }

    #[tokio::test]
    async fn filename_collision_gets_suffixed() {
        let dir = tempfile::tempdir().unwrap();
        let sender_dir = dir.path().join(alice().to_string()).join("downloads");
        tokio::fs::create_dir_all(&sender_dir).await.unwrap();
        tokio::fs::write(sender_dir.join("a.txt"), b"existing").await.unwrap();

        let engine = FileTransferEngine::new(dir.path());
        let file_id = Uuid::new_v4();
        engine.offer_received(file_id, alice(), "a.txt".into(), 2, "text/plain".into()).await;
        engine.accept(file_id).await;
        let outcome = engine.on_chunk(file_id, 0, 1, &b64(b"ab")).await.unwrap();
        let ChunkOutcome::Completed(path) = outcome else { panic!("expected completion") };
        assert_eq!(path.file_name().unwrap().to_str().unwrap(), "a (1).txt");
    }
}
