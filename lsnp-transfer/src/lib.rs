//! Chunked file-transfer engine: receiver-side reassembly state machine
//! and sender-side offer/accept bookkeeping.

pub mod filetype;
pub mod receiver;
pub mod sender;

pub use filetype::mime_for_path;
pub use receiver::{ChunkError, ChunkOutcome, FileTransferEngine, IncomingState, TransferSummary};
pub use sender::{OfferOutcome, OutgoingTransferTable, PendingOfferInfo};
