//! Transport, peer registry, mDNS discovery, and reliability layer.

pub mod discovery;
pub mod registry;
pub mod reliability;
pub mod transport;

pub use discovery::{DiscoveryError, DiscoveryEvent, DiscoveryService};
pub use registry::{PeerRecord, PeerRegistry, ResolveError};
pub use reliability::{DeliveryOutcome, ReliabilityLayer};
pub use transport::Transport;
