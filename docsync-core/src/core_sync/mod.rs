//! Real-time document synchronization over a pub/sub transport
//!
//! Wire codec, message envelope, router, sync handshake, liveness, fan-out
//! and the [`SyncProvider`] facade that ties them to one document.

pub mod codec;
pub mod document;
pub mod errors;
pub mod fanout;
pub mod handshake;
pub mod liveness;
pub mod message;
pub mod peers;
pub mod provider;
pub mod router;
pub mod state;
pub mod transport;

pub use codec::{CodecError, ProtocolMessage, SyncMessage};
pub use document::{Origin, SyncDocument, UpdateEvent, UpdateListener, UpdateSubscription};
pub use errors::{SyncError, SyncResult};
pub use fanout::{FanOut, FanOutReport, DEFAULT_FANOUT_CONCURRENCY};
pub use liveness::PingSweep;
pub use message::{DocumentId, InstanceId, Message, Target};
pub use peers::{PeerRecord, SyncedPeerTable};
pub use provider::SyncProvider;
pub use router::{DispatchOutcome, DropReason};
pub use state::ProviderCore;
pub use transport::{ChannelStats, MemoryHub, MemoryPubSub, PubSub, Subscription, SubscriptionId};
