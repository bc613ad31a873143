/*
    core_doc - Reference CRDT document

    A small state-vector based document that satisfies the provider's
    SyncDocument seam:
    - state_vector: per-client contiguous progress
    - op_store: append-only, idempotent operation store
    - lww_map: deterministic last-writer-wins resolution
    - replicated_doc: the document itself, with change notifications
*/

pub mod errors;
pub mod lww_map;
pub mod op_store;
pub mod replicated_doc;
pub mod state_vector;

pub use errors::{DocError, DocResult};
pub use lww_map::{LwwMap, Stamp};
pub use op_store::{Op, OpId, OpStore};
pub use replicated_doc::ReplicatedDoc;
pub use state_vector::{ClientId, StateVector};
