//! Observer-side synchronization: snapshot bootstrap, guarded event
//! application and resync.

mod replica;
mod session;

pub use replica::LocalCatalog;
pub use session::{SnapshotSource, SyncConfig, SyncSession, SyncStep};
