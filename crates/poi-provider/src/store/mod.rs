pub mod blocked;
pub mod event_log;
pub mod network_status;
pub mod shield_queue;

pub use blocked::{BlockedShieldError, BlockedShieldStore, SignedBlockedShield};
pub use event_log::{EventLogError, EventLogStore, SignedPoiEvent};
pub use network_status::{NetworkStatusError, NetworkStatusStore};
pub use shield_queue::{ShieldQueueError, ShieldQueueItem, ShieldQueueStore, ShieldStatus};
