pub mod ledger;
pub mod record;

pub use ledger::{FailureLedger, FailureStatistics};
pub use record::{FailureRecord, FailureType};

use std::time::{SystemTime, UNIX_EPOCH};

/// Current wall-clock time as fractional seconds since the Unix epoch.
/// The ledger stores this representation on disk.
pub(crate) fn epoch_secs() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or_default()
}
