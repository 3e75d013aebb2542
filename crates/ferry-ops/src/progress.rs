//! Progress snapshots of running transfers.

use serde::Serialize;

use crate::pool::RequestId;
use crate::slot::SlotId;

/// One running request, as listed by [`crate::TransferPool::active_transfers`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransferStatus {
    /// The slot executing the request.
    pub slot: SlotId,
    pub id: RequestId,
    pub description: String,
    /// Number of items attempted so far.
    pub items_done: usize,
    pub items_total: usize,
}

impl TransferStatus {
    /// Get the progress as a percentage (0.0 to 100.0).
    pub fn percentage(&self) -> f64 {
        if self.items_total > 0 {
            (self.items_done as f64 / self.items_total as f64) * 100.0
        } else {
            0.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_percentage() {
        let mut status = TransferStatus {
            slot: SlotId(0),
            id: RequestId(1),
            description: "Copying 4 items to /tmp".into(),
            items_done: 1,
            items_total: 4,
        };
        assert_eq!(status.percentage(), 25.0);

        status.items_total = 0;
        assert_eq!(status.percentage(), 0.0);
    }
}
