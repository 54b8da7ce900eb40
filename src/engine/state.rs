use crate::Credits;
use crate::model::{PackId, UserId};

/// A user's holdings: vault balance and pack/card counts.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VaultSummary {
    pub user: UserId,
    pub balance: Credits,
    pub unopened: u32,
    pub cards: u32,
}

/// Issuance counters for one pack definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackStats {
    pub pack: PackId,
    pub issued: u32,
    pub opened: u32,
    /// Packs left under `limited_quantity`, `None` if uncapped.
    pub remaining: Option<u32>,
}

impl PackStats {
    pub fn is_sold_out(&self) -> bool {
        self.remaining == Some(0)
    }
}
