//! Error types for pack economy operations.

use thiserror::Error;

use crate::Credits;
use crate::model::{PackId, Rarity, UserId, UserPackId};

/// Top-level error returned by [`Market::apply`](super::Market::apply).
#[derive(Debug, Error)]
pub enum MarketError {
    #[error("catalog update failed: {0}")]
    Catalog(#[from] CatalogError),

    #[error("purchase failed: {0}")]
    Purchase(#[from] PurchaseError),

    #[error("opening failed: {0}")]
    Open(#[from] OpenError),

    #[error("vault update failed: {0}")]
    Vault(#[from] VaultError),
}

/// Error while creating or updating a pack definition.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CatalogError {
    #[error("pack odds must total 100% (±0.01), got {total:.4}%")]
    InvalidOdds { total: f64 },
    #[error("pack must contain at least one card")]
    EmptyPack,
    #[error("pack price cannot be negative: {0}")]
    NegativePrice(Credits),
    #[error("pack {0} not found")]
    PackNotFound(PackId),
}

/// Error while buying or being awarded a pack.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PurchaseError {
    #[error("pack {0} not found")]
    PackNotFound(PackId),
    #[error("pack {0} is not available")]
    Inactive(PackId),
    #[error("pack {0} has expired")]
    Expired(PackId),
    #[error("purchase limit of {limit} reached for pack {pack}")]
    LimitReached { pack: PackId, limit: u32 },
    #[error("pack {0} is sold out")]
    SoldOut(PackId),
    #[error("insufficient credits for user {user}: available {available}, price {price}")]
    InsufficientCredits {
        user: UserId,
        available: Credits,
        price: Credits,
    },
}

/// Error while opening an owned pack.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OpenError {
    #[error("user pack {0} not found")]
    UserPackNotFound(UserPackId),
    #[error("pack definition {0} not found")]
    PackNotFound(PackId),
    #[error("user pack {user_pack} does not belong to user {user}")]
    Unauthorized { user_pack: UserPackId, user: UserId },
    #[error("user pack {0} has already been opened")]
    AlreadyOpened(UserPackId),
    #[error("no cards found for rarity {0}")]
    EmptyCardPool(Rarity),
}

/// Error while crediting a vault.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VaultError {
    #[error("grant amount must be positive, got {0}")]
    NonPositiveGrant(Credits),
    #[error("granting {amount} to user {user} would overflow the vault")]
    Overflow { user: UserId, amount: Credits },
}
