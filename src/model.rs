//! Core domain types for the pack economy.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::Credits;
use crate::odds::RarityOdds;

/// User identifier.
pub type UserId = u64;

/// Pack definition identifier.
pub type PackId = u64;

/// Owned pack instance identifier.
pub type UserPackId = u64;

/// Card catalog identifier.
pub type CardId = u64;

/// Minted card identifier.
pub type OwnershipId = u64;

/// Vault ledger row identifier.
pub type VaultTxId = u64;

/// Rarity tier of a card. Declaration order is the draw order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Rarity {
    Common,
    Uncommon,
    Rare,
    UltraRare,
    Epic,
    Legendary,
}

impl Rarity {
    /// All tiers in cumulative draw order.
    pub const ALL: [Rarity; 6] = [
        Rarity::Common,
        Rarity::Uncommon,
        Rarity::Rare,
        Rarity::UltraRare,
        Rarity::Epic,
        Rarity::Legendary,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Rarity::Common => "COMMON",
            Rarity::Uncommon => "UNCOMMON",
            Rarity::Rare => "RARE",
            Rarity::UltraRare => "ULTRA_RARE",
            Rarity::Epic => "EPIC",
            Rarity::Legendary => "LEGENDARY",
        }
    }
}

impl fmt::Display for Rarity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A purchasable pack as listed in the catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PackDefinition {
    pub id: PackId,
    pub name: String,
    pub artwork: Option<String>,
    pub pack_type: String,
    pub card_count: u32,
    pub odds: RarityOdds,
    pub price: Credits,
    pub season: Option<u32>,
    pub card_type: Option<String>,
    pub theme: Option<String>,
    pub is_active: bool,
    pub expires_at: Option<DateTime<Utc>>,
    /// Cap on packs issued across all users.
    pub limited_quantity: Option<u32>,
    /// Cap on packs issued per user.
    pub purchase_limit: Option<u32>,
    pub created_at: DateTime<Utc>,
}

impl PackDefinition {
    /// Whether the pack has expired at `now`. A pack expiring exactly at
    /// `now` counts as expired.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }

    pub fn is_available(&self, now: DateTime<Utc>) -> bool {
        self.is_active && !self.is_expired(now)
    }
}

/// Admin payload for [`Market::create_pack`](crate::Market::create_pack).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewPack {
    pub name: String,
    #[serde(default)]
    pub artwork: Option<String>,
    #[serde(default = "NewPack::default_pack_type")]
    pub pack_type: String,
    pub card_count: u32,
    pub odds: RarityOdds,
    pub price: Credits,
    #[serde(default)]
    pub season: Option<u32>,
    #[serde(default)]
    pub card_type: Option<String>,
    #[serde(default)]
    pub theme: Option<String>,
    #[serde(default = "NewPack::default_active")]
    pub is_active: bool,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub limited_quantity: Option<u32>,
    #[serde(default)]
    pub purchase_limit: Option<u32>,
}

impl NewPack {
    fn default_pack_type() -> String {
        "BASIC".to_string()
    }

    fn default_active() -> bool {
        true
    }

    /// An active, uncapped pack of the default type.
    pub fn new(name: impl Into<String>, card_count: u32, odds: RarityOdds, price: Credits) -> Self {
        Self {
            name: name.into(),
            artwork: None,
            pack_type: Self::default_pack_type(),
            card_count,
            odds,
            price,
            season: None,
            card_type: None,
            theme: None,
            is_active: true,
            expires_at: None,
            limited_quantity: None,
            purchase_limit: None,
        }
    }
}

/// Partial admin update of a pack definition. `None` leaves a field as is.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PackUpdate {
    pub is_active: Option<bool>,
    pub price: Option<Credits>,
    pub odds: Option<RarityOdds>,
    pub expires_at: Option<Option<DateTime<Utc>>>,
    pub limited_quantity: Option<Option<u32>>,
    pub purchase_limit: Option<Option<u32>>,
}

/// How a user came to own a pack.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AcquisitionMethod {
    Purchase,
    Reward,
}

/// A pack instance owned by a user, opened at most once.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserPack {
    pub id: UserPackId,
    pub user_id: UserId,
    pub pack_id: PackId,
    pub is_opened: bool,
    pub acquired_method: AcquisitionMethod,
    pub acquired_at: DateTime<Utc>,
    pub opened_at: Option<DateTime<Utc>>,
}

/// A catalog card. Read-only to the pack flows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Card {
    pub id: CardId,
    pub name: String,
    pub rarity: Rarity,
    pub card_type: Option<String>,
    pub season: Option<u32>,
}

/// Payload for registering a card in the pool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewCard {
    pub name: String,
    pub rarity: Rarity,
    #[serde(default)]
    pub card_type: Option<String>,
    #[serde(default)]
    pub season: Option<u32>,
}

impl NewCard {
    pub fn new(name: impl Into<String>, rarity: Rarity) -> Self {
        Self {
            name: name.into(),
            rarity,
            card_type: None,
            season: None,
        }
    }
}

/// A minted, serial-numbered copy of a card.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CardOwnership {
    pub id: OwnershipId,
    pub user_id: UserId,
    pub card_id: CardId,
    pub owner_id: UserId,
    pub serial_number: u32,
    pub level: u32,
    pub experience: u32,
    pub user_pack_id: UserPackId,
    pub acquired_at: DateTime<Utc>,
}

/// Per-user credit balance.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vault {
    pub balance: Credits,
    pub lifetime_earned: Credits,
    pub lifetime_spent: Credits,
}

impl Vault {
    /// Credit `amount`; `None` and no change if a total would overflow.
    pub fn credit(&mut self, amount: Credits) -> Option<Credits> {
        let balance = self.balance.checked_add(amount)?;
        let earned = self.lifetime_earned.checked_add(amount)?;
        self.balance = balance;
        self.lifetime_earned = earned;
        Some(balance)
    }

    /// Debit `amount`; `None` and no change if the balance is too low.
    pub fn debit(&mut self, amount: Credits) -> Option<Credits> {
        let balance = self.balance.checked_sub(amount)?;
        self.balance = balance;
        self.lifetime_spent += amount;
        Some(balance)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VaultTransactionType {
    PackPurchase,
    Grant,
}

/// Append-only audit row for every balance change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VaultTransaction {
    pub id: VaultTxId,
    pub user_id: UserId,
    pub amount: Credits,
    pub balance_after: Credits,
    pub kind: VaultTransactionType,
    pub source: String,
    pub metadata: BTreeMap<String, String>,
    pub created_at: DateTime<Utc>,
}

/// Inputs of the engine when replaying a stream of requests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    /// Credit a user's vault.
    Grant { user: UserId, amount: Credits },
    /// Buy a pack with vault credits.
    Purchase { user: UserId, pack: PackId },
    /// Open an owned pack.
    Open { user: UserId, user_pack: UserPackId },
    /// Give a pack to a user free of charge.
    Award { user: UserId, pack: PackId },
}
