//! Pack economy engine.
//!
//! The [`Market`] sells packs for vault credits and opens owned packs into
//! serial-numbered cards. Every write runs as a single
//! [`Store::transaction`]: a failed check leaves balances, the ledger, packs
//! and cards exactly as they were. Operations can also be replayed from an
//! async stream.

use std::collections::BTreeMap;
use std::fmt::Display;

use parking_lot::Mutex;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tokio_stream::{Stream, StreamExt};
use tracing::{debug, info};

use crate::Credits;
use crate::model::{
    AcquisitionMethod, Card, CardId, CardOwnership, NewCard, NewPack, Operation, PackDefinition,
    PackId, PackUpdate, UserId, UserPack, UserPackId, Vault, VaultTransaction,
    VaultTransactionType,
};
use crate::odds::{RarityOdds, draw_rarities, validate_pack_odds};
use crate::store::{Store, Tables};

mod clock;
pub use clock::{Clock, FixedClock, SystemClock};

mod error;
pub use error::{CatalogError, MarketError, OpenError, PurchaseError, VaultError};

mod state;
pub use state::{PackStats, VaultSummary};

/// Result of a successfully applied [`Operation`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Granted(VaultTransaction),
    Purchased(UserPack),
    Awarded(UserPack),
    /// Cards pulled, in draw order.
    Opened(Vec<Card>),
}

/// The pack economy service.
///
/// Owns the store, the clock used for expiry and timestamps, and the RNG
/// driving rarity draws and card picks.
pub struct Market {
    store: Store,
    clock: Box<dyn Clock>,
    rng: Mutex<ChaCha8Rng>,
}

/// Public API
impl Market {
    pub fn new(clock: impl Clock + 'static, rng: ChaCha8Rng) -> Self {
        Self {
            store: Store::new(),
            clock: Box::new(clock),
            rng: Mutex::new(rng),
        }
    }

    /// Wall-clock market with reproducible draws.
    pub fn seeded(seed: u64) -> Self {
        Self::new(SystemClock, ChaCha8Rng::seed_from_u64(seed))
    }

    /// Replay a stream of operations. Rejected operations are logged and skipped.
    pub async fn run(&self, mut stream: impl Stream<Item = Operation> + Unpin) {
        while let Some(operation) = stream.next().await {
            // a rejected operation must not stop the replay
            let _ = self.apply(operation);
        }
    }

    /// Apply a single operation.
    pub fn apply(&self, operation: Operation) -> Result<Outcome, MarketError> {
        let outcome = match operation {
            Operation::Grant { user, amount } => {
                Outcome::Granted(self.grant_credits(user, amount, "grant")?)
            }
            Operation::Purchase { user, pack } => Outcome::Purchased(self.purchase_pack(user, pack)?),
            Operation::Award { user, pack } => Outcome::Awarded(self.award_pack(user, pack)?),
            Operation::Open { user, user_pack } => Outcome::Opened(self.open_pack(user, user_pack)?),
        };
        Ok(outcome)
    }

    /// Add a pack definition to the catalog.
    pub fn create_pack(&self, new: NewPack) -> Result<PackDefinition, CatalogError> {
        Self::validate_definition(&new.odds, new.card_count, new.price)?;
        let now = self.clock.now();
        let pack = self.store.write(|tx| tx.insert_pack(new, now));
        info!(pack = pack.id, name = %pack.name, price = %pack.price, "pack created");
        Ok(pack)
    }

    /// Change a pack definition. The result must still be a valid definition.
    pub fn update_pack(
        &self,
        pack_id: PackId,
        update: PackUpdate,
    ) -> Result<PackDefinition, CatalogError> {
        let result: Result<PackDefinition, CatalogError> = self.store.transaction(|tx| {
            let pack = tx
                .pack_mut(pack_id)
                .ok_or(CatalogError::PackNotFound(pack_id))?;

            if let Some(is_active) = update.is_active {
                pack.is_active = is_active;
            }
            if let Some(price) = update.price {
                pack.price = price;
            }
            if let Some(odds) = update.odds {
                pack.odds = odds;
            }
            if let Some(expires_at) = update.expires_at {
                pack.expires_at = expires_at;
            }
            if let Some(limited_quantity) = update.limited_quantity {
                pack.limited_quantity = limited_quantity;
            }
            if let Some(purchase_limit) = update.purchase_limit {
                pack.purchase_limit = purchase_limit;
            }

            Self::validate_definition(&pack.odds, pack.card_count, pack.price)?;
            Ok(pack.clone())
        });
        match &result {
            Ok(pack) => info!(pack = pack_id, active = pack.is_active, price = %pack.price, "pack updated"),
            Err(e) => info!(pack = pack_id, reason = %e, "pack update skipped"),
        }
        result
    }

    /// Register a card in the draw pool.
    pub fn add_card(&self, new: NewCard) -> Card {
        let card = self.store.write(|tx| tx.insert_card(new));
        debug!(card = card.id, rarity = %card.rarity, "card added");
        card
    }

    /// Credit a user's vault and record the grant in the ledger.
    pub fn grant_credits(
        &self,
        user: UserId,
        amount: Credits,
        source: &str,
    ) -> Result<VaultTransaction, VaultError> {
        let now = self.clock.now();
        let result = self.store.transaction(|tx| {
            if !amount.is_positive() {
                return Err(VaultError::NonPositiveGrant(amount));
            }

            let balance_after = tx
                .vault_mut(user)
                .credit(amount)
                .ok_or(VaultError::Overflow { user, amount })?;

            Ok(tx.append_ledger(
                user,
                amount,
                balance_after,
                VaultTransactionType::Grant,
                source,
                BTreeMap::new(),
                now,
            ))
        });
        Self::log_result("grant", user, amount, &result);
        result
    }

    /// Buy a pack with vault credits.
    ///
    /// Checks, in order: the pack exists, is active, has not expired, the
    /// user is under the per-user limit, the pack is not sold out, and the
    /// vault covers the price. Then debits the vault, appends the ledger
    /// row and issues an unopened pack.
    pub fn purchase_pack(&self, user: UserId, pack_id: PackId) -> Result<UserPack, PurchaseError> {
        let now = self.clock.now();
        let result = self.store.transaction(|tx| {
            let pack = tx
                .pack(pack_id)
                .cloned()
                .ok_or(PurchaseError::PackNotFound(pack_id))?;

            if !pack.is_active {
                return Err(PurchaseError::Inactive(pack_id));
            }
            if pack.is_expired(now) {
                return Err(PurchaseError::Expired(pack_id));
            }
            if let Some(limit) = pack.purchase_limit {
                if tx.count_user_packs(pack_id, Some(user)) >= limit {
                    return Err(PurchaseError::LimitReached {
                        pack: pack_id,
                        limit,
                    });
                }
            }
            Self::ensure_in_stock(tx, &pack)?;

            let available = tx.balance(user);
            let balance_after =
                tx.vault_mut(user)
                    .debit(pack.price)
                    .ok_or(PurchaseError::InsufficientCredits {
                        user,
                        available,
                        price: pack.price,
                    })?;

            let metadata = BTreeMap::from([
                ("pack_id".to_string(), pack.id.to_string()),
                ("pack_name".to_string(), pack.name.clone()),
            ]);
            tx.append_ledger(
                user,
                -pack.price,
                balance_after,
                VaultTransactionType::PackPurchase,
                "card_pack",
                metadata,
                now,
            );

            Ok(tx.insert_user_pack(user, pack_id, AcquisitionMethod::Purchase, now))
        });
        Self::log_result("purchase", user, pack_id, &result);
        result
    }

    /// Give a user a pack without charging them.
    ///
    /// Only the pack's existence and its global quantity cap apply.
    pub fn award_pack(&self, user: UserId, pack_id: PackId) -> Result<UserPack, PurchaseError> {
        let now = self.clock.now();
        let result: Result<UserPack, PurchaseError> = self.store.transaction(|tx| {
            let pack = tx
                .pack(pack_id)
                .cloned()
                .ok_or(PurchaseError::PackNotFound(pack_id))?;
            Self::ensure_in_stock(tx, &pack)?;
            Ok(tx.insert_user_pack(user, pack_id, AcquisitionMethod::Reward, now))
        });
        Self::log_result("award", user, pack_id, &result);
        result
    }

    /// Open an owned pack into cards.
    ///
    /// Draws one rarity per card slot, picks a card from the matching pool
    /// and mints it with the card's next serial number. Any empty pool
    /// aborts the whole opening.
    pub fn open_pack(&self, user: UserId, user_pack_id: UserPackId) -> Result<Vec<Card>, OpenError> {
        let now = self.clock.now();
        let result = self.store.transaction(|tx| {
            let user_pack = tx
                .user_pack(user_pack_id)
                .cloned()
                .ok_or(OpenError::UserPackNotFound(user_pack_id))?;
            let pack = tx
                .pack(user_pack.pack_id)
                .cloned()
                .ok_or(OpenError::PackNotFound(user_pack.pack_id))?;

            if user_pack.user_id != user {
                return Err(OpenError::Unauthorized {
                    user_pack: user_pack_id,
                    user,
                });
            }
            if user_pack.is_opened {
                return Err(OpenError::AlreadyOpened(user_pack_id));
            }

            let mut rng = self.rng.lock();
            let rarities = draw_rarities(&pack.odds, pack.card_count, &mut *rng);
            debug!(user_pack = user_pack_id, ?rarities, "rarities drawn");

            let mut pulled = Vec::with_capacity(rarities.len());
            for rarity in rarities {
                let card = {
                    let pool = tx.card_pool(rarity, pack.card_type.as_deref(), pack.season);
                    if pool.is_empty() {
                        return Err(OpenError::EmptyCardPool(rarity));
                    }
                    pool[rng.gen_range(0..pool.len())].clone()
                };

                let serial = tx.next_serial(card.id);
                tx.insert_ownership(user, card.id, serial, user_pack_id, now);
                pulled.push(card);
            }

            if !tx.mark_opened(user_pack_id, now) {
                return Err(OpenError::AlreadyOpened(user_pack_id));
            }
            Ok(pulled)
        });
        Self::log_result("open", user, user_pack_id, &result);
        result
    }

    /// Packs currently for sale, by pack type then price.
    pub fn available_packs(&self) -> Vec<PackDefinition> {
        let now = self.clock.now();
        let mut packs: Vec<PackDefinition> = self.store.read(|t| {
            t.packs()
                .filter(|p| p.is_available(now))
                .cloned()
                .collect()
        });
        packs.sort_by(|a, b| {
            a.pack_type
                .cmp(&b.pack_type)
                .then(a.price.cmp(&b.price))
                .then(a.id.cmp(&b.id))
        });
        packs
    }

    /// A user's packs, newest first, optionally filtered by opened state.
    pub fn user_packs(&self, user: UserId, opened: Option<bool>) -> Vec<UserPack> {
        let mut packs: Vec<UserPack> = self.store.read(|t| {
            t.user_packs()
                .filter(|p| p.user_id == user)
                .filter(|p| opened.is_none_or(|o| p.is_opened == o))
                .cloned()
                .collect()
        });
        packs.sort_by(|a, b| b.acquired_at.cmp(&a.acquired_at).then(b.id.cmp(&a.id)));
        packs
    }

    pub fn pack(&self, pack_id: PackId) -> Option<PackDefinition> {
        self.store.read(|t| t.pack(pack_id).cloned())
    }

    pub fn card(&self, card_id: CardId) -> Option<Card> {
        self.store.read(|t| t.card(card_id).cloned())
    }

    pub fn balance(&self, user: UserId) -> Credits {
        self.store.read(|t| t.balance(user))
    }

    pub fn vault(&self, user: UserId) -> Option<Vault> {
        self.store.read(|t| t.vault(user).cloned())
    }

    /// Ledger rows for one user, oldest first.
    pub fn vault_history(&self, user: UserId) -> Vec<VaultTransaction> {
        self.store.read(|t| {
            t.ledger()
                .iter()
                .filter(|row| row.user_id == user)
                .cloned()
                .collect()
        })
    }

    /// Cards minted to one user, in mint order.
    pub fn collection(&self, user: UserId) -> Vec<CardOwnership> {
        self.store.read(|t| {
            t.ownerships()
                .filter(|o| o.owner_id == user)
                .cloned()
                .collect()
        })
    }

    pub fn pack_stats(&self, pack_id: PackId) -> Option<PackStats> {
        self.store.read(|t| {
            let pack = t.pack(pack_id)?;
            let issued = t.count_user_packs(pack_id, None);
            let opened = t
                .user_packs()
                .filter(|p| p.pack_id == pack_id && p.is_opened)
                .count();
            Some(PackStats {
                pack: pack_id,
                issued,
                opened: u32::try_from(opened).unwrap_or(u32::MAX),
                remaining: pack.limited_quantity.map(|q| q.saturating_sub(issued)),
            })
        })
    }

    /// Holdings of every user known to the market, ordered by user id.
    pub fn vault_summaries(&self) -> Vec<VaultSummary> {
        self.store.read(|t| {
            let mut summaries = BTreeMap::new();
            for (user, vault) in t.vaults() {
                Self::summary(&mut summaries, user).balance = vault.balance;
            }
            for pack in t.user_packs() {
                let summary = Self::summary(&mut summaries, pack.user_id);
                if !pack.is_opened {
                    summary.unopened += 1;
                }
            }
            for ownership in t.ownerships() {
                Self::summary(&mut summaries, ownership.owner_id).cards += 1;
            }
            summaries.into_values().collect()
        })
    }
}

/// Private API
impl Market {
    /// Small helper to log operation results
    fn log_result<T, E: Display>(
        operation: &str,
        user: UserId,
        subject: impl Display,
        result: &Result<T, E>,
    ) {
        match result {
            Ok(_) => info!(user, subject = %subject, "{operation} applied"),
            Err(e) => info!(user, subject = %subject, reason = %e, "{operation} skipped"),
        }
    }

    fn validate_definition(
        odds: &RarityOdds,
        card_count: u32,
        price: Credits,
    ) -> Result<(), CatalogError> {
        if !validate_pack_odds(odds) {
            return Err(CatalogError::InvalidOdds {
                total: odds.total(),
            });
        }
        if card_count == 0 {
            return Err(CatalogError::EmptyPack);
        }
        if price.is_negative() {
            return Err(CatalogError::NegativePrice(price));
        }
        Ok(())
    }

    /// Fail with `SoldOut` once `limited_quantity` packs have been issued.
    fn ensure_in_stock(tables: &Tables, pack: &PackDefinition) -> Result<(), PurchaseError> {
        match pack.limited_quantity {
            Some(quantity) if tables.count_user_packs(pack.id, None) >= quantity => {
                Err(PurchaseError::SoldOut(pack.id))
            }
            _ => Ok(()),
        }
    }

    fn summary(
        summaries: &mut BTreeMap<UserId, VaultSummary>,
        user: UserId,
    ) -> &mut VaultSummary {
        summaries.entry(user).or_insert_with(|| VaultSummary {
            user,
            ..VaultSummary::default()
        })
    }
}

impl Default for Market {
    fn default() -> Self {
        Self::new(SystemClock, ChaCha8Rng::from_entropy())
    }
}
