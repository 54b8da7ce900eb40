//! In-memory relational store with all-or-nothing transactions.
//!
//! All tables live behind a single mutex. [`Store::transaction`] holds the
//! lock for the whole unit of work, so read-then-write checks inside it
//! observe a consistent view. Every write is journaled; a unit of work that
//! fails or panics replays the journal backwards to undo its writes.

use std::collections::{BTreeMap, HashMap};
use std::ops::Deref;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use crate::Credits;
use crate::model::{
    AcquisitionMethod, Card, CardId, CardOwnership, NewCard, NewPack, OwnershipId,
    PackDefinition, PackId, Rarity, UserId, UserPack, UserPackId, Vault, VaultTransaction,
    VaultTransactionType, VaultTxId,
};

#[derive(Debug, Clone, Copy, Default)]
struct Sequences {
    pack: PackId,
    card: CardId,
    user_pack: UserPackId,
    ownership: OwnershipId,
    vault_tx: VaultTxId,
}

fn next_id(seq: &mut u64) -> u64 {
    *seq += 1;
    *seq
}

/// Every persisted table of the pack economy.
#[derive(Debug, Default)]
pub struct Tables {
    packs: BTreeMap<PackId, PackDefinition>,
    cards: BTreeMap<CardId, Card>,
    user_packs: BTreeMap<UserPackId, UserPack>,
    ownerships: BTreeMap<OwnershipId, CardOwnership>,
    vaults: HashMap<UserId, Vault>,
    ledger: Vec<VaultTransaction>,
    /// Highest serial ever issued per card.
    serials: HashMap<CardId, u32>,
    sequences: Sequences,
}

/// Read queries
impl Tables {
    pub fn pack(&self, id: PackId) -> Option<&PackDefinition> {
        self.packs.get(&id)
    }

    pub fn packs(&self) -> impl Iterator<Item = &PackDefinition> + '_ {
        self.packs.values()
    }

    pub fn card(&self, id: CardId) -> Option<&Card> {
        self.cards.get(&id)
    }

    pub fn cards(&self) -> impl Iterator<Item = &Card> + '_ {
        self.cards.values()
    }

    /// Cards of one rarity matching the optional filters, in card id order.
    pub fn card_pool(
        &self,
        rarity: Rarity,
        card_type: Option<&str>,
        season: Option<u32>,
    ) -> Vec<&Card> {
        self.cards
            .values()
            .filter(|c| c.rarity == rarity)
            .filter(|c| card_type.is_none_or(|t| c.card_type.as_deref() == Some(t)))
            .filter(|c| season.is_none_or(|s| c.season == Some(s)))
            .collect()
    }

    pub fn user_pack(&self, id: UserPackId) -> Option<&UserPack> {
        self.user_packs.get(&id)
    }

    pub fn user_packs(&self) -> impl Iterator<Item = &UserPack> + '_ {
        self.user_packs.values()
    }

    /// Number of packs issued for `pack`, optionally restricted to one user.
    pub fn count_user_packs(&self, pack: PackId, user: Option<UserId>) -> u32 {
        let count = self
            .user_packs
            .values()
            .filter(|p| p.pack_id == pack)
            .filter(|p| user.is_none_or(|u| p.user_id == u))
            .count();
        u32::try_from(count).unwrap_or(u32::MAX)
    }

    pub fn ownerships(&self) -> impl Iterator<Item = &CardOwnership> + '_ {
        self.ownerships.values()
    }

    pub fn vault(&self, user: UserId) -> Option<&Vault> {
        self.vaults.get(&user)
    }

    pub fn vaults(&self) -> impl Iterator<Item = (UserId, &Vault)> + '_ {
        self.vaults.iter().map(|(user, vault)| (*user, vault))
    }

    /// Current balance; users without a vault hold zero.
    pub fn balance(&self, user: UserId) -> Credits {
        self.vault(user).map(|v| v.balance).unwrap_or_default()
    }

    /// Ledger rows in append order.
    pub fn ledger(&self) -> &[VaultTransaction] {
        &self.ledger
    }
}

/// Prior state of one row touched by a unit of work.
///
/// `None` means the row did not exist.
#[derive(Debug)]
enum Undo {
    Pack(PackId, Option<PackDefinition>),
    Card(CardId),
    UserPack(UserPackId, Option<UserPack>),
    Ownership(OwnershipId),
    Vault(UserId, Option<Vault>),
    Serial(CardId, Option<u32>),
}

/// Transactional handle passed to a unit of work.
///
/// Dereferences to [`Tables`] for reads. Dropping it without
/// [`commit`](Tx::commit) undoes every write made through it.
pub struct Tx<'a> {
    tables: &'a mut Tables,
    journal: Vec<Undo>,
    ledger_len: usize,
    sequences: Sequences,
    committed: bool,
}

impl Deref for Tx<'_> {
    type Target = Tables;

    fn deref(&self) -> &Self::Target {
        self.tables
    }
}

impl Drop for Tx<'_> {
    fn drop(&mut self) {
        if !self.committed {
            self.rollback();
        }
    }
}

/// Private API
impl<'a> Tx<'a> {
    fn begin(tables: &'a mut Tables) -> Self {
        Self {
            ledger_len: tables.ledger.len(),
            sequences: tables.sequences,
            tables,
            journal: Vec::new(),
            committed: false,
        }
    }

    fn commit(mut self) {
        self.committed = true;
    }

    fn rollback(&mut self) {
        let tables = &mut *self.tables;
        while let Some(undo) = self.journal.pop() {
            match undo {
                Undo::Pack(id, Some(pack)) => {
                    tables.packs.insert(id, pack);
                }
                Undo::Pack(id, None) => {
                    tables.packs.remove(&id);
                }
                Undo::Card(id) => {
                    tables.cards.remove(&id);
                }
                Undo::UserPack(id, Some(user_pack)) => {
                    tables.user_packs.insert(id, user_pack);
                }
                Undo::UserPack(id, None) => {
                    tables.user_packs.remove(&id);
                }
                Undo::Ownership(id) => {
                    tables.ownerships.remove(&id);
                }
                Undo::Vault(user, Some(vault)) => {
                    tables.vaults.insert(user, vault);
                }
                Undo::Vault(user, None) => {
                    tables.vaults.remove(&user);
                }
                Undo::Serial(card, Some(issued)) => {
                    tables.serials.insert(card, issued);
                }
                Undo::Serial(card, None) => {
                    tables.serials.remove(&card);
                }
            }
        }
        tables.ledger.truncate(self.ledger_len);
        tables.sequences = self.sequences;
    }
}

/// Writes
impl Tx<'_> {
    pub fn insert_pack(&mut self, new: NewPack, created_at: DateTime<Utc>) -> PackDefinition {
        let id = next_id(&mut self.tables.sequences.pack);
        let pack = PackDefinition {
            id,
            name: new.name,
            artwork: new.artwork,
            pack_type: new.pack_type,
            card_count: new.card_count,
            odds: new.odds,
            price: new.price,
            season: new.season,
            card_type: new.card_type,
            theme: new.theme,
            is_active: new.is_active,
            expires_at: new.expires_at,
            limited_quantity: new.limited_quantity,
            purchase_limit: new.purchase_limit,
            created_at,
        };
        self.journal.push(Undo::Pack(id, None));
        self.tables.packs.insert(id, pack.clone());
        pack
    }

    pub fn pack_mut(&mut self, id: PackId) -> Option<&mut PackDefinition> {
        let pack = self.tables.packs.get_mut(&id)?;
        self.journal.push(Undo::Pack(id, Some(pack.clone())));
        Some(pack)
    }

    pub fn insert_card(&mut self, new: NewCard) -> Card {
        let id = next_id(&mut self.tables.sequences.card);
        let card = Card {
            id,
            name: new.name,
            rarity: new.rarity,
            card_type: new.card_type,
            season: new.season,
        };
        self.journal.push(Undo::Card(id));
        self.tables.cards.insert(id, card.clone());
        card
    }

    pub fn insert_user_pack(
        &mut self,
        user: UserId,
        pack: PackId,
        method: AcquisitionMethod,
        acquired_at: DateTime<Utc>,
    ) -> UserPack {
        let id = next_id(&mut self.tables.sequences.user_pack);
        let user_pack = UserPack {
            id,
            user_id: user,
            pack_id: pack,
            is_opened: false,
            acquired_method: method,
            acquired_at,
            opened_at: None,
        };
        self.journal.push(Undo::UserPack(id, None));
        self.tables.user_packs.insert(id, user_pack.clone());
        user_pack
    }

    /// Mark a pack opened, only if it is still unopened.
    ///
    /// Returns `false` when the pack is missing or was already opened.
    pub fn mark_opened(&mut self, id: UserPackId, opened_at: DateTime<Utc>) -> bool {
        match self.tables.user_packs.get_mut(&id) {
            Some(pack) if !pack.is_opened => {
                self.journal.push(Undo::UserPack(id, Some(pack.clone())));
                pack.is_opened = true;
                pack.opened_at = Some(opened_at);
                true
            }
            _ => false,
        }
    }

    /// Reserve the next serial number for `card`.
    ///
    /// Serials continue from the highest ever issued for the card, so a
    /// number is never handed out twice.
    pub fn next_serial(&mut self, card: CardId) -> u32 {
        let prior = self.tables.serials.get(&card).copied();
        self.journal.push(Undo::Serial(card, prior));
        let issued = self.tables.serials.entry(card).or_insert(0);
        *issued += 1;
        *issued
    }

    pub fn insert_ownership(
        &mut self,
        user: UserId,
        card: CardId,
        serial_number: u32,
        user_pack: UserPackId,
        acquired_at: DateTime<Utc>,
    ) -> CardOwnership {
        let id = next_id(&mut self.tables.sequences.ownership);
        let ownership = CardOwnership {
            id,
            user_id: user,
            card_id: card,
            owner_id: user,
            serial_number,
            level: 1,
            experience: 0,
            user_pack_id: user_pack,
            acquired_at,
        };
        self.journal.push(Undo::Ownership(id));
        self.tables.ownerships.insert(id, ownership.clone());
        ownership
    }

    /// The user's vault, created empty on first access.
    pub fn vault_mut(&mut self, user: UserId) -> &mut Vault {
        let prior = self.tables.vaults.get(&user).cloned();
        self.journal.push(Undo::Vault(user, prior));
        self.tables.vaults.entry(user).or_default()
    }

    #[allow(clippy::too_many_arguments)]
    pub fn append_ledger(
        &mut self,
        user: UserId,
        amount: Credits,
        balance_after: Credits,
        kind: VaultTransactionType,
        source: impl Into<String>,
        metadata: BTreeMap<String, String>,
        created_at: DateTime<Utc>,
    ) -> VaultTransaction {
        let id = next_id(&mut self.tables.sequences.vault_tx);
        let row = VaultTransaction {
            id,
            user_id: user,
            amount,
            balance_after,
            kind,
            source: source.into(),
            metadata,
            created_at,
        };
        self.tables.ledger.push(row.clone());
        row
    }
}

/// Shared store handle.
#[derive(Debug, Default)]
pub struct Store {
    tables: Mutex<Tables>,
}

impl Store {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `work` as one unit of work.
    ///
    /// Writes become visible when `work` returns `Ok`. On `Err`, or if
    /// `work` panics, every row it touched is restored.
    pub fn transaction<T, E>(&self, work: impl FnOnce(&mut Tx<'_>) -> Result<T, E>) -> Result<T, E> {
        let mut tables = self.tables.lock();
        let mut tx = Tx::begin(&mut tables);

        let result = work(&mut tx);
        if result.is_ok() {
            tx.commit();
        }
        result
    }

    /// Run a unit of work that cannot fail.
    pub fn write<T>(&self, work: impl FnOnce(&mut Tx<'_>) -> T) -> T {
        let mut tables = self.tables.lock();
        let mut tx = Tx::begin(&mut tables);

        let output = work(&mut tx);
        tx.commit();
        output
    }

    /// Run a read-only query.
    pub fn read<T>(&self, query: impl FnOnce(&Tables) -> T) -> T {
        query(&self.tables.lock())
    }
}
