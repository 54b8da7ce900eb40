//! Catalog configuration loaded from TOML.
//!
//! ```toml
//! seed = 7
//!
//! [[cards]]
//! name = "Aurelia"
//! rarity = "LEGENDARY"
//!
//! [[packs]]
//! name = "Starter"
//! card_count = 5
//! price = 100
//! odds = { common = 60.0, uncommon = 25.0, rare = 10.0, ultra_rare = 3.0, epic = 1.5, legendary = 0.5 }
//! expires_at = "2030-01-01T00:00:00Z"
//!
//! [[grants]]
//! user = 1
//! amount = 500
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;
use tracing::info;

use crate::engine::{CatalogError, VaultError};
use crate::{Credits, Market, NewCard, NewPack, UserId};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid catalog file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("pack #{index} ('{name}') rejected: {source}")]
    Pack {
        index: usize,
        name: String,
        source: CatalogError,
    },

    #[error("opening grant for user {user} rejected: {source}")]
    Grant { user: UserId, source: VaultError },
}

/// Opening balance for one user.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct GrantConfig {
    pub user: UserId,
    pub amount: Credits,
    #[serde(default = "GrantConfig::default_source")]
    pub source: String,
}

impl GrantConfig {
    fn default_source() -> String {
        "opening_balance".to_string()
    }
}

/// Everything needed to seed a [`Market`].
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CatalogConfig {
    /// RNG seed for reproducible openings. Unset means OS entropy.
    #[serde(default)]
    pub seed: Option<u64>,
    #[serde(default)]
    pub cards: Vec<NewCard>,
    #[serde(default)]
    pub packs: Vec<NewPack>,
    #[serde(default)]
    pub grants: Vec<GrantConfig>,
}

impl CatalogConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&raw)
    }

    pub fn parse(raw: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(raw)?)
    }

    /// Build a market seeded from this catalog.
    pub fn build(&self) -> Result<Market, ConfigError> {
        let market = match self.seed {
            Some(seed) => Market::seeded(seed),
            None => Market::default(),
        };
        self.apply(&market)?;
        Ok(market)
    }

    /// Register cards, packs and opening grants, in file order.
    pub fn apply(&self, market: &Market) -> Result<(), ConfigError> {
        for card in &self.cards {
            market.add_card(card.clone());
        }
        for (index, pack) in self.packs.iter().enumerate() {
            market
                .create_pack(pack.clone())
                .map_err(|source| ConfigError::Pack {
                    index: index + 1,
                    name: pack.name.clone(),
                    source,
                })?;
        }
        for grant in &self.grants {
            market
                .grant_credits(grant.user, grant.amount, &grant.source)
                .map_err(|source| ConfigError::Grant {
                    user: grant.user,
                    source,
                })?;
        }

        info!(
            cards = self.cards.len(),
            packs = self.packs.len(),
            grants = self.grants.len(),
            "catalog loaded"
        );
        Ok(())
    }
}
