pub mod config;
pub mod credits;
pub mod csv;
pub mod engine;
pub mod model;
pub mod odds;
pub mod store;

pub use credits::Credits;
pub use engine::Market;
pub use model::{
    Card, CardId, CardOwnership, NewCard, NewPack, Operation, PackDefinition, PackId, Rarity,
    UserId, UserPack, UserPackId,
};
pub use odds::{RarityOdds, select_rarity_by_odds, validate_pack_odds};
