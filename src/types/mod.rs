/// Catalog tokens through every stage of a run
pub mod token;
/// Chain-registry asset list documents
pub mod registry;
/// Pricing service market records
pub mod market;

pub use market::MarketRecord;
pub use registry::{Asset, AssetDocument, AssetList, DenomUnit};
pub use token::{
    CandidateToken, CatalogEntry, CatalogRecord, DenomOrigin, EnrichedToken, MarketFields,
};
