mod document;
mod keyword_oracle;
mod traits;

pub use document::{build_snapshots, DocumentRecord, DomainSnapshot};
pub use keyword_oracle::KeywordOracle;
pub use traits::{Classification, ClassificationOracle, SnapshotProvider, StorageMutator};
