//! Icon Cache (A), Metadata Resolver (B), HTTP Origin Server (C), and Host
//! Lease (D).

pub mod icon_cache;
pub mod lease;
pub mod metadata;
pub mod range;
pub mod server;

pub use icon_cache::IconCache;
pub use lease::{Lease, LeaseRegistry, FILE_SERVER_DEFAULT_TIMEOUT};
pub use metadata::{resolve, MetadataRecord};
pub use range::{parse_range, ByteRange, RangeOutcome};
pub use server::OriginServer;
