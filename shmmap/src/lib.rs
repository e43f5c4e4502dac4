pub mod error;
pub mod iter;
mod raw_table;
mod segment;
pub mod shm_map;
mod slot;
pub mod snapshot;
pub mod types;
pub use error::{Result, ShmMapError};
pub use iter::{Iter, Keys, Values};
pub use shm_map::{F64Map, INITIAL_CAPACITY, ShmHashMap, U64Map};
pub use snapshot::TableMetadata;
pub use types::TableValue;
