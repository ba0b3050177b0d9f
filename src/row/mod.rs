//! Rows, pending entries, pending changes, and the wire codec.

pub mod codec;
pub mod entry;
pub mod pending;
pub mod row;

pub use codec::{CodecError, JsonRowCodec, RowCodec};
pub use entry::{EntityEntry, EntryState};
pub use pending::PendingChange;
pub use row::Row;
