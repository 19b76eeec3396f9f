//! Per-transfer state: body buffer and lifecycle record

mod buffer;
mod record;

pub use buffer::{BodyLimitExceeded, TransferBuffer};
pub use record::TransferRecord;
