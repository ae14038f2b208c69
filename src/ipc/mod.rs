pub mod bridge;
pub mod record;

pub use bridge::IpcBridge;
pub use record::{IpcRecord, RecordType, RECORD_LEN};
