pub mod logger;
pub mod sink;
pub mod types;

pub use logger::{ForensicLogger, build_entry, chain_of_custody, data_hash, host_identifier};
pub use sink::{ForensicSink, JsonlFileSink, MemoryForensicSink, NoopForensicSink, load_entries};
pub use types::{AuditSubject, ForensicEntry, ForensicWriteError};
