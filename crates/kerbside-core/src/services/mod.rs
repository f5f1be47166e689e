//! Services for talking to the hosted records table.

mod records;

pub use records::{BulkDataClient, BulkRecordSource, PostgrestRecordClient, RecordService};
