/// All timestamps are UTC.
pub type Timestamp = chrono::DateTime<chrono::Utc>;

/// Chromosome number as it appears in the results table.
pub type Chromosome = u32;
