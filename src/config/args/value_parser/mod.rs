pub mod filter_pattern;
pub mod human_bytes;
pub mod storage_url;
