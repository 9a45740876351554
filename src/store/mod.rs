pub mod checkpoint;
pub mod snapshot;
