pub mod posts;
pub mod storage;
