pub mod config;
pub mod network;
pub mod pool;
pub mod storage;
