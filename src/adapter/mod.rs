pub mod dataset;
pub mod notifier;
pub mod storage;
pub mod transform;
