pub mod classifier;
pub mod detection;
pub mod matcher;
pub mod ocr;
pub mod pipeline;
pub mod registry;
pub mod source;
pub mod storage;
