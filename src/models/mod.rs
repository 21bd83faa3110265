pub mod classification;
pub mod job;
pub mod submission;
