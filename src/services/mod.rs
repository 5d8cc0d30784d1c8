pub mod aggregation;

pub use aggregation::summarize;
