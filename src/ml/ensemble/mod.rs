pub mod aggregator;

pub use aggregator::{Ensembler, Score};
