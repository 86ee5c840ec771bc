pub mod calculators;
pub mod tokenize;
pub mod aggregators;
pub mod scoring;
pub mod ranking;

pub use calculators::*;
pub use aggregators::*;
pub use scoring::*;
pub use ranking::*;
