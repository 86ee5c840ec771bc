pub mod catalog;
pub mod dataset;
pub mod prompt;
pub mod backend;
pub mod runner;
pub mod extract;
pub mod extraction;
pub mod judge;
pub mod evaluation;

pub use catalog::*;
pub use dataset::*;
pub use prompt::*;
pub use backend::*;
pub use runner::*;
pub use extract::*;
pub use extraction::*;
pub use judge::*;
pub use evaluation::*;
