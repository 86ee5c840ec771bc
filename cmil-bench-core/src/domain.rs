pub mod ids;
pub mod language;
pub mod task;
pub mod spec;
pub mod example;
pub mod records;
pub mod checkpoint;
pub mod config;
pub mod prompt;

pub use ids::*;
pub use language::*;
pub use task::*;
pub use spec::*;
pub use example::*;
pub use records::*;
pub use checkpoint::*;
pub use config::*;
pub use prompt::*;
