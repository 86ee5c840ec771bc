pub mod accuracy;
pub mod bleu;
pub mod chrf;
pub mod rouge;

pub use accuracy::*;
pub use bleu::*;
pub use chrf::*;
pub use rouge::*;
