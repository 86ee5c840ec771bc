pub mod catalog;
pub mod config;
pub mod evaluate;
pub mod extract;
pub mod infer;
pub mod judge;
