pub mod cli;
pub mod collect;
