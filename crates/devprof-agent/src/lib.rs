pub mod bench;
pub mod cli;
pub mod config;
pub mod gpu;
pub mod profiler;
pub mod runtime;
pub mod sys;
