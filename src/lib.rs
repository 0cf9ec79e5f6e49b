// Library exports for the Convoy service launcher

pub mod cli;
pub mod config;
pub mod error;
pub mod probe;
pub mod process;
pub mod supervisor;
