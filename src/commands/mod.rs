// mod.rs - Subcommand orchestration

pub mod insert;
pub mod link;
pub mod matrix;

pub use insert::SampleFiles;
