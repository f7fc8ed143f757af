// mod.rs - Core pipeline module

pub mod backend;
pub mod consensus;
pub mod external;
pub mod mask;
pub mod options;
pub mod tools;
pub mod vcf;

// Re-export main types for convenience
pub use backend::{Alignment, ReadPair, VariantBackend, VariantCalls};
pub use consensus::ConsensusRequest;
pub use external::ExternalBackend;
pub use options::{Caller, CallingOptions, Filters, Mapper, MappingOptions, Platform};
pub use tools::{ToolPaths, ToolRunner};
