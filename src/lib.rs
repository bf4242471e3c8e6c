pub mod assembler;
pub mod config;
pub mod enumerator;
pub mod environment;
pub mod error;
pub mod hierarchy;
pub mod java;
pub mod parser;
pub mod postprocess;
pub mod schema;
pub mod sketches;
pub mod synthesizer;
pub mod types;

pub use assembler::{Engine, Hole, ImportPlan, SynthesisOutput};
pub use config::{SynthesisConfig, TieBreak};
pub use error::{RequestError, SynthesisError};
pub use hierarchy::{TypeIndex, TypeResolver};
pub use sketches::{sketches_from_json, ApiCall, Candidate, Sketch};
