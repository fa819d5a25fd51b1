pub mod program;
pub mod source;

pub use program::Program;
pub use source::{GuideSource, SourceMetadata};
