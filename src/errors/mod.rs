pub mod types;

pub use types::{ParseError, SourceError};
