//! AI layer: structured contract metadata extraction with an OpenAI-compatible LLM.

pub mod extractor;
pub mod llm;
pub mod prompt;
pub mod schema;

pub use extractor::{ExtractError, ExtractOptions, ExtractReport, Extractor};
pub use llm::{LlmError, MetadataExtractor};
pub use schema::{MetadataResponse, ResponseError, metadata_schema, parse_response};

#[cfg(feature = "openai")]
pub use llm::OpenAiExtractor;
