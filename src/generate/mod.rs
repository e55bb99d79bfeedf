//! Newsletter generation: producer abstraction + prompt assembly.

pub mod partial_json;
pub mod producer;
pub mod prompt;

pub use producer::{
    build_producer, DisabledProducer, DynProducer, GenerationInput, MockProducer, NewsletterProducer,
    OpenAiProducer, SnapshotStream,
};
