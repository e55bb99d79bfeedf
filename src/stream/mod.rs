//! Client/server halves of the generation event stream.
//!
//! The server encodes [`StreamEvent`]s as `data: <json>\n\n` messages; the client
//! reassembles them from arbitrarily split transport chunks and folds them into
//! a [`GenerationState`].

pub mod client;
pub mod event;
pub mod parser;
pub mod reducer;

pub use event::{decode_line, encode, StreamEvent};
pub use parser::{parse_chunk, ChunkParser, LineBuffer};
pub use reducer::{apply, fold, GenerationState, Phase, StreamFailure};
