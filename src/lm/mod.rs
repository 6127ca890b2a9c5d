//! Language-model completion server
//!
//! Document store, completion backends and the LSP handler set that ties
//! them together.

pub mod completion;
pub mod corpus;
pub mod server;
pub mod types;

pub use completion::{Completor, DummyCompletor, VocabCompletor, load_completor};
pub use corpus::{Corpus, Document};
pub use server::{CompletionServer, CompletionServerFactory};
