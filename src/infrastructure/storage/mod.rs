//! Corpus storage backends

mod fs_corpus;
mod memory_corpus;

pub use fs_corpus::{DocumentMeta, FsCorpus, UNCLASSIFIED_DIR};
pub use memory_corpus::MemoryCorpus;
