pub mod entry_store;
pub mod vector_store;

pub use entry_store::{Deserialized, EntryStore};
pub use vector_store::{truncate_to_dimension, VectorStore};
