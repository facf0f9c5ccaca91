pub mod document;

pub use document::{Document, ID_FIELD};
