//! The Atom value objects embedded in entries and feeds

mod author;
pub use author::Author;
mod category;
pub use category::{Category, KIND_SCHEME};
mod generator;
pub use generator::Generator;
pub mod link;
pub use link::Link;
