//! # Parley Documents
//!
//! Turns uploaded `.pdf` and `.txt` files into normalized single-line text,
//! and cuts that text into history-entry-sized chunks.

pub mod chunk;
pub mod normalize;

pub use chunk::chunk;
pub use normalize::{DocumentKind, normalize, normalize_file, normalize_text};
