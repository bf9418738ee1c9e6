//! Caption acquisition module
//!
//! Parses caption lines and reads them from the shared collaboration file.

pub mod caption_parser;
pub mod collab_file;

pub use caption_parser::{parse_caption_line, ParseError};
pub use collab_file::{clear_collaboration_file, CollabFileTailer};
