pub mod error;
mod lexer;
mod structural;

pub use error::ParseError;

use crate::document::Document;

/// Parser entry point.
pub struct Parser {
    source: String,
    file_id: usize,
}

impl Parser {
    pub fn new(source: String, file_id: usize) -> Self {
        Parser { source, file_id }
    }

    /// Parse rendered markup into a document tree.
    pub fn parse(&self) -> Result<Document, Vec<ParseError>> {
        structural::parse_document(&self.source, self.file_id)
    }
}
