use std::ops::Range;

use crate::document::{Document, Element, NodeId, NodeKind, is_void_element};
use crate::parser::error::ParseError;
use crate::parser::lexer::{Lexer, TokenKind};

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Parse markup source text into a document tree.
pub fn parse_document(source: &str, file_id: usize) -> Result<Document, Vec<ParseError>> {
    let mut state = ParseState::new(file_id);
    let mut lexer = Lexer::new(source, file_id);

    while let Some(token) = lexer.next_token() {
        match token {
            Ok(token) => state.process(token.kind, token.span),
            Err(error) => state.errors.push(error),
        }
    }

    state.finalize(source.len())
}

// ---------------------------------------------------------------------------
// Parse state
// ---------------------------------------------------------------------------

struct OpenElement {
    id: NodeId,
    tag: String,
    /// Span of the start tag, used when reporting the element as unclosed.
    start_tag: Range<usize>,
}

struct ParseState {
    document: Document,
    /// Stack of elements awaiting their closing tag. Innermost last.
    open: Vec<OpenElement>,
    errors: Vec<ParseError>,
    file_id: usize,
}

impl ParseState {
    fn new(file_id: usize) -> Self {
        let mut document = Document::new();
        document.source_id = file_id;
        ParseState {
            document,
            open: Vec::new(),
            errors: Vec::new(),
            file_id,
        }
    }

    fn current_parent(&self) -> NodeId {
        self.open
            .last()
            .map(|e| e.id)
            .unwrap_or_else(|| self.document.root())
    }

    fn process(&mut self, kind: TokenKind, span: Range<usize>) {
        match kind {
            TokenKind::StartTag {
                name,
                attributes,
                self_closing,
            } => {
                let element = Element {
                    tag: name.clone(),
                    attributes,
                    initialized: false,
                };
                let parent = self.current_parent();
                let id = self
                    .document
                    .push_node(parent, NodeKind::Element(element), span.clone());
                if !self_closing && !is_void_element(&name) {
                    self.open.push(OpenElement {
                        id,
                        tag: name,
                        start_tag: span,
                    });
                }
            }

            TokenKind::EndTag { name } => self.close(&name, span),

            TokenKind::Text(text) => {
                let parent = self.current_parent();
                self.document.push_node(parent, NodeKind::Text(text), span);
            }

            TokenKind::Ignored => {}
        }
    }

    fn close(&mut self, name: &str, span: Range<usize>) {
        // `</br>` and friends carry no structure.
        if is_void_element(name) {
            return;
        }

        let Some(depth) = self.open.iter().rposition(|e| e.tag == name) else {
            self.errors.push(ParseError::error(
                format!("unexpected closing tag `</{}>`", name),
                span,
                self.file_id,
            ));
            return;
        };

        // Anything opened after the matching element is implicitly closed here.
        while self.open.len() > depth + 1 {
            if let Some(inner) = self.open.pop() {
                self.document.set_span_end(inner.id, span.start);
                self.errors.push(
                    ParseError::error(
                        format!("`<{}>` is not closed before `</{}>`", inner.tag, name),
                        inner.start_tag,
                        self.file_id,
                    )
                    .with_note(format!("add `</{}>` before the closing tag", inner.tag)),
                );
            }
        }

        if let Some(element) = self.open.pop() {
            self.document.set_span_end(element.id, span.end);
        }
    }

    fn finalize(mut self, source_len: usize) -> Result<Document, Vec<ParseError>> {
        while let Some(element) = self.open.pop() {
            self.document.set_span_end(element.id, source_len);
            self.errors.push(ParseError::error(
                format!("unclosed element `<{}>`", element.tag),
                element.start_tag,
                self.file_id,
            ));
        }

        if self.errors.is_empty() {
            Ok(self.document)
        } else {
            self.errors.sort_by_key(|e| e.span.start);
            Err(self.errors)
        }
    }
}
