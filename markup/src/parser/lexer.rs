use std::ops::Range;

use crate::document::{Attribute, is_raw_text_element};
use crate::parser::error::ParseError;

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum TokenKind {
    StartTag {
        name: String,
        attributes: Vec<Attribute>,
        self_closing: bool,
    },
    EndTag {
        name: String,
    },
    Text(String),
    /// Comments, doctype and processing instructions. Not kept in the tree.
    Ignored,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Token {
    pub kind: TokenKind,
    pub span: Range<usize>,
}

pub(crate) struct Lexer<'a> {
    source: &'a str,
    pos: usize,
    file_id: usize,
    /// Set after a `<script>`/`<style>` start tag: content up to the matching
    /// end tag is raw text.
    raw_text_tag: Option<String>,
}

impl<'a> Lexer<'a> {
    pub fn new(source: &'a str, file_id: usize) -> Self {
        Lexer {
            source,
            pos: 0,
            file_id,
            raw_text_tag: None,
        }
    }

    fn bytes(&self) -> &'a [u8] {
        self.source.as_bytes()
    }

    fn rest(&self) -> &'a str {
        &self.source[self.pos..]
    }

    fn peek_at(&self, offset: usize) -> Option<u8> {
        self.bytes().get(self.pos + offset).copied()
    }

    fn skip_whitespace(&mut self) {
        while self.peek_at(0).is_some_and(|b| b.is_ascii_whitespace()) {
            self.pos += 1;
        }
    }

    /// True when the `<` at `at` opens markup rather than being literal text.
    fn opens_markup(&self, at: usize) -> bool {
        match self.bytes().get(at + 1) {
            Some(b) => b.is_ascii_alphabetic() || matches!(b, b'/' | b'!' | b'?'),
            None => false,
        }
    }

    fn unterminated(&mut self, what: &str, start: usize) -> ParseError {
        self.pos = self.source.len();
        ParseError::error(format!("unterminated {}", what), start..self.source.len(), self.file_id)
    }

    fn lex_raw_text(&mut self, tag: &str) -> Option<Token> {
        let start = self.pos;
        let bytes = self.bytes();
        let mut end = self.source.len();
        let mut search = start;
        while let Some(offset) = self.source[search..].find("</") {
            let at = search + offset;
            let name = bytes.get(at + 2..at + 2 + tag.len());
            if name.is_some_and(|name| name.eq_ignore_ascii_case(tag.as_bytes())) {
                end = at;
                break;
            }
            search = at + 2;
        }
        self.pos = end;
        if end == start {
            return None;
        }
        Some(Token {
            kind: TokenKind::Text(self.source[start..end].to_string()),
            span: start..end,
        })
    }

    fn lex_text(&mut self) -> Token {
        let start = self.pos;
        let mut end = self.source.len();
        let mut search = start;
        while let Some(offset) = self.source[search..].find('<') {
            let at = search + offset;
            if at > start && self.opens_markup(at) {
                end = at;
                break;
            }
            search = at + 1;
        }
        self.pos = end;
        let decoded = html_escape::decode_html_entities(&self.source[start..end]).into_owned();
        Token {
            kind: TokenKind::Text(decoded),
            span: start..end,
        }
    }

    fn lex_ignored(&mut self, terminator: &str, what: &str) -> Result<Token, ParseError> {
        let start = self.pos;
        match self.rest().find(terminator) {
            Some(i) => {
                self.pos += i + terminator.len();
                Ok(Token {
                    kind: TokenKind::Ignored,
                    span: start..self.pos,
                })
            }
            None => Err(self.unterminated(what, start)),
        }
    }

    fn lex_name(&mut self) -> String {
        let start = self.pos;
        while self
            .peek_at(0)
            .is_some_and(|b| b.is_ascii_alphanumeric() || matches!(b, b'-' | b'_' | b':' | b'.'))
        {
            self.pos += 1;
        }
        self.source[start..self.pos].to_ascii_lowercase()
    }

    fn lex_end_tag(&mut self) -> Result<Token, ParseError> {
        let start = self.pos;
        self.pos += 2;
        let name = self.lex_name();
        match self.rest().find('>') {
            Some(i) => {
                self.pos += i + 1;
                Ok(Token {
                    kind: TokenKind::EndTag { name },
                    span: start..self.pos,
                })
            }
            None => Err(self.unterminated(&format!("closing tag `</{}`", name), start)),
        }
    }

    fn lex_start_tag(&mut self) -> Result<Token, ParseError> {
        let start = self.pos;
        self.pos += 1;
        let name = self.lex_name();
        let mut attributes: Vec<Attribute> = Vec::new();

        loop {
            self.skip_whitespace();
            match self.peek_at(0) {
                None => return Err(self.unterminated(&format!("tag `<{}`", name), start)),
                Some(b'>') => {
                    self.pos += 1;
                    return Ok(self.finish_start_tag(name, attributes, false, start));
                }
                Some(b'/') if self.peek_at(1) == Some(b'>') => {
                    self.pos += 2;
                    return Ok(self.finish_start_tag(name, attributes, true, start));
                }
                Some(b'/') => {
                    self.pos += 1;
                }
                Some(_) => {
                    let attribute = self.lex_attribute(&name, start)?;
                    // First occurrence wins, as in browsers.
                    if !attributes.iter().any(|a| a.name == attribute.name) {
                        attributes.push(attribute);
                    }
                }
            }
        }
    }

    fn lex_attribute(&mut self, tag: &str, tag_start: usize) -> Result<Attribute, ParseError> {
        let source = self.source;
        let name_start = self.pos;
        while self
            .peek_at(0)
            .is_some_and(|b| !b.is_ascii_whitespace() && !matches!(b, b'=' | b'>' | b'/'))
        {
            self.pos += 1;
        }
        let name = source[name_start..self.pos].to_ascii_lowercase();

        self.skip_whitespace();
        if self.peek_at(0) != Some(b'=') {
            return Ok(Attribute { name, value: None });
        }
        self.pos += 1;
        self.skip_whitespace();

        let raw = match self.peek_at(0) {
            Some(quote @ (b'"' | b'\'')) => {
                self.pos += 1;
                let value_start = self.pos;
                match self.bytes()[value_start..].iter().position(|&b| b == quote) {
                    Some(len) => {
                        self.pos = value_start + len + 1;
                        &source[value_start..value_start + len]
                    }
                    None => {
                        return Err(self
                            .unterminated(&format!("attribute value in `<{}`", tag), tag_start)
                            .with_note(format!("attribute `{}` opens a quote that is never closed", name)));
                    }
                }
            }
            Some(_) => {
                let value_start = self.pos;
                while self
                    .peek_at(0)
                    .is_some_and(|b| !b.is_ascii_whitespace() && b != b'>')
                {
                    self.pos += 1;
                }
                &source[value_start..self.pos]
            }
            None => return Err(self.unterminated(&format!("tag `<{}`", tag), tag_start)),
        };

        Ok(Attribute {
            name,
            value: Some(html_escape::decode_html_entities(raw).into_owned()),
        })
    }

    fn finish_start_tag(
        &mut self,
        name: String,
        attributes: Vec<Attribute>,
        self_closing: bool,
        start: usize,
    ) -> Token {
        if !self_closing && is_raw_text_element(&name) {
            self.raw_text_tag = Some(name.clone());
        }
        Token {
            kind: TokenKind::StartTag {
                name,
                attributes,
                self_closing,
            },
            span: start..self.pos,
        }
    }

    /// Produce the next token, or `None` at end of input.
    pub fn next_token(&mut self) -> Option<Result<Token, ParseError>> {
        if let Some(tag) = self.raw_text_tag.take() {
            if let Some(token) = self.lex_raw_text(&tag) {
                return Some(Ok(token));
            }
        }

        if self.pos >= self.source.len() {
            return None;
        }

        let rest = self.rest();
        let result = if !rest.starts_with('<') || !self.opens_markup(self.pos) {
            Ok(self.lex_text())
        } else if rest.starts_with("<!--") {
            self.lex_ignored("-->", "comment")
        } else if rest.starts_with("<!") || rest.starts_with("<?") {
            self.lex_ignored(">", "declaration")
        } else if rest.starts_with("</") {
            self.lex_end_tag()
        } else {
            self.lex_start_tag()
        };
        Some(result)
    }
}
