//! Recursive-descent parser for the generic signature grammar (JVMS 4.7.9.1).
//!
//! Only referenced class types are collected, as internal names
//! (`java/util/List`); type variables and primitives name no class. Inner
//! class suffixes resolve to the outer class they are qualified by. Names are
//! reported in order of appearance, duplicates included.

use crate::error::{AnalysisError, Result};

/// Classes referenced by a class `Signature` attribute.
pub fn class_signature_types(signature: &str) -> Result<Vec<String>> {
    let mut parser = SignatureParser::new(signature);
    parser.class_signature()?;
    parser.finish()
}

/// Classes referenced by a method `Signature` attribute.
pub fn method_signature_types(signature: &str) -> Result<Vec<String>> {
    let mut parser = SignatureParser::new(signature);
    parser.method_signature()?;
    parser.finish()
}

/// Classes referenced by a field `Signature` attribute.
pub fn field_signature_types(signature: &str) -> Result<Vec<String>> {
    let mut parser = SignatureParser::new(signature);
    parser.reference_type_signature()?;
    parser.finish()
}

struct SignatureParser<'a> {
    signature: &'a str,
    bytes: &'a [u8],
    pos: usize,
    classes: Vec<String>,
}

impl<'a> SignatureParser<'a> {
    fn new(signature: &'a str) -> Self {
        Self {
            signature,
            bytes: signature.as_bytes(),
            pos: 0,
            classes: Vec::new(),
        }
    }

    fn finish(self) -> Result<Vec<String>> {
        if self.pos != self.bytes.len() {
            return Err(self.error("trailing characters"));
        }
        Ok(self.classes)
    }

    fn error(&self, reason: impl Into<String>) -> AnalysisError {
        AnalysisError::InvalidSignature {
            signature: self.signature.to_string(),
            position: self.pos,
            reason: reason.into(),
        }
    }

    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    fn expect(&mut self, expected: u8) -> Result<()> {
        match self.peek() {
            Some(byte) if byte == expected => {
                self.pos += 1;
                Ok(())
            }
            Some(byte) => Err(self.error(format!(
                "expected '{}', found '{}'",
                expected as char, byte as char
            ))),
            None => Err(self.error(format!("expected '{}', found end", expected as char))),
        }
    }

    fn class_signature(&mut self) -> Result<()> {
        if self.peek() == Some(b'<') {
            self.type_parameters()?;
        }
        self.class_type_signature()?;
        while self.peek().is_some() {
            self.class_type_signature()?;
        }
        Ok(())
    }

    fn method_signature(&mut self) -> Result<()> {
        if self.peek() == Some(b'<') {
            self.type_parameters()?;
        }
        self.expect(b'(')?;
        while self.peek() != Some(b')') {
            self.java_type_signature()?;
        }
        self.expect(b')')?;
        if self.peek() == Some(b'V') {
            self.pos += 1;
        } else {
            self.java_type_signature()?;
        }
        while self.peek() == Some(b'^') {
            self.pos += 1;
            if self.peek() == Some(b'T') {
                self.type_variable_signature()?;
            } else {
                self.class_type_signature()?;
            }
        }
        Ok(())
    }

    fn type_parameters(&mut self) -> Result<()> {
        self.expect(b'<')?;
        loop {
            self.type_parameter()?;
            if self.peek() == Some(b'>') {
                break;
            }
        }
        self.expect(b'>')
    }

    fn type_parameter(&mut self) -> Result<()> {
        self.identifier()?;
        // Class bound may be empty when only interface bounds follow.
        self.expect(b':')?;
        if matches!(self.peek(), Some(b'L' | b'T' | b'[')) {
            self.reference_type_signature()?;
        }
        while self.peek() == Some(b':') {
            self.pos += 1;
            self.reference_type_signature()?;
        }
        Ok(())
    }

    fn java_type_signature(&mut self) -> Result<()> {
        match self.peek() {
            Some(b'B' | b'C' | b'D' | b'F' | b'I' | b'J' | b'S' | b'Z') => {
                self.pos += 1;
                Ok(())
            }
            _ => self.reference_type_signature(),
        }
    }

    fn reference_type_signature(&mut self) -> Result<()> {
        match self.peek() {
            Some(b'L') => self.class_type_signature(),
            Some(b'T') => self.type_variable_signature(),
            Some(b'[') => {
                self.pos += 1;
                self.java_type_signature()
            }
            Some(byte) => Err(self.error(format!(
                "expected reference type, found '{}'",
                byte as char
            ))),
            None => Err(self.error("expected reference type, found end")),
        }
    }

    fn type_variable_signature(&mut self) -> Result<()> {
        self.expect(b'T')?;
        self.identifier()?;
        self.expect(b';')
    }

    fn class_type_signature(&mut self) -> Result<()> {
        self.expect(b'L')?;
        let start = self.pos;
        loop {
            match self.peek() {
                Some(b'<' | b'.' | b';') => break,
                Some(b'[' | b':' | b'>') | None => {
                    return Err(self.error("unterminated class type"));
                }
                Some(_) => self.pos += 1,
            }
        }
        if self.pos == start {
            return Err(self.error("empty class name"));
        }
        self.classes.push(self.signature[start..self.pos].to_string());
        if self.peek() == Some(b'<') {
            self.type_arguments()?;
        }
        while self.peek() == Some(b'.') {
            self.pos += 1;
            self.identifier()?;
            if self.peek() == Some(b'<') {
                self.type_arguments()?;
            }
        }
        self.expect(b';')
    }

    fn type_arguments(&mut self) -> Result<()> {
        self.expect(b'<')?;
        loop {
            self.type_argument()?;
            if self.peek() == Some(b'>') {
                break;
            }
        }
        self.expect(b'>')
    }

    fn type_argument(&mut self) -> Result<()> {
        match self.peek() {
            Some(b'*') => {
                self.pos += 1;
                Ok(())
            }
            Some(b'+' | b'-') => {
                self.pos += 1;
                self.reference_type_signature()
            }
            _ => self.reference_type_signature(),
        }
    }

    fn identifier(&mut self) -> Result<()> {
        let start = self.pos;
        while let Some(byte) = self.peek() {
            if matches!(byte, b'.' | b';' | b'[' | b'/' | b'<' | b'>' | b':') {
                break;
            }
            self.pos += 1;
        }
        if self.pos == start {
            return Err(self.error("expected identifier"));
        }
        Ok(())
    }
}
