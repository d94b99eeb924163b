//! Incremental decoder for the server's back-to-back JSON documents.
//!
//! The server writes documents without any length prefix or separator, so a
//! single socket read may hold a partial document, exactly one, or several.
//! The decoder buffers bytes and yields one complete document per call.

use crate::{Document, ProtocolError};
use serde_json::Deserializer;

#[derive(Debug, Default)]
pub struct DocumentDecoder {
    buffer: Vec<u8>,
}

impl DocumentDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, bytes: &[u8]) {
        self.buffer.extend_from_slice(bytes);
    }

    /// Bytes received but not yet consumed by a complete document.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Decodes the next complete document.
    ///
    /// Returns `Ok(None)` when the buffer holds only whitespace or an
    /// incomplete document. A malformed document discards the buffer.
    pub fn next_document(&mut self) -> Result<Option<Document>, ProtocolError> {
        let (next, consumed) = {
            let mut stream = Deserializer::from_slice(&self.buffer).into_iter::<Document>();
            let next = stream.next();
            (next, stream.byte_offset())
        };
        match next {
            None => {
                self.buffer.clear();
                Ok(None)
            }
            Some(Ok(doc)) => {
                self.buffer.drain(..consumed);
                Ok(Some(doc))
            }
            Some(Err(e)) if e.is_eof() => Ok(None),
            Some(Err(e)) => {
                self.buffer.clear();
                Err(ProtocolError::BadDocument(e.to_string()))
            }
        }
    }

    /// Drains every complete document currently buffered.
    pub fn drain_documents(&mut self) -> Result<Vec<Document>, ProtocolError> {
        let mut docs = Vec::new();
        while let Some(doc) = self.next_document()? {
            docs.push(doc);
        }
        Ok(docs)
    }
}
