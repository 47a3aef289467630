//! Incremental reader for the `events` array of an events response.
//!
//! Bytes are fed as they arrive from the network. Each complete element of
//! the top-level `"events": [...]` array is decoded as soon as its closing
//! brace is seen, without buffering the rest of the body. Other top-level
//! keys (`meta`, `eventDeletions`, ...) are skipped.

use anyhow::{bail, Context, Result};
use serde::de::DeserializeOwned;

const EVENTS_KEY: &[u8] = b"events";

#[derive(Debug, Default)]
pub struct EventArrayReader {
    /// Current `{`/`[` nesting depth
    depth: usize,
    in_string: bool,
    escaped: bool,
    /// Last string closed directly inside the root object
    last_key: Vec<u8>,
    /// True while inside the `events` array
    in_events: bool,
    /// Bytes of the element being read, empty when between elements
    element: Vec<u8>,
}

impl EventArrayReader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Consumes a chunk and returns the elements completed by it.
    pub fn feed<T: DeserializeOwned>(&mut self, chunk: &[u8]) -> Result<Vec<T>> {
        let mut completed = Vec::new();

        for &byte in chunk {
            let capturing = !self.element.is_empty();
            if capturing {
                self.element.push(byte);
            }

            if self.in_string {
                if self.escaped {
                    self.escaped = false;
                } else if byte == b'\\' {
                    self.escaped = true;
                } else if byte == b'"' {
                    self.in_string = false;
                } else if self.depth == 1 {
                    self.last_key.push(byte);
                }
                continue;
            }

            match byte {
                b'"' => {
                    self.in_string = true;
                    if self.depth == 1 {
                        self.last_key.clear();
                    }
                }
                b'{' | b'[' => {
                    if self.in_events && self.depth == 2 && !capturing {
                        if byte != b'{' {
                            bail!("Unexpected non-object element in events array");
                        }
                        self.element.push(byte);
                    }
                    if byte == b'[' && self.depth == 1 && self.last_key == EVENTS_KEY {
                        self.in_events = true;
                    }
                    self.depth += 1;
                }
                b'}' | b']' => {
                    if self.depth == 0 {
                        bail!("Unbalanced JSON in events response");
                    }
                    self.depth -= 1;
                    if self.in_events && self.depth == 2 && capturing {
                        let element = std::mem::take(&mut self.element);
                        let value = serde_json::from_slice(&element)
                            .context("Failed to parse streamed event")?;
                        completed.push(value);
                    } else if self.in_events && self.depth == 1 {
                        self.in_events = false;
                    }
                }
                _ => {}
            }
        }

        Ok(completed)
    }

    /// Checks that the body ended on a complete JSON document.
    pub fn finish(&self) -> Result<()> {
        if self.depth != 0 || self.in_string || !self.element.is_empty() {
            bail!("Events response ended before the JSON document was complete");
        }
        Ok(())
    }
}
