//! Deterministic in-memory encoder for tests.
//!
//! "Messages" are `BUFR` + one `key=value` line per present element + `7777`.

use std::cell::RefCell;

use super::{BufrEncoder, MessageIdentity};
use crate::error::{EncodeError, EncodeResult};
use crate::models::{ElementValue, MappedRecord};

#[derive(Debug, Default)]
pub struct MemoryEncoder {
    /// Keys the encoder refuses, like an unknown ecCodes key.
    pub rejected_keys: Vec<String>,
    /// Every record passed to `encode`.
    pub seen: RefCell<Vec<MappedRecord>>,
}

impl MemoryEncoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rejecting(key: &str) -> Self {
        Self {
            rejected_keys: vec![key.to_string()],
            ..Default::default()
        }
    }
}

impl BufrEncoder for MemoryEncoder {
    fn encode(&self, record: &MappedRecord) -> EncodeResult<Vec<u8>> {
        self.seen.borrow_mut().push(record.clone());

        let mut body = String::from("BUFR\n");
        for element in record.elements() {
            if self.rejected_keys.contains(&element.key) {
                return Err(EncodeError::Rejected {
                    program: "memory".to_string(),
                    status: "exit status: 1".to_string(),
                    stderr: format!("Key/value not found: {}", element.key),
                });
            }
            if let ElementValue::Present(value) = &element.value {
                body.push_str(&format!("{}={}\n", element.key, value));
            }
        }
        body.push_str("7777");
        Ok(body.into_bytes())
    }

    fn identify(&self, message: &[u8]) -> EncodeResult<MessageIdentity> {
        let text = std::str::from_utf8(message).map_err(|e| EncodeError::Identity(e.to_string()))?;
        Ok(MessageIdentity::from_pairs(
            text.lines().filter_map(|line| line.split_once('=')),
        ))
    }
}
