//! Serialized session payload.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Key under [`SessionData::expiries`] that expires a whole section.
pub(crate) const SECTION_EXPIRY: &str = "";

/// Data stored for one session id.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionData {
    /// Unix timestamp of creation; absent for payloads not created here.
    #[serde(default)]
    pub created_at: Option<i64>,
    /// Section name to key/value map.
    #[serde(default)]
    pub sections: BTreeMap<String, BTreeMap<String, Value>>,
    /// Section name to key expiry timestamps; the empty key covers the
    /// whole section.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub expiries: BTreeMap<String, BTreeMap<String, i64>>,
}

impl SessionData {
    /// Decodes a stored payload.
    ///
    /// # Errors
    ///
    /// Returns the deserializer error for malformed payloads.
    pub fn decode(payload: &[u8]) -> Result<Self, serde_json::Error> {
        if payload.is_empty() {
            return Ok(Self::default());
        }
        serde_json::from_slice(payload)
    }

    /// Encodes the payload for storage.
    ///
    /// # Errors
    ///
    /// Returns the serializer error.
    pub fn encode(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    /// Drops keys and sections whose expiry lies before `now`.
    pub fn expire(&mut self, now: i64) {
        let sections = &mut self.sections;
        self.expiries.retain(|section, keys| {
            let section_expired = keys
                .get(SECTION_EXPIRY)
                .is_some_and(|deadline| now > *deadline);
            if section_expired {
                sections.remove(section);
                return false;
            }
            keys.retain(|key, deadline| {
                let expired = now > *deadline;
                if expired {
                    if let Some(values) = sections.get_mut(section) {
                        values.remove(key);
                    }
                }
                !expired
            });
            true
        });
    }

    /// Removes empty expiry tables before the payload is written.
    pub fn compact(&mut self) {
        self.expiries.retain(|_, keys| !keys.is_empty());
        self.sections.retain(|_, values| !values.is_empty());
    }
}
