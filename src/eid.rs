use rusty_ulid::Ulid;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::{fmt::Display, ops::Deref};

/// Length of a ULID in its canonical Crockford base32 form.
pub const ITEM_ID_LEN: usize = 26;

/// Unique identifier of a stored chunk.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, Hash)]
pub struct ItemId(String);

#[derive(Debug, thiserror::Error)]
#[error("invalid item id {0:?}")]
pub struct InvalidItemId(String);

impl Display for ItemId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ItemId {
    type Err = InvalidItemId;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ulid::from_str(s)
            .map(|ulid| ItemId(ulid.to_string()))
            .map_err(|_| InvalidItemId(s.to_string()))
    }
}

impl Deref for ItemId {
    type Target = String;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl ItemId {
    #[inline]
    pub fn new() -> ItemId {
        ItemId(Ulid::generate().to_string())
    }
}

impl Default for ItemId {
    fn default() -> Self {
        Self::new()
    }
}
