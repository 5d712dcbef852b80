//! Instance identifiers.
//!
//! Every poller and processor owns an [`InstanceId`] that scopes the leases
//! it takes in the store. IDs are ULIDs, so they sort by creation time and can
//! be generated on any node without coordination.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use ulid::Ulid;

use crate::error::{Code, Error};

const PREFIX: &str = "instance-";

#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct InstanceId(Ulid);

impl InstanceId {
    pub fn from_ulid(ulid: Ulid) -> Self {
        Self(ulid)
    }

    pub fn as_ulid(&self) -> Ulid {
        self.0
    }
}

impl From<Ulid> for InstanceId {
    fn from(ulid: Ulid) -> Self {
        Self::from_ulid(ulid)
    }
}

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{PREFIX}{}", self.0)
    }
}

impl FromStr for InstanceId {
    type Err = Error;

    /// Accepts both the displayed form (`instance-<ulid>`) and a bare ULID,
    /// which is what SQL adapters usually store in `locked_by`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let raw = s.strip_prefix(PREFIX).unwrap_or(s);
        Ulid::from_string(raw).map(Self).map_err(|e| {
            Error::new(Code::Invalid)
                .with_op("domain.InstanceId.from_str")
                .with_message(format!("invalid instance id {s:?}: {e}"))
        })
    }
}
