//! Small typed identifiers used throughout the simulation, following the
//! newtype-over-NonZeroU32 convention the rest of the workspace uses for
//! anything that is logically an opaque handle rather than an integer.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::num::NonZeroU32;
use std::str::FromStr;

macro_rules! id_type {
    ($name:ident, $doc:literal) => {
        #[doc = $doc]
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        pub struct $name(pub NonZeroU32);

        impl $name {
            pub fn new(value: NonZeroU32) -> Self {
                Self(value)
            }

            pub fn get(self) -> u32 {
                self.0.get()
            }
        }

        impl From<NonZeroU32> for $name {
            fn from(value: NonZeroU32) -> Self {
                Self(value)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = std::num::ParseIntError;
            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let v: u32 = s.parse()?;
                Ok(Self(NonZeroU32::new(v).unwrap_or(NonZeroU32::new(1).expect("1 is non-zero"))))
            }
        }
    };
}

id_type!(DeviceId, "Identifies a bridge, router or vlan-bridge in the topology cache.");
id_type!(PortId, "Identifies a port on a device.");
id_type!(ChainId, "Identifies a rule chain.");
id_type!(PortSetId, "Identifies a broadcast/flood port set.");
id_type!(PortGroupId, "Identifies a port-group membership tag used by filter conditions.");

/// Datapath-visible port number, distinct from the topology's logical
/// [`PortId`] — the coordinator translates between the two when emitting
/// `Output` actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DatapathPortNo(pub u32);

impl fmt::Display for DatapathPortNo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn id_roundtrip() {
        let id = DeviceId::new(NonZeroU32::new(7).unwrap());
        assert_eq!(id.get(), 7);
        assert_eq!(format!("{id}"), "7");
        let parsed: DeviceId = "7".parse().unwrap();
        assert_eq!(parsed, id);
    }
}
