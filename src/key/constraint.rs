//! Usage constraints attached to keys at insertion time

use crate::error::{Error, Result};
use crate::protocol::blob::{BlobBuilder, BlobParser};
use std::fmt;

const CONSTRAIN_LIFETIME: u8 = 1;
const CONSTRAIN_CONFIRM: u8 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Constraint {
    /// Key expires this many seconds after being added
    Lifetime(u32),
    /// Every use must be approved by the user
    Confirm,
}

impl Constraint {
    pub fn code(&self) -> u8 {
        match self {
            Constraint::Lifetime(_) => CONSTRAIN_LIFETIME,
            Constraint::Confirm => CONSTRAIN_CONFIRM,
        }
    }

    pub fn encode(&self, b: &mut BlobBuilder) {
        b.add_u8(self.code());
        if let Constraint::Lifetime(secs) = self {
            b.add_u32(*secs);
        }
    }

    pub fn decode(p: &mut BlobParser<'_>) -> Result<Self> {
        match p.read_u8()? {
            CONSTRAIN_LIFETIME => Ok(Constraint::Lifetime(p.read_u32()?)),
            CONSTRAIN_CONFIRM => Ok(Constraint::Confirm),
            other => Err(Error::ConstraintRejected(format!("Unknown constraint type {}", other))),
        }
    }

    /// Read constraints until the buffer is exhausted
    pub fn decode_all(p: &mut BlobParser<'_>) -> Result<Vec<Self>> {
        let mut constraints = Vec::new();
        while !p.is_empty() {
            constraints.push(Self::decode(p)?);
        }
        Ok(constraints)
    }
}

impl fmt::Display for Constraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Constraint::Lifetime(secs) => write!(f, "lifetime={}s", secs),
            Constraint::Confirm => write!(f, "confirm"),
        }
    }
}

/// Shortest lifetime among the constraints, if any
pub fn lifetime(constraints: &[Constraint]) -> Option<u32> {
    constraints
        .iter()
        .filter_map(|c| match c {
            Constraint::Lifetime(secs) => Some(*secs),
            Constraint::Confirm => None,
        })
        .min()
}

pub fn requires_confirm(constraints: &[Constraint]) -> bool {
    constraints.contains(&Constraint::Confirm)
}
