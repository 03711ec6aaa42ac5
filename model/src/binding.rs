// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Binding levels: the (segment, driver) pairs produced by a port binding negotiation.

use crate::Segment;
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

/// One layer of a port binding.
///
/// Level 0 is the top (virtual) side of the binding, higher levels are closer to the physical
/// network.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Deserialize, Serialize)]
pub struct BindingLevel {
    pub level: u8,
    pub segment: Segment,
    /// Name of the mechanism driver that bound this level.
    pub driver: String,
}

impl BindingLevel {
    #[must_use]
    pub fn new(level: u8, segment: Segment, driver: impl Into<String>) -> Self {
        Self {
            level,
            segment,
            driver: driver.into(),
        }
    }
}

impl Display for BindingLevel {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {} by {}", self.level, self.segment, self.driver)
    }
}

/// Ways a sequence of binding levels can be malformed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InvalidBindingLevels {
    #[error("level at position {position} has index {found}")]
    OutOfOrder { position: usize, found: u8 },
    #[error("segment {lower} cannot be bound below {upper}")]
    IllegalNextHop { upper: String, lower: String },
    #[error("empty driver name at level {0}")]
    MissingDriver(u8),
}

/// Check that `levels` are indexed 0, 1, 2... and that every segment may sit below the previous
/// one.
pub fn validate_levels(levels: &[BindingLevel]) -> Result<(), InvalidBindingLevels> {
    for (position, level) in levels.iter().enumerate() {
        if usize::from(level.level) != position {
            return Err(InvalidBindingLevels::OutOfOrder {
                position,
                found: level.level,
            });
        }
        if level.driver.is_empty() {
            return Err(InvalidBindingLevels::MissingDriver(level.level));
        }
    }
    for pair in levels.windows(2) {
        if let [upper, lower] = pair
            && !upper.segment.may_precede(&lower.segment)
        {
            return Err(InvalidBindingLevels::IllegalNextHop {
                upper: upper.segment.to_string(),
                lower: lower.segment.to_string(),
            });
        }
    }
    Ok(())
}
