/*
Copyright 2025 The Hyperlight Authors.

Licensed under the Apache License, Version 2.0 (the "License");
you may not use this file except in compliance with the License.
You may obtain a copy of the License at

    http://www.apache.org/licenses/LICENSE-2.0

Unless required by applicable law or agreed to in writing, software
distributed under the License is distributed on an "AS IS" BASIS,
WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
See the License for the specific language governing permissions and
limitations under the License.
*/

use tcsandbox_common::hardware_desc::L1D_ASSOCIATIVITY;
use tracing::{Span, instrument};

use crate::Result;
use crate::error::SandboxError::{InvalidActorCount, InvalidAssociativity};

/// The complete set of configuration needed to allocate a sandbox
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[repr(C)]
pub struct SandboxConfiguration {
    /// Number of actors, each getting its own data and code block.
    actor_count: usize,
    /// Ways of the L1 data cache; the priming area holds one page per way.
    l1d_associativity: usize,
}

impl SandboxConfiguration {
    /// The default number of actors
    pub const DEFAULT_ACTOR_COUNT: usize = 1;
    /// The minimum number of actors
    pub const MIN_ACTOR_COUNT: usize = 1;
    /// The maximum number of actors
    pub const MAX_ACTOR_COUNT: usize = 16;
    /// The default L1D associativity, taken from the hardware description
    pub const DEFAULT_L1D_ASSOCIATIVITY: usize = L1D_ASSOCIATIVITY;
    /// The minimum L1D associativity
    pub const MIN_L1D_ASSOCIATIVITY: usize = 1;
    /// The maximum L1D associativity
    pub const MAX_L1D_ASSOCIATIVITY: usize = 32;

    /// Create a new configuration for a sandbox
    fn new(actor_count: usize, l1d_associativity: usize) -> Self {
        Self {
            actor_count,
            l1d_associativity,
        }
    }

    /// Set the number of actors. Checked when the layout is computed; a
    /// value outside `MIN_ACTOR_COUNT..=MAX_ACTOR_COUNT` makes allocation
    /// fail with a configuration error rather than being clamped.
    #[instrument(skip_all, parent = Span::current(), level= "Trace")]
    pub fn set_actor_count(&mut self, actor_count: usize) {
        self.actor_count = actor_count;
    }

    /// Get the number of actors
    pub fn get_actor_count(&self) -> usize {
        self.actor_count
    }

    /// Set the associativity of the target's L1 data cache. Like the
    /// actor count, it is checked when the layout is computed.
    #[instrument(skip_all, parent = Span::current(), level= "Trace")]
    pub fn set_l1d_associativity(&mut self, l1d_associativity: usize) {
        self.l1d_associativity = l1d_associativity;
    }

    /// Get the associativity of the target's L1 data cache
    pub fn get_l1d_associativity(&self) -> usize {
        self.l1d_associativity
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if !(Self::MIN_ACTOR_COUNT..=Self::MAX_ACTOR_COUNT).contains(&self.actor_count) {
            return Err(InvalidActorCount(
                self.actor_count,
                Self::MIN_ACTOR_COUNT,
                Self::MAX_ACTOR_COUNT,
            ));
        }
        if !(Self::MIN_L1D_ASSOCIATIVITY..=Self::MAX_L1D_ASSOCIATIVITY)
            .contains(&self.l1d_associativity)
        {
            return Err(InvalidAssociativity(
                self.l1d_associativity,
                Self::MIN_L1D_ASSOCIATIVITY,
                Self::MAX_L1D_ASSOCIATIVITY,
            ));
        }
        Ok(())
    }
}

impl Default for SandboxConfiguration {
    fn default() -> Self {
        Self::new(Self::DEFAULT_ACTOR_COUNT, Self::DEFAULT_L1D_ASSOCIATIVITY)
    }
}

#[cfg(test)]
mod tests {
    use super::SandboxConfiguration;
    use crate::SandboxError;

    #[test]
    fn defaults() {
        let cfg = SandboxConfiguration::default();
        assert_eq!(cfg.get_actor_count(), 1);
        assert_eq!(
            cfg.get_l1d_associativity(),
            tcsandbox_common::hardware_desc::L1D_ASSOCIATIVITY
        );
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn setters_are_not_clamped() {
        let mut cfg = SandboxConfiguration::default();
        cfg.set_actor_count(SandboxConfiguration::MAX_ACTOR_COUNT + 1);
        assert_eq!(cfg.get_actor_count(), SandboxConfiguration::MAX_ACTOR_COUNT + 1);
        assert!(matches!(
            cfg.validate(),
            Err(SandboxError::InvalidActorCount(17, 1, 16))
        ));

        cfg.set_actor_count(0);
        assert!(matches!(
            cfg.validate(),
            Err(SandboxError::InvalidActorCount(0, _, _))
        ));
    }

    #[test]
    fn associativity_bounds() {
        let mut cfg = SandboxConfiguration::default();
        cfg.set_l1d_associativity(0);
        assert!(matches!(
            cfg.validate(),
            Err(SandboxError::InvalidAssociativity(0, _, _))
        ));
        cfg.set_l1d_associativity(SandboxConfiguration::MAX_L1D_ASSOCIATIVITY);
        assert!(cfg.validate().is_ok());
        cfg.set_l1d_associativity(12);
        cfg.set_actor_count(SandboxConfiguration::MAX_ACTOR_COUNT);
        assert!(cfg.validate().is_ok());
    }
}
