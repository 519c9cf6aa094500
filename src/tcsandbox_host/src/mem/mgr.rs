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

use std::sync::atomic::{AtomicU64, Ordering};

use tcsandbox_common::PAGE_SIZE;
use tracing::{Span, instrument};

use super::layout::SandboxMemoryLayout;
use crate::error::SandboxError::{
    ManagerAlreadyInitialized, ManagerNotInitialized, PageSizeMismatch,
};
use crate::metrics::{CounterMetric, EmittableMetric, HistogramMetric};
use crate::sandbox::{Sandbox, SandboxConfiguration};
use crate::{Result, log_then_return, new_error};

/// Source of the process-unique allocation ids
static ALLOCATION_COUNTER: AtomicU64 = AtomicU64::new(0);

#[derive(Debug, Clone, Copy)]
enum ManagerState {
    Uninitialized,
    Initialized(SandboxConfiguration),
    /// Released by `free`: `init` may be called again, and `allocate`
    /// reuses the last configuration without initializing anew
    Released(SandboxConfiguration),
}

/// Owns the active sandbox, if any, and enforces the order in which it
/// may be set up, allocated and released:
///
/// - `init` once, then `allocate` as often as needed. Allocating while
///   a sandbox is active replaces it with a fresh one.
/// - `free` releases the active sandbox. It is a no-op when there is
///   nothing to release, and allows `init` to be called again.
///
/// All methods take `&mut self`; callers sharing a manager across
/// threads must serialize access themselves.
#[derive(Debug)]
pub struct SandboxManager {
    state: ManagerState,
    sandbox: Option<Sandbox>,
}

impl Default for SandboxManager {
    fn default() -> Self {
        Self::new()
    }
}

impl SandboxManager {
    pub fn new() -> Self {
        Self {
            state: ManagerState::Uninitialized,
            sandbox: None,
        }
    }

    /// Set the manager up to allocate sandboxes described by `config`.
    ///
    /// Fails if the manager is already initialized and has not been
    /// released since, if the host page size is not the one the layout
    /// is built for, or if `config` cannot be laid out. A sandbox
    /// allocated after the last `free` stays active.
    #[instrument(err(Debug), skip_all, parent = Span::current(), level= "Trace")]
    pub fn init(&mut self, config: SandboxConfiguration) -> Result<()> {
        if let ManagerState::Initialized(_) = self.state {
            CounterMetric::lifecycle_violation("double_init").emit();
            log_then_return!(ManagerAlreadyInitialized);
        }

        let host_page_size = page_size::get();
        if host_page_size != PAGE_SIZE {
            log_then_return!(PageSizeMismatch(host_page_size, PAGE_SIZE));
        }
        // reject a bad configuration now rather than on first allocation
        let layout = SandboxMemoryLayout::new(config)?;

        log::info!(
            "sandbox manager initialized for {} actors, {:#x} bytes per sandbox",
            config.get_actor_count(),
            layout.get_memory_size()?
        );
        self.state = ManagerState::Initialized(config);
        Ok(())
    }

    /// Allocate a fresh, zeroed sandbox and make it the active one.
    ///
    /// An already active sandbox is released once the new one exists;
    /// if allocation fails, the manager is left as it was.
    #[instrument(skip_all, parent = Span::current(), level= "Trace")]
    pub fn allocate(&mut self) -> Result<&mut Sandbox> {
        let config = match self.config() {
            Some(config) => config,
            None => {
                CounterMetric::lifecycle_violation("allocate_before_init").emit();
                log_then_return!(ManagerNotInitialized);
            }
        };
        self.publish(config)
    }

    /// Change the number of actors and reallocate the sandbox to match.
    ///
    /// On failure, including an actor count outside the supported
    /// range, both the configuration and the active sandbox are kept.
    #[instrument(skip(self), parent = Span::current(), level= "Trace")]
    pub fn set_actor_count(&mut self, actor_count: usize) -> Result<&mut Sandbox> {
        let mut config = match self.config() {
            Some(config) => config,
            None => {
                CounterMetric::lifecycle_violation("resize_before_init").emit();
                log_then_return!(ManagerNotInitialized);
            }
        };
        config.set_actor_count(actor_count);
        self.publish(config)
    }

    /// Release the active sandbox. Safe to call at any time; with
    /// nothing to release it only logs.
    #[instrument(skip_all, parent = Span::current(), level= "Trace")]
    pub fn free(&mut self) {
        match self.sandbox.take() {
            Some(sandbox) => Self::release(sandbox),
            None => log::debug!("free called without an active sandbox, nothing to release"),
        }
        if let ManagerState::Initialized(config) = self.state {
            self.state = ManagerState::Released(config);
        }
    }

    /// The active sandbox, if one is allocated
    pub fn sandbox(&self) -> Option<&Sandbox> {
        self.sandbox.as_ref()
    }

    /// The active sandbox, if one is allocated
    pub fn sandbox_mut(&mut self) -> Option<&mut Sandbox> {
        self.sandbox.as_mut()
    }

    /// Whether `init` succeeded and `free` has not been called since
    pub fn is_initialized(&self) -> bool {
        matches!(self.state, ManagerState::Initialized(_))
    }

    /// The configuration the next allocation will use
    pub fn config(&self) -> Option<SandboxConfiguration> {
        match self.state {
            ManagerState::Uninitialized => None,
            ManagerState::Initialized(config) | ManagerState::Released(config) => Some(config),
        }
    }

    fn publish(&mut self, config: SandboxConfiguration) -> Result<&mut Sandbox> {
        let sandbox = Self::build(config)?;
        log::info!(
            "allocated sandbox {} at {:#x} ({} actors)",
            sandbox.id(),
            sandbox.base_addr(),
            sandbox.actor_count()
        );

        // keeps the init state, only the configuration changes
        self.state = match self.state {
            ManagerState::Released(_) => ManagerState::Released(config),
            _ => ManagerState::Initialized(config),
        };
        if let Some(old) = self.sandbox.replace(sandbox) {
            Self::release(old);
        }

        self.sandbox
            .as_mut()
            .ok_or_else(|| new_error!("sandbox was not published after allocation"))
    }

    fn build(config: SandboxConfiguration) -> Result<Sandbox> {
        let result = HistogramMetric::time_and_emit_allocation(|| {
            let layout = SandboxMemoryLayout::new(config)?;
            let id = ALLOCATION_COUNTER.fetch_add(1, Ordering::Relaxed);
            Sandbox::new(id, layout)
        });
        match &result {
            Ok(_) => CounterMetric::SandboxAllocations.emit(),
            Err(e) => {
                log::error!("sandbox allocation failed: {}", e);
                CounterMetric::allocation_failure(e.kind()).emit();
            }
        }
        result
    }

    fn release(sandbox: Sandbox) {
        log::info!("releasing sandbox {}", sandbox.id());
        drop(sandbox);
        CounterMetric::SandboxReleases.emit();
    }
}

impl Drop for SandboxManager {
    fn drop(&mut self) {
        self.free();
    }
}
