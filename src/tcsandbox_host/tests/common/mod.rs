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

#![allow(dead_code)]

use tcsandbox_host::{Sandbox, SandboxConfiguration, SandboxManager};

/// Builds a configuration for `actors` actors and the default
/// associativity.
pub fn config_with_actors(actors: usize) -> SandboxConfiguration {
    let mut cfg = SandboxConfiguration::default();
    cfg.set_actor_count(actors);
    cfg
}

/// Creates a manager that has been initialized with `cfg`.
pub fn new_initialized_manager(cfg: SandboxConfiguration) -> SandboxManager {
    let mut mgr = SandboxManager::new();
    mgr.init(cfg).unwrap();
    mgr
}

/// Runs a test against a freshly allocated sandbox with `actors` actors.
/// The sandbox is released when `f` returns.
pub fn with_allocated_sandbox<F>(actors: usize, f: F)
where
    F: FnOnce(&mut Sandbox),
{
    with_allocated_sandbox_cfg(config_with_actors(actors), f);
}

/// Runs a test against a freshly allocated sandbox using a custom
/// configuration.
pub fn with_allocated_sandbox_cfg<F>(cfg: SandboxConfiguration, f: F)
where
    F: FnOnce(&mut Sandbox),
{
    let mut mgr = new_initialized_manager(cfg);
    f(mgr.allocate().unwrap());
    mgr.free();
    assert!(mgr.sandbox().is_none());
}

/// Offsets of the externally visible pointers of `sandbox`, relative to
/// its first byte.
pub fn relative_offsets(sandbox: &Sandbox) -> Vec<usize> {
    let base = sandbox.base_addr();
    let mut offsets = vec![
        sandbox.util_ptr() as usize - base,
        sandbox.data_ptr() as usize - base,
        sandbox.code_ptr() as usize - base,
        sandbox.base_register_value() as usize - base,
    ];
    for actor in 0..sandbox.actor_count() {
        offsets.push(sandbox.faulty_area_range(actor).unwrap().start - base);
    }
    offsets
}
