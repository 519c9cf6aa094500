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

#![no_main]

use libfuzzer_sys::fuzz_target;
use tcsandbox_common::PAGE_SIZE;
use tcsandbox_common::layout::{
    MEASUREMENT_OFFSET, STORED_RSP_OFFSET, UTIL_OFFSET, l1d_priming_offset,
};
use tcsandbox_host::mem::layout::SandboxMemoryLayout;
use tcsandbox_host::{SandboxConfiguration, SandboxManager};

// Any configuration either lays out cleanly or is rejected as a
// configuration error; a valid one allocates to exactly its layout.
fuzz_target!(|input: (u8, u16)| {
    let (actors, associativity) = input;
    let mut cfg = SandboxConfiguration::default();
    cfg.set_actor_count(actors as usize);
    cfg.set_l1d_associativity(associativity as usize);

    let layout = match SandboxMemoryLayout::new(cfg) {
        Ok(layout) => layout,
        Err(e) => {
            assert!(e.is_configuration_error());
            return;
        }
    };

    let size = layout.get_memory_size().unwrap();
    let regions = layout.get_memory_regions().unwrap();
    assert_eq!(regions.first().unwrap().offset_region.start, 0);
    assert_eq!(regions.last().unwrap().offset_region.end, size);
    for pair in regions.windows(2) {
        assert_eq!(pair[0].offset_region.end, pair[1].offset_region.start);
    }

    let base = layout.get_base_register_offset();
    assert_eq!(base % PAGE_SIZE, 0);
    assert_eq!(base - UTIL_OFFSET, layout.get_data_offset());
    assert_eq!(base - STORED_RSP_OFFSET, layout.get_stored_rsp_offset());
    assert_eq!(base - MEASUREMENT_OFFSET, layout.get_measurement_offset());
    assert_eq!(base - l1d_priming_offset(associativity as usize), 0);

    let mut mgr = SandboxManager::new();
    mgr.init(cfg).unwrap();
    let sandbox = mgr.allocate().unwrap();
    assert_eq!(sandbox.memory().len(), size);
    assert!(sandbox.memory().iter().all(|b| *b == 0));
    mgr.free();
});
