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

use tcsandbox_common::PAGE_SIZE;
use tcsandbox_common::layout::{
    ACTOR_CODE_SIZE, ACTOR_DATA_SIZE, FAULTY_AREA_OFFSET, MEASUREMENT_OFFSET, REG_INIT_OFFSET,
    STORED_RSP_OFFSET, UTIL_OFFSET, l1d_priming_offset,
};
use tcsandbox_common::measurement::Measurement;
use tcsandbox_host::mem::memory_region::{MemoryRegionFlags, MemoryRegionType};
use tcsandbox_host::{ErrorKind, SandboxConfiguration, SandboxError, SandboxManager};

pub mod common;
use crate::common::{
    config_with_actors, new_initialized_manager, relative_offsets, with_allocated_sandbox,
    with_allocated_sandbox_cfg,
};

#[test]
fn allocated_memory_is_zeroed() {
    with_allocated_sandbox(4, |sandbox| {
        for region in sandbox.memory_regions().unwrap() {
            let bytes = &sandbox.memory()[region.offset_region.clone()];
            assert!(
                bytes.iter().all(|b| *b == 0),
                "{:?} of actor {:?} is not zeroed",
                region.region_type,
                region.actor
            );
        }
    });
}

#[test]
fn utility_region_directly_precedes_actor_zero() {
    for assoc in [1, 8, 12, 16] {
        let mut cfg = config_with_actors(2);
        cfg.set_l1d_associativity(assoc);
        with_allocated_sandbox_cfg(cfg, |sandbox| {
            let util = sandbox.util_ptr() as usize;
            let data = sandbox.data_ptr() as usize;
            assert_eq!(util + (assoc + 1) * PAGE_SIZE, data);
            assert_eq!(data % PAGE_SIZE, 0);
            assert_eq!(sandbox.util().priming_area().len(), assoc * PAGE_SIZE);

            let base = sandbox.base_register_value() as usize;
            assert_eq!(base - UTIL_OFFSET, data);
            assert_eq!(base - l1d_priming_offset(assoc), util);
        });
    }
}

#[test]
fn fixed_offsets_address_the_util_fields() {
    with_allocated_sandbox(1, |sandbox| {
        let m = Measurement {
            htrace: [0xF0F0],
            pfc_reading: [11, 22, 33],
        };
        sandbox.util_mut().set_stored_rsp(0x7ffc_1234_5678);
        sandbox.util_mut().set_measurement(&m);

        let base = sandbox.base_register_value() as usize;
        // SAFETY: both addresses lie in the utility region of the live sandbox
        let (rsp, htrace) = unsafe {
            (
                ((base - STORED_RSP_OFFSET) as *const u64).read_unaligned(),
                ((base - MEASUREMENT_OFFSET) as *const u64).read_unaligned(),
            )
        };
        assert_eq!(rsp, 0x7ffc_1234_5678);
        assert_eq!(htrace, 0xF0F0);
        assert_eq!(sandbox.util().measurement(), m);
    });
}

#[test]
fn actor_data_is_reachable_from_the_base_register() {
    with_allocated_sandbox(1, |sandbox| {
        {
            let mut actor = sandbox.actor_mut(0).unwrap();
            actor.faulty_area_mut()[0] = 0xAB;
            actor.set_gpr_seed(0, 0x0102_0304).unwrap();
        }
        let base = sandbox.base_register_value() as usize - sandbox.base_addr();
        let mem = sandbox.memory();
        assert_eq!(mem[base + FAULTY_AREA_OFFSET], 0xAB);
        assert_eq!(
            &mem[base + REG_INIT_OFFSET..base + REG_INIT_OFFSET + 8],
            &0x0102_0304u64.to_ne_bytes()
        );
    });
}

#[test]
fn init_allocate_free_allocate() {
    let mut mgr = new_initialized_manager(config_with_actors(3));
    let first = relative_offsets(mgr.allocate().unwrap());
    let first_id = mgr.sandbox().unwrap().id();
    mgr.free();
    assert!(mgr.sandbox().is_none());

    let sandbox = mgr.allocate().unwrap();
    assert_eq!(relative_offsets(sandbox), first);
    assert_ne!(sandbox.id(), first_id);
}

#[test]
fn free_before_anything_is_a_noop() {
    let mut mgr = SandboxManager::new();
    mgr.free();
    assert!(mgr.sandbox().is_none());
    assert!(!mgr.is_initialized());
    // the manager is still usable afterwards
    mgr.init(SandboxConfiguration::default()).unwrap();
    assert!(mgr.allocate().is_ok());
}

#[test]
fn misuse_is_reported_as_configuration_error() {
    let mut mgr = SandboxManager::new();
    assert_eq!(
        mgr.allocate().unwrap_err().kind(),
        ErrorKind::Configuration
    );

    mgr.init(SandboxConfiguration::default()).unwrap();
    let err = mgr.init(SandboxConfiguration::default()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Configuration);
    assert!(matches!(err, SandboxError::ManagerAlreadyInitialized));
}

#[test]
fn reallocation_discards_previous_contents() {
    let mut mgr = new_initialized_manager(config_with_actors(2));
    {
        let sandbox = mgr.allocate().unwrap();
        sandbox.actor_mut(1).unwrap().main_area_mut().fill(0xEE);
        sandbox.util_mut().priming_area_mut().fill(0x11);
        sandbox.code_mut(1).unwrap().write_macros(&[0xC3; 8]).unwrap();
    }
    let sandbox = mgr.allocate().unwrap();
    assert!(sandbox.memory().iter().all(|b| *b == 0));
}

#[test]
fn resizing_changes_the_layout() {
    let mut mgr = new_initialized_manager(config_with_actors(1));
    let size_one = mgr.allocate().unwrap().memory().len();
    let size_three = mgr.set_actor_count(3).unwrap().memory().len();
    assert_eq!(size_three - size_one, 2 * (ACTOR_DATA_SIZE + ACTOR_CODE_SIZE));

    // the new actor count survives a release
    mgr.free();
    assert_eq!(mgr.allocate().unwrap().actor_count(), 3);
}

#[test]
fn region_map_describes_every_actor() {
    with_allocated_sandbox(3, |sandbox| {
        let regions = sandbox.memory_regions().unwrap();
        for actor in 0..3 {
            let owned: Vec<_> = regions
                .iter()
                .filter(|r| r.actor == Some(actor))
                .map(|r| r.region_type)
                .collect();
            assert_eq!(
                owned,
                vec![
                    MemoryRegionType::MacroStack,
                    MemoryRegionType::UnderflowPad,
                    MemoryRegionType::MainArea,
                    MemoryRegionType::FaultyArea,
                    MemoryRegionType::RegInitArea,
                    MemoryRegionType::OverflowPad,
                    MemoryRegionType::CodeSection,
                    MemoryRegionType::CodeMacros,
                ]
            );
        }
        let total: usize = regions.iter().map(|r| r.len()).sum();
        assert_eq!(total, sandbox.memory().len());
    });
}

#[test]
fn faulty_area_can_be_made_read_only() {
    with_allocated_sandbox(2, |sandbox| {
        sandbox.actor_mut(1).unwrap().faulty_area_mut().fill(0x77);
        // SAFETY: the page is only read while read-only and is restored
        // before the sandbox is used again
        unsafe {
            sandbox
                .protect_faulty_area(1, MemoryRegionFlags::READ)
                .unwrap();
        }
        assert!(sandbox.actor(1).unwrap().faulty_area().iter().all(|b| *b == 0x77));
        // SAFETY: see above
        unsafe {
            sandbox
                .protect_faulty_area(1, MemoryRegionFlags::READ | MemoryRegionFlags::WRITE)
                .unwrap();
        }
        sandbox.actor_mut(1).unwrap().faulty_area_mut()[0] = 0;
    });
}

#[test]
fn allocation_ids_increase() {
    let mut mgr = new_initialized_manager(SandboxConfiguration::default());
    let mut last = mgr.allocate().unwrap().id();
    for _ in 0..5 {
        let id = mgr.allocate().unwrap().id();
        assert!(id > last);
        last = id;
    }
}
