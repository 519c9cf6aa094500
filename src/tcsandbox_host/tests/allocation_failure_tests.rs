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

use metrics::{Key, Label};
use metrics_util::debugging::{DebugValue, DebuggingRecorder};
use metrics_util::{CompositeKey, MetricKind};
use tcsandbox_host::{SandboxConfiguration, SandboxError, SandboxManager};

/// Address space headroom left when the limit is lowered. Enough for
/// small heap allocations, far below the size of a 16 actor sandbox.
const HEADROOM: u64 = 64 * 1024;

fn address_space_in_use() -> u64 {
    let status = std::fs::read_to_string("/proc/self/status").unwrap();
    let kb: u64 = status
        .lines()
        .find_map(|line| line.strip_prefix("VmSize:"))
        .and_then(|rest| rest.trim().trim_end_matches("kB").trim().parse().ok())
        .unwrap();
    kb * 1024
}

fn address_space_limit() -> libc::rlimit {
    let mut limit = libc::rlimit {
        rlim_cur: 0,
        rlim_max: 0,
    };
    // SAFETY: limit is a valid rlimit to write to
    assert_eq!(unsafe { libc::getrlimit(libc::RLIMIT_AS, &mut limit) }, 0);
    limit
}

fn set_address_space_limit(limit: &libc::rlimit) {
    // SAFETY: only changes the limit of this process
    assert_eq!(unsafe { libc::setrlimit(libc::RLIMIT_AS, limit) }, 0);
}

// Kept as the only test in this binary, the address space limit is
// process-wide.
#[test]
fn host_memory_exhaustion_keeps_the_active_sandbox() {
    let recorder = DebuggingRecorder::new();
    let snapshotter = recorder.snapshotter();

    let snapshot = metrics::with_local_recorder(&recorder, || {
        let mut cfg = SandboxConfiguration::default();
        cfg.set_actor_count(1);
        let mut mgr = SandboxManager::new();
        mgr.init(cfg).unwrap();
        let id = mgr.allocate().unwrap().id();

        let original = address_space_limit();
        let lowered = libc::rlimit {
            rlim_cur: address_space_in_use() + HEADROOM,
            rlim_max: original.rlim_max,
        };
        set_address_space_limit(&lowered);
        let result = mgr
            .set_actor_count(SandboxConfiguration::MAX_ACTOR_COUNT)
            .map(|sandbox| sandbox.id());
        set_address_space_limit(&original);

        let err = result.unwrap_err();
        assert!(matches!(err, SandboxError::MmapFailed(Some(libc::ENOMEM))), "{:?}", err);
        assert!(err.is_allocation_error());
        // nothing was published, the previous sandbox and configuration
        // are still in place
        assert_eq!(mgr.sandbox().unwrap().id(), id);
        assert_eq!(mgr.sandbox().unwrap().actor_count(), 1);
        assert_eq!(mgr.config().unwrap().get_actor_count(), 1);
        assert!(mgr.is_initialized());

        // the caller retries once memory is available again
        let sandbox = mgr
            .set_actor_count(SandboxConfiguration::MAX_ACTOR_COUNT)
            .unwrap();
        assert!(sandbox.id() > id);
        assert!(sandbox.memory().iter().all(|b| *b == 0));
        mgr.free();
        snapshotter.snapshot()
    });

    #[expect(clippy::mutable_key_type)]
    let snapshot = snapshot.into_hashmap();
    let counted = |name: &'static str, labels: Vec<Label>, expected: u64| {
        let key = CompositeKey::new(MetricKind::Counter, Key::from_parts(name, labels));
        matches!(snapshot.get(&key), Some((_, _, DebugValue::Counter(n))) if *n == expected)
    };
    assert!(counted(
        "sandbox_allocation_failures_total",
        vec![Label::new("kind", "allocation")],
        1
    ));
    assert!(counted("sandbox_allocations_total", vec![], 2));
    assert!(counted("sandbox_releases_total", vec![], 2));
}
