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

use std::sync::Once;
use std::time::{Duration, Instant};

use metrics_macro::NamedMetric;

use crate::error::ErrorKind;

#[macro_use]
mod metrics_macro;

static LABEL_KIND: &str = "kind";

define_metrics! {
    CounterMetric {
        SandboxAllocations => {
            name: "sandbox_allocations_total",
            description: "Number of sandboxes allocated",
            unit: metrics::Unit::Count,
        },
        SandboxAllocationFailures { kind: ErrorKind } => {
            name: "sandbox_allocation_failures_total",
            description: "Number of sandbox allocations that failed, by error kind",
            unit: metrics::Unit::Count,
        },
        SandboxReleases => {
            name: "sandbox_releases_total",
            description: "Number of sandboxes released",
            unit: metrics::Unit::Count,
        },
        LifecycleViolations { kind: &'static str } => {
            name: "sandbox_lifecycle_violations_total",
            description: "Number of sandbox manager calls made out of order",
            unit: metrics::Unit::Count,
        },
    }
    HistogramMetric {
        AllocationDuration { duration: Duration } => {
            name: "sandbox_allocation_duration_seconds",
            description: "Time taken to map, zero and check the memory of a sandbox",
            unit: metrics::Unit::Seconds,
        },
    }
}

impl CounterMetric {
    #[must_use]
    pub(crate) fn allocation_failure(kind: ErrorKind) -> Self {
        CounterMetric::SandboxAllocationFailures { kind }
    }

    /// `kind` names the misuse, e.g. `"double_init"`
    #[must_use]
    pub(crate) fn lifecycle_violation(kind: &'static str) -> Self {
        CounterMetric::LifecycleViolations { kind }
    }
}

impl HistogramMetric {
    /// Runs `f` and emits how long it took as the allocation duration.
    pub(crate) fn time_and_emit_allocation<T, F: FnOnce() -> T>(f: F) -> T {
        let start = Instant::now();
        let result = f();
        HistogramMetric::AllocationDuration {
            duration: start.elapsed(),
        }
        .emit();
        result
    }
}

fn error_kind_label(kind: ErrorKind) -> &'static str {
    match kind {
        ErrorKind::Configuration => "configuration",
        ErrorKind::Allocation => "allocation",
    }
}

/// A metric which can be emitted to the underlying metrics system
pub(crate) trait EmittableMetric {
    /// Emits the metric. The first emission of each variant also
    /// describes it to the recorder.
    fn emit(self);
}

impl EmittableMetric for CounterMetric {
    /// Increases the counter represented by `self` by 1
    fn emit(self) {
        let name = self.name();
        let unit = self.unit();
        let description = self.description();

        match self {
            CounterMetric::SandboxAllocations => {
                static DESCRIBE: Once = Once::new();
                DESCRIBE.call_once(|| {
                    metrics::describe_counter!(name, unit, description);
                });

                metrics::counter!(name).increment(1);
            }
            CounterMetric::SandboxAllocationFailures { kind } => {
                static DESCRIBE: Once = Once::new();
                DESCRIBE.call_once(|| {
                    metrics::describe_counter!(name, unit, description);
                });

                metrics::counter!(name, LABEL_KIND => error_kind_label(kind)).increment(1);
            }
            CounterMetric::SandboxReleases => {
                static DESCRIBE: Once = Once::new();
                DESCRIBE.call_once(|| {
                    metrics::describe_counter!(name, unit, description);
                });

                metrics::counter!(name).increment(1);
            }
            CounterMetric::LifecycleViolations { kind } => {
                static DESCRIBE: Once = Once::new();
                DESCRIBE.call_once(|| {
                    metrics::describe_counter!(name, unit, description);
                });

                metrics::counter!(name, LABEL_KIND => kind).increment(1);
            }
        }
    }
}

impl EmittableMetric for HistogramMetric {
    fn emit(self) {
        let name = self.name();
        let unit = self.unit();
        let description = self.description();

        match self {
            HistogramMetric::AllocationDuration { duration } => {
                static DESCRIBE: Once = Once::new();
                DESCRIBE.call_once(|| {
                    metrics::describe_histogram!(name, unit, description);
                });

                metrics::histogram!(name).record(duration);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use metrics::{Key, Label};
    use metrics_util::CompositeKey;
    use metrics_util::debugging::{DebugValue, DebuggingRecorder};

    use super::*;

    #[test]
    fn test_counter_and_histogram_metrics() {
        let recorder = DebuggingRecorder::new();
        let snapshotter = recorder.snapshotter();

        let allocations = CounterMetric::SandboxAllocations;
        let failure = CounterMetric::allocation_failure(ErrorKind::Allocation);
        let violation = CounterMetric::lifecycle_violation("double_init");
        let duration = HistogramMetric::AllocationDuration {
            duration: Duration::from_secs(2),
        };

        let snapshot = metrics::with_local_recorder(&recorder, || {
            allocations.clone().emit();
            allocations.clone().emit();
            failure.clone().emit();
            violation.clone().emit();
            CounterMetric::SandboxReleases.emit();
            duration.clone().emit();

            snapshotter.snapshot()
        });

        #[expect(clippy::mutable_key_type)]
        let snapshot = snapshot.into_hashmap();
        assert_eq!(snapshot.len(), 5);

        let key = CompositeKey::new(metrics_util::MetricKind::Counter, allocations.name().into());
        assert_eq!(snapshot.get(&key).unwrap().2, DebugValue::Counter(2));

        let key = CompositeKey::new(
            metrics_util::MetricKind::Counter,
            Key::from_parts(failure.name(), vec![Label::new("kind", "allocation")]),
        );
        assert_eq!(snapshot.get(&key).unwrap().2, DebugValue::Counter(1));

        let key = CompositeKey::new(
            metrics_util::MetricKind::Counter,
            Key::from_parts(violation.name(), vec![Label::new("kind", "double_init")]),
        );
        assert_eq!(snapshot.get(&key).unwrap().2, DebugValue::Counter(1));

        let key = CompositeKey::new(metrics_util::MetricKind::Histogram, duration.name().into());
        assert!(
            matches!(
                &snapshot.get(&key).unwrap().2,
                DebugValue::Histogram(histogram) if histogram.len() == 1 && histogram[0].0 == 2.0
            ),
            "Histogram metric does not match expected value"
        );
    }

    #[test]
    fn time_and_emit_allocation_returns_result() {
        let recorder = DebuggingRecorder::new();
        let snapshotter = recorder.snapshotter();
        let (value, snapshot) = metrics::with_local_recorder(&recorder, || {
            let value = HistogramMetric::time_and_emit_allocation(|| 42);
            (value, snapshotter.snapshot())
        });
        assert_eq!(value, 42);
        #[expect(clippy::mutable_key_type)]
        let snapshot = snapshot.into_hashmap();
        assert_eq!(snapshot.len(), 1);
    }
}
