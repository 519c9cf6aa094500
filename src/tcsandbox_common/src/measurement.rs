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

use core::mem::size_of;

/// Number of 64-bit words in a hardware trace.
pub const HTRACE_WIDTH: usize = 1;
/// Number of performance counters read per measurement.
pub const NUM_PFC: usize = 3;

/// Size in bytes of a [`Measurement`] as laid out in sandbox memory.
pub const MEASUREMENT_SIZE: usize = size_of::<Measurement>();

/// Result of a single test-case run.
///
/// The measurement primitives of the test case write this record into
/// the utility region; the host only reserves room for it and copies it
/// out afterwards.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Measurement {
    pub htrace: [u64; HTRACE_WIDTH],
    pub pfc_reading: [u64; NUM_PFC],
}

const _: () = assert!(MEASUREMENT_SIZE == (HTRACE_WIDTH + NUM_PFC) * size_of::<u64>());

impl Measurement {
    /// Decode a record in native byte order, as the test case stores it.
    pub fn from_ne_bytes(bytes: &[u8; MEASUREMENT_SIZE]) -> Self {
        let mut words = bytes
            .chunks_exact(size_of::<u64>())
            .map(|chunk| {
                let mut word = [0u8; size_of::<u64>()];
                word.copy_from_slice(chunk);
                u64::from_ne_bytes(word)
            });
        let mut m = Self::default();
        for slot in m.htrace.iter_mut().chain(m.pfc_reading.iter_mut()) {
            *slot = words.next().unwrap_or(0);
        }
        m
    }

    /// Encode in native byte order.
    pub fn to_ne_bytes(&self) -> [u8; MEASUREMENT_SIZE] {
        let mut out = [0u8; MEASUREMENT_SIZE];
        for (chunk, word) in out
            .chunks_exact_mut(size_of::<u64>())
            .zip(self.htrace.iter().chain(self.pfc_reading.iter()))
        {
            chunk.copy_from_slice(&word.to_ne_bytes());
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pfc_readings_follow_the_trace() {
        let m = Measurement {
            htrace: [0xdead_beef],
            pfc_reading: [1, 2, 3],
        };
        let bytes = m.to_ne_bytes();
        assert_eq!(&bytes[..8], &0xdead_beef_u64.to_ne_bytes());
        assert_eq!(&bytes[8..16], &1u64.to_ne_bytes());
        assert_eq!(&bytes[24..32], &3u64.to_ne_bytes());
        assert_eq!(Measurement::from_ne_bytes(&bytes), m);
    }

    #[test]
    fn zeroed_bytes_decode_to_default() {
        assert_eq!(
            Measurement::from_ne_bytes(&[0u8; MEASUREMENT_SIZE]),
            Measurement::default()
        );
    }
}
