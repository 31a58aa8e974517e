#![no_main]

use libfuzzer_sys::fuzz_target;
use lineage::memory::{read_string_array, ForeignMemory, MemoryError, WORD_SIZE};
use nix::errno::Errno;

const BASE: u64 = 0x1000;

/// The fuzz input mapped at `BASE`; everything else is unmapped.
struct SliceMemory<'a>(&'a [u8]);

impl ForeignMemory for SliceMemory<'_> {
    fn peek_word(&self, addr: u64) -> Result<usize, MemoryError> {
        let fault = MemoryError {
            addr,
            source: Errno::EFAULT,
        };
        let start = addr.checked_sub(BASE).ok_or(fault.clone())? as usize;
        let bytes = self
            .0
            .get(start..start.saturating_add(WORD_SIZE))
            .ok_or(fault)?;
        let mut word = [0u8; WORD_SIZE];
        word.copy_from_slice(bytes);
        Ok(usize::from_ne_bytes(word))
    }
}

fuzz_target!(|data: &[u8]| {
    // Arbitrary pointer arrays must end in data or a typed error, never a panic
    let memory = SliceMemory(data);
    let _ = read_string_array(&memory, BASE);
});
