//! Reading strings and string arrays out of a tracee's address space
//!
//! Everything goes through a single word-sized peek, so a read never touches
//! more of the tracee than the string it is looking for.

use nix::sys::ptrace;
use nix::unistd::Pid;

/// Size of one peeked word, which is also the size of a remote pointer.
pub const WORD_SIZE: usize = std::mem::size_of::<usize>();

/// A word read from the tracee failed.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("Failed to peek word at {addr:#x}")]
pub struct MemoryError {
    pub addr: u64,
    #[source]
    pub source: nix::Error,
}

/// Source of machine words from a foreign address space.
pub trait ForeignMemory {
    fn peek_word(&self, addr: u64) -> Result<usize, MemoryError>;
}

/// Live memory of a stopped tracee, read with `PTRACE_PEEKDATA`.
#[derive(Debug, Clone, Copy)]
pub struct TraceeMemory {
    pid: Pid,
}

impl TraceeMemory {
    pub fn new(pid: Pid) -> Self {
        Self { pid }
    }
}

impl ForeignMemory for TraceeMemory {
    fn peek_word(&self, addr: u64) -> Result<usize, MemoryError> {
        ptrace::read(self.pid, addr as usize as ptrace::AddressType)
            .map(|word| word as usize)
            .map_err(|source| MemoryError { addr, source })
    }
}

/// Read the NUL-terminated string at `addr`.
///
/// Returns `Ok(None)` for a null address. The terminating NUL is not part of
/// the result, and no word past the one holding it is read.
pub fn read_string<M: ForeignMemory + ?Sized>(
    memory: &M,
    addr: u64,
) -> Result<Option<Vec<u8>>, MemoryError> {
    if addr == 0 {
        return Ok(None);
    }

    let mut data = Vec::new();
    let mut offset = 0u64;

    loop {
        let word = memory.peek_word(addr.wrapping_add(offset))?;

        for byte in word.to_ne_bytes() {
            if byte == 0 {
                return Ok(Some(data));
            }
            data.push(byte);
        }

        offset += WORD_SIZE as u64;
    }
}

/// Read a NULL-terminated array of string pointers at `addr` (an `argv` or `envp`).
///
/// Returns `Ok(None)` for a null address. The NULL sentinel ends the walk and is
/// never dereferenced.
pub fn read_string_array<M: ForeignMemory + ?Sized>(
    memory: &M,
    addr: u64,
) -> Result<Option<Vec<Vec<u8>>>, MemoryError> {
    if addr == 0 {
        return Ok(None);
    }

    let mut strings = Vec::new();
    let mut offset = 0u64;

    loop {
        let pointer = memory.peek_word(addr.wrapping_add(offset))? as u64;
        if pointer == 0 {
            return Ok(Some(strings));
        }

        // A non-null pointer always yields a string.
        strings.push(read_string(memory, pointer)?.unwrap_or_default());
        offset += WORD_SIZE as u64;
    }
}

/// Lossy conversion used everywhere tracee strings end up in the tree.
pub fn to_lossy_strings(strings: Vec<Vec<u8>>) -> Vec<String> {
    strings
        .into_iter()
        .map(|s| String::from_utf8_lossy(&s).into_owned())
        .collect()
}
