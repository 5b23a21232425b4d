//! Machine bootstrap.
//!
//! The loader copies the boot image into the kernel region and hands the
//! user program to the machine as an input stream:
//!
//! ```text
//! [count: u16 BE][word 0: u32 BE] ... [word count-1: u32 BE]
//! ```
//!
//! The boot image reads that stream with `read` and copies the program into
//! user memory itself.

use crate::config::{ConfigError, MachineConfig};
use crate::cpu::{Cpu, InputDevice, Memory};
use crate::kernel::KernelState;
use crate::word::{self, Word};
use thiserror::Error;

/// Largest program the 16-bit count prefix can describe.
pub const MAX_PAYLOAD_WORDS: usize = u16::MAX as usize;

/// Errors that can occur while building a machine.
#[derive(Debug, Error)]
pub enum BootError {
    #[error("boot image of {size} words is larger than the {capacity}-word kernel region")]
    KernelTooLarge { size: usize, capacity: usize },

    #[error("program of {size} words does not fit in {capacity} words")]
    PayloadTooLarge { size: usize, capacity: usize },

    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Encode a program as the count-prefixed payload stream.
pub fn payload_stream(program: &[Word]) -> Result<Vec<u8>, BootError> {
    let count = u16::try_from(program.len()).map_err(|_| BootError::PayloadTooLarge {
        size: program.len(),
        capacity: MAX_PAYLOAD_WORDS,
    })?;

    let mut bytes = Vec::with_capacity(2 + program.len() * word::WORD_BYTES);
    bytes.extend_from_slice(&count.to_be_bytes());
    bytes.extend(word::words_to_bytes(program));
    Ok(bytes)
}

/// Build the initial memory: boot image at 0, everything else zero.
pub fn boot_memory(config: &MachineConfig, kernel_image: &[Word]) -> Result<Memory, BootError> {
    if kernel_image.len() > config.kernel_region {
        return Err(BootError::KernelTooLarge {
            size: kernel_image.len(),
            capacity: config.kernel_region,
        });
    }
    let mut memory = Memory::new(config.memory_size);
    memory
        .load_image(0, kernel_image)
        .map_err(|_| BootError::KernelTooLarge {
            size: kernel_image.len(),
            capacity: config.memory_size,
        })?;
    Ok(memory)
}

/// Build a ready-to-run machine.
///
/// The CPU starts in kernel mode at address 0 with the payload stream as
/// its only input. Callers that want host input after the payload append
/// it to `cpu.input`.
pub fn load(config: &MachineConfig, kernel_image: &[Word], program: &[Word]) -> Result<Cpu, BootError> {
    config.validate()?;
    if program.len() > config.user_region() {
        return Err(BootError::PayloadTooLarge {
            size: program.len(),
            capacity: config.user_region(),
        });
    }

    let payload = payload_stream(program)?;
    let memory = boot_memory(config, kernel_image)?;

    let mut cpu = Cpu::boot(KernelState::new(config), memory);
    cpu.input = InputDevice::from_bytes(payload);
    log::debug!(
        "[boot] {} kernel words, {} program words, {} words of memory",
        kernel_image.len(),
        program.len(),
        config.memory_size
    );
    Ok(cpu)
}
