//! Word image files.
//!
//! A raw image is a flat sequence of big-endian words with no header.
//! Files ending in `.asm` are treated as assembler source instead and are
//! assembled on load.

use super::assembler::{assemble, AssemblerError};
use crate::cpu::isa::InstructionSet;
use crate::word::{self, Word};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Load an image or assemble a source file, depending on the extension.
pub fn load_image<P: AsRef<Path>>(path: P, set: &InstructionSet) -> Result<Vec<Word>, ImageError> {
    let path = path.as_ref();
    let io_err = |source| ImageError::Io { path: path.to_path_buf(), source };

    if path.extension().is_some_and(|e| e == "asm") {
        let source = std::fs::read_to_string(path).map_err(io_err)?;
        return assemble(&source, set).map_err(|source| ImageError::Assembly {
            path: path.to_path_buf(),
            source,
        });
    }

    let bytes = std::fs::read(path).map_err(io_err)?;
    parse_image(&bytes)
}

/// Parse raw image bytes.
pub fn parse_image(bytes: &[u8]) -> Result<Vec<Word>, ImageError> {
    word::bytes_to_words(bytes).ok_or(ImageError::Misaligned(bytes.len()))
}

/// Write words as a raw image.
pub fn save_image<P: AsRef<Path>>(path: P, words: &[Word]) -> Result<(), ImageError> {
    let path = path.as_ref();
    std::fs::write(path, word::words_to_bytes(words)).map_err(|source| ImageError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Errors that can occur while loading or saving images.
#[derive(Debug, Error)]
pub enum ImageError {
    #[error("{}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("image length {0} is not a multiple of 4 bytes")]
    Misaligned(usize),

    #[error("{}: {source}", path.display())]
    Assembly {
        path: PathBuf,
        #[source]
        source: AssemblerError,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernel::instruction_set;

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("trapvm-{}-{}", std::process::id(), name))
    }

    #[test]
    fn test_parse_image() {
        assert_eq!(parse_image(&[0, 0, 0, 1, 0xff, 0, 0, 0]).unwrap(), vec![1, 0xff00_0000]);
        assert!(matches!(parse_image(&[1, 2, 3, 4, 5]), Err(ImageError::Misaligned(5))));
    }

    #[test]
    fn test_save_then_load_raw() {
        let path = temp_path("image.bin");
        save_image(&path, &[0x1500_0000, 7]).unwrap();
        let words = load_image(&path, &instruction_set()).unwrap();
        std::fs::remove_file(&path).unwrap();
        assert_eq!(words, vec![0x1500_0000, 7]);
    }

    #[test]
    fn test_asm_files_are_assembled() {
        let path = temp_path("prog.asm");
        std::fs::write(&path, "halt\n").unwrap();
        let words = load_image(&path, &instruction_set()).unwrap();
        std::fs::remove_file(&path).unwrap();
        assert_eq!(words, vec![0x1500_0000]);
    }

    #[test]
    fn test_missing_file() {
        let err = load_image(temp_path("missing.bin"), &instruction_set()).unwrap_err();
        assert!(matches!(err, ImageError::Io { .. }));
    }
}
