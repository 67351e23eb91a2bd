//! SPIR-V loading.

use std::fs::File;
use std::path::Path;

/// Read a SPIR-V binary from disk.
///
/// Returns `None` (with a warning) when the file cannot be read or is not a
/// whole number of 32-bit words. An empty file yields an empty vector, also
/// with a warning.
pub fn load_shader_from_disk(path: impl AsRef<Path>) -> Option<Vec<u32>> {
    let path = path.as_ref();

    let mut file = match File::open(path) {
        Ok(file) => file,
        Err(e) => {
            tracing::warn!("Failed to open shader {}: {e}", path.display());
            return None;
        }
    };

    let words = match ash::util::read_spv(&mut file) {
        Ok(words) => words,
        Err(e) => {
            tracing::warn!("Failed to read shader {}: {e}", path.display());
            return None;
        }
    };

    if words.is_empty() {
        tracing::warn!("Shader {} is empty", path.display());
    } else {
        tracing::debug!("Loaded shader {} ({} words)", path.display(), words.len());
    }

    Some(words)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_file(dir: &Path, name: &str, bytes: &[u8]) -> std::path::PathBuf {
        let path = dir.join(name);
        File::create(&path).unwrap().write_all(bytes).unwrap();
        path
    }

    #[test]
    fn reads_back_every_word() {
        let dir = tempfile::tempdir().unwrap();
        let words: Vec<u32> = vec![0x0723_0203, 0x0001_0000, 7, 42, u32::MAX];
        let bytes: Vec<u8> = words.iter().flat_map(|w| w.to_le_bytes()).collect();
        let path = write_file(dir.path(), "shader.spv", &bytes);

        assert_eq!(load_shader_from_disk(&path), Some(words));
    }

    #[test]
    fn empty_file_gives_empty_words() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(dir.path(), "empty.spv", &[]);
        assert_eq!(load_shader_from_disk(&path), Some(Vec::new()));
    }

    #[test]
    fn missing_file_is_none() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(load_shader_from_disk(dir.path().join("missing.spv")), None);
    }

    #[test]
    fn partial_word_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(dir.path(), "odd.spv", &[1, 2, 3, 4, 5, 6]);
        assert_eq!(load_shader_from_disk(&path), None);
    }
}
