//! Semantic versions for the engine and hosted applications.

use std::fmt;

/// Name reported to the graphics driver as the engine name.
pub const ENGINE_NAME: &str = "Vireo";

/// Version of the engine itself.
pub const ENGINE_VERSION: Version = Version::new(0, 1, 0);

/// A `major.minor.patch` version triple.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Version {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

impl Version {
    /// Create a new version.
    pub const fn new(major: u32, minor: u32, patch: u32) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }

    /// Pack the version the way Vulkan's `VK_MAKE_API_VERSION` does, with a
    /// zero variant.
    pub const fn packed(self) -> u32 {
        (self.major << 22) | (self.minor << 12) | self.patch
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn packing_matches_vulkan_layout() {
        let v = Version::new(1, 3, 7);
        assert_eq!(v.packed() >> 22, 1);
        assert_eq!((v.packed() >> 12) & 0x3ff, 3);
        assert_eq!(v.packed() & 0xfff, 7);
    }

    #[test]
    fn display() {
        assert_eq!(Version::new(0, 1, 2).to_string(), "0.1.2");
    }
}
