//! Packed version numbers used by dylib, version-min and build-version commands.

use std::fmt;

/// A version packed as `xxxx.yy.zz` into 32 bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct PackedVersion(pub u32);

impl PackedVersion {
    /// Major component (upper 16 bits).
    #[inline]
    pub fn major(self) -> u32 {
        self.0 >> 16
    }

    /// Minor component.
    #[inline]
    pub fn minor(self) -> u32 {
        (self.0 >> 8) & 0xFF
    }

    /// Patch component.
    #[inline]
    pub fn patch(self) -> u32 {
        self.0 & 0xFF
    }
}

impl fmt::Display for PackedVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major(), self.minor())?;
        if self.patch() != 0 {
            write!(f, ".{}", self.patch())?;
        }
        Ok(())
    }
}

/// A source version packed as `a.b.c.d.e` into 64 bits (24.10.10.10.10 bits).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct SourceVersion(pub u64);

impl SourceVersion {
    /// Returns the five components, most significant first.
    pub fn components(self) -> [u64; 5] {
        let v = self.0;
        [
            (v >> 40) & 0xFF_FFFF,
            (v >> 30) & 0x3FF,
            (v >> 20) & 0x3FF,
            (v >> 10) & 0x3FF,
            v & 0x3FF,
        ]
    }
}

impl fmt::Display for SourceVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d, e] = self.components();
        write!(f, "{a}.{b}")?;
        // Trailing zero components are elided, as otool does.
        if c != 0 || d != 0 || e != 0 {
            write!(f, ".{c}")?;
        }
        if d != 0 || e != 0 {
            write!(f, ".{d}")?;
        }
        if e != 0 {
            write!(f, ".{e}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_packed_version() {
        let v = PackedVersion(0x000D_0201);
        assert_eq!((v.major(), v.minor(), v.patch()), (13, 2, 1));
        assert_eq!(v.to_string(), "13.2.1");
        assert_eq!(PackedVersion(0x0001_0000).to_string(), "1.0");
    }

    #[test]
    fn test_source_version() {
        let v = SourceVersion((1319 << 40) | (2 << 30) | (5 << 20));
        assert_eq!(v.components(), [1319, 2, 5, 0, 0]);
        assert_eq!(v.to_string(), "1319.2.5");
        assert_eq!(SourceVersion(0).to_string(), "0.0");
    }
}
