use serde::{Deserialize, Serialize};

/// Per-channel and per-query option flags (spec.md §6).
///
/// Modeled as a plain bitflags-style newtype rather than pulling in the
/// `bitflags` crate — the set is small and fixed, and the teacher's own
/// `DnsConfig` favors plain fields over macro-generated wrappers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Flags(u32);

impl Flags {
    pub const EDNS: Flags = Flags(1 << 0);
    pub const NOCHECKRESP: Flags = Flags(1 << 1);
    pub const NOROTATE: Flags = Flags(1 << 2);
    pub const NOSEARCH: Flags = Flags(1 << 3);
    pub const STAYOPEN: Flags = Flags(1 << 4);
    pub const NOALIASES: Flags = Flags(1 << 5);
    pub const PRIMARY: Flags = Flags(1 << 6);
    pub const USEVC: Flags = Flags(1 << 7);
    pub const IGNTC: Flags = Flags(1 << 8);
    pub const DNS0X20: Flags = Flags(1 << 9);
    pub const COOKIE: Flags = Flags(1 << 10);

    pub const fn empty() -> Self {
        Flags(0)
    }

    pub const fn contains(self, other: Flags) -> bool {
        (self.0 & other.0) == other.0
    }

    pub fn insert(&mut self, other: Flags) {
        self.0 |= other.0;
    }

    pub fn remove(&mut self, other: Flags) {
        self.0 &= !other.0;
    }

    pub const fn union(self, other: Flags) -> Flags {
        Flags(self.0 | other.0)
    }
}

impl std::ops::BitOr for Flags {
    type Output = Flags;
    fn bitor(self, rhs: Flags) -> Flags {
        self.union(rhs)
    }
}
