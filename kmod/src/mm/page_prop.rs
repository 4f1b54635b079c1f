// SPDX-License-Identifier: MPL-2.0

//! Cache attributes of temporary page mappings.

/// A type to control the cacheability of a temporary mapping.
///
/// The type follows the memory types defined by the AMD64 manual.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CachePolicy {
    /// Uncacheable (UC).
    ///
    /// Reads from, and writes to, UC memory are not cacheable and cannot be
    /// speculative. This is the policy of kernel I/O mappings, which makes
    /// every access of the copy routines reach the memory controller.
    Uncacheable,
    /// Write-Combining (WC).
    WriteCombining,
    /// Writethrough (WT).
    ///
    /// All writes update main memory, writes that hit in the cache also
    /// update the cache line.
    Writethrough,
    /// Writeback (WB).
    ///
    /// The "normal" memory type used for most data stored in DRAM.
    Writeback,
}

bitflags::bitflags! {
    /// The cache attributes a generic remap is allowed to pick from.
    ///
    /// A remap succeeds with the first attribute in the set that the
    /// platform can grant for the physical range.
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct RemapFlags: u32 {
        /// Writeback.
        const WB  = 1 << 0;
        /// Writethrough.
        const WT  = 1 << 1;
        /// Write-combining.
        const WC  = 1 << 2;
        /// Encrypted mapping, for memory encryption capable machines.
        const ENC = 1 << 3;
        /// Decrypted mapping, for memory encryption capable machines.
        const DEC = 1 << 4;
    }
}

impl RemapFlags {
    /// Returns the cache policy a mapping gets with the given attribute.
    ///
    /// Returns `None` if `self` does not contain exactly one caching
    /// attribute. The encryption attributes do not affect caching and map to
    /// writeback.
    pub fn cache_policy(self) -> Option<CachePolicy> {
        if self == Self::WB || self == Self::ENC || self == Self::DEC {
            Some(CachePolicy::Writeback)
        } else if self == Self::WT {
            Some(CachePolicy::Writethrough)
        } else if self == Self::WC {
            Some(CachePolicy::WriteCombining)
        } else {
            None
        }
    }
}
