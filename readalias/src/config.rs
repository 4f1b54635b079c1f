// SPDX-License-Identifier: MPL-2.0

//! Options of physical memory operations.

use readalias_kmod::FlushMethod;

/// Counters of pages that could not be accessed.
///
/// The counters only grow. They are owned by the caller and never reset by
/// this crate.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PageStats {
    /// Pages that were refused because they are reserved.
    pub reserved_pages: usize,
    /// Pages that the helper could not map.
    pub map_failures: usize,
}

/// Options of the operations of [`PhysMem`](crate::PhysMem).
///
/// One configuration is passed to every request of a logical operation,
/// which also makes it the place where failures are counted.
#[derive(Clone, Debug, Default)]
pub struct CopyConfig {
    pub(crate) flush_method: FlushMethod,
    pub(crate) err_on_access_fail: bool,
    pub(crate) access_reserved: bool,
    pub(crate) stats: PageStats,
}

impl CopyConfig {
    /// Creates a configuration that does not flush, skips pages that cannot
    /// be accessed, and refuses reserved pages.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets how pages are flushed around each access.
    ///
    /// The default value is [`FlushMethod::None`].
    pub fn flush_method(&mut self, flush_method: FlushMethod) -> &mut Self {
        self.flush_method = flush_method;
        self
    }

    /// Sets whether an operation stops at the first page that cannot be
    /// accessed.
    ///
    /// If `false`, such pages are counted in [`PageStats`] and skipped. The
    /// default value is `false`.
    pub fn err_on_access_fail(&mut self, err_on_access_fail: bool) -> &mut Self {
        self.err_on_access_fail = err_on_access_fail;
        self
    }

    /// Sets whether reserved pages may be accessed.
    ///
    /// Writing to reserved pages can crash the machine. The default value is
    /// `false`.
    pub fn access_reserved(&mut self, access_reserved: bool) -> &mut Self {
        self.access_reserved = access_reserved;
        self
    }

    /// Returns the failure counters accumulated so far.
    pub fn stats(&self) -> PageStats {
        self.stats
    }
}
