// SPDX-License-Identifier: MPL-2.0

use readalias_kmod::Paddr;

/// Why a page could not be accessed.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum AccessFailure {
    /// The page is reserved and reserved access was not requested.
    Reserved,
    /// The helper could not map the page.
    MapFailed,
}

/// The error type which is returned from the APIs of this crate.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Error {
    /// The channel to the helper is closed or the helper has been unloaded.
    BoundaryUnavailable,
    /// A page could not be accessed and the configuration asked to stop on
    /// such failures.
    AccessFailed {
        /// The first address of the failed request.
        pa: Paddr,
        /// What went wrong.
        cause: AccessFailure,
    },
    /// The helper rejected a request with the given status.
    Rejected(i32),
}

/// The result type of this crate.
pub type Result<T> = core::result::Result<T, Error>;
