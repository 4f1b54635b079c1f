// SPDX-License-Identifier: MPL-2.0

// Errno values that the boundary reports as hard errors.

/// Bad address.
pub const EFAULT: i32 = 14;
/// No such device.
pub const ENODEV: i32 = 19;
/// Invalid argument.
pub const EINVAL: i32 = 22;

/// The error type which is returned from the APIs of this crate.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Error {
    /// The page is reserved and the caller did not ask to access reserved pages.
    Reserved,
    /// None of the mapping strategies could map the page.
    MapFailed,
    /// The access does not fit into a single page.
    InvalidRange,
    /// The request is malformed, e.g., it is larger than a page or names an
    /// unknown command.
    InvalidArgs,
    /// The request buffer does not match the direction of the command.
    BadBuffer,
    /// The boundary has been unloaded.
    NoDevice,
}

impl Error {
    /// Returns the status code that reports this error across the boundary.
    ///
    /// Soft failures that a client may want to count keep their own positive
    /// codes. Everything else becomes a negative errno.
    pub fn status(self) -> i32 {
        match self {
            Error::Reserved => crate::PageStatus::Reserved as i32,
            Error::MapFailed => crate::PageStatus::MapFailed as i32,
            Error::InvalidRange | Error::InvalidArgs => -EINVAL,
            Error::BadBuffer => -EFAULT,
            Error::NoDevice => -ENODEV,
        }
    }
}

/// The result type of this crate.
pub type Result<T> = core::result::Result<T, Error>;
