// SPDX-License-Identifier: MPL-2.0

//! Hex dumps for logging raw memory contents.

use core::fmt::{self, Display, Formatter, Write};

/// Formats a byte slice as a canonical hex dump.
///
/// Each line shows the offset, sixteen bytes in hex and the same bytes as
/// ASCII, with non-printable bytes replaced by `.`:
///
/// ```text
/// 0000  68 65 6c 6c 6f 00 00 00 00 00 00 00 00 00 00 00  |hello...........|
/// ```
pub struct HexDump<'a>(pub &'a [u8]);

const BYTES_PER_LINE: usize = 16;

impl Display for HexDump<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        for (i, line) in self.0.chunks(BYTES_PER_LINE).enumerate() {
            if i > 0 {
                f.write_char('\n')?;
            }
            write!(f, "{:04x} ", i * BYTES_PER_LINE)?;
            for byte in line {
                write!(f, " {:02x}", byte)?;
            }
            for _ in line.len()..BYTES_PER_LINE {
                f.write_str("   ")?;
            }

            f.write_str("  |")?;
            for &byte in line {
                let c = if byte.is_ascii_graphic() || byte == b' ' {
                    byte as char
                } else {
                    '.'
                };
                f.write_char(c)?;
            }
            f.write_char('|')?;
        }
        Ok(())
    }
}
