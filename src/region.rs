use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

use crate::error::VrError;

/// The 12-byte identifier at the start of every DVD-VR IFO file.
pub(crate) const IFO_ID: &[u8; 12] = b"DVD_RTR_VMG0";

/// Size of the fixed manifest header at the start of the IFO.
pub(crate) const MANIFEST_LEN: usize = 512;

/// The IFO management region, read into an owned buffer.
///
/// Opening is a two-pass affair: the fixed manifest header is read first to
/// learn the declared length of the whole region (the end address field plus
/// one), then exactly that many bytes are read. A file shorter than its own
/// declaration yields [`VrError::Truncated`] instead of a partial buffer.
pub(crate) struct Region {
    data: Vec<u8>,
}

impl Region {
    pub(crate) fn open(path: &Path) -> Result<Region, VrError> {
        let mut file = File::open(path)?;

        let mut header = vec![0u8; MANIFEST_LEN];
        let got = read_fully(&mut file, &mut header)?;
        if got < MANIFEST_LEN {
            return Err(VrError::Truncated {
                declared: MANIFEST_LEN,
                actual: got,
            });
        }
        if &header[..IFO_ID.len()] != IFO_ID {
            return Err(VrError::InvalidId);
        }

        // vmg_ea holds the address of the region's last byte.
        let declared = u32::from_be_bytes(header[12..16].try_into().unwrap()) as usize + 1;
        if declared < MANIFEST_LEN {
            return Err(VrError::malformed("declared region length", 12));
        }

        let mut data = header;
        data.resize(declared, 0);
        let got = read_fully(&mut file, &mut data[MANIFEST_LEN..])?;
        if MANIFEST_LEN + got < declared {
            return Err(VrError::Truncated {
                declared,
                actual: MANIFEST_LEN + got,
            });
        }

        Ok(Region { data })
    }

    pub(crate) fn bytes(&self) -> &[u8] {
        &self.data
    }
}

/// Reads until `buf` is full or EOF, returning the number of bytes read.
fn read_fully(file: &mut File, buf: &mut [u8]) -> io::Result<usize> {
    let mut total = 0;
    while total < buf.len() {
        match file.read(&mut buf[total..])? {
            0 => break,
            n => total += n,
        }
    }
    Ok(total)
}
