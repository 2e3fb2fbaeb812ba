//! Streams program data out of the bulk VRO file.
//!
//! The engine copies the byte ranges a program's VOBU map describes, in map
//! order, to a destination sink. It deliberately tells the OS to drop its
//! own footprint from the page cache as it goes, so ripping a whole disc
//! does not evict cached data the user cares about. Cache advice is best
//! effort and never affects correctness.

use std::fs::{File, FileTimes, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use tracing::warn;

use crate::error::VrError;
use crate::types::{Program, SECTOR_SIZE};

/// Best-effort page cache advice for an extraction source or destination.
///
/// The default methods are no-ops, which is the correct behavior on
/// platforms without an advisory facility.
pub trait Advise {
    /// Hints that the file will be read sequentially.
    fn advise_sequential(&self) {}
    /// Hints that the given byte range will not be needed again.
    /// A zero `len` means the whole file.
    fn advise_dont_need(&self, _offset: u64, _len: u64) {}
}

#[cfg(target_os = "linux")]
impl Advise for File {
    fn advise_sequential(&self) {
        use std::os::unix::io::AsRawFd;
        // failure is ignored, this is only a hint
        unsafe {
            libc::posix_fadvise(self.as_raw_fd(), 0, 0, libc::POSIX_FADV_SEQUENTIAL);
        }
    }

    fn advise_dont_need(&self, offset: u64, len: u64) {
        use std::os::unix::io::AsRawFd;
        unsafe {
            libc::posix_fadvise(
                self.as_raw_fd(),
                offset as libc::off_t,
                len as libc::off_t,
                libc::POSIX_FADV_DONTNEED,
            );
        }
    }
}

#[cfg(not(target_os = "linux"))]
impl Advise for File {}

impl<T> Advise for io::Cursor<T> {}

/// What happened while extracting one program.
#[derive(Debug, Default, Copy, Clone)]
pub struct ExtractStats {
    /// Bytes actually copied to the destination.
    pub bytes_written: u64,
    /// Number of VOBUs processed.
    pub vobus: usize,
    /// VOBUs that could not be read completely and were skipped over.
    pub error_vobus: usize,
}

enum VobuError {
    /// The source came up short; `copied` bytes of the unit were written.
    Source { copied: u64 },
    /// The destination refused data. Nothing can be salvaged.
    Sink(io::Error),
}

/// Copies programs out of an open VRO file (or any seekable source).
pub struct Extractor<R> {
    vro: R,
}

impl<R: Read + Seek + Advise> Extractor<R> {
    pub fn new(vro: R) -> Extractor<R> {
        vro.advise_sequential();
        Extractor { vro }
    }

    /// Streams one program's data into `sink`, unit by unit in map order.
    ///
    /// A unit whose source range cannot be read in full is skipped over so
    /// the next unit still starts at its correct source offset; such units
    /// are counted in the stats rather than failing the extraction. A sink
    /// write failure is fatal.
    ///
    /// `progress` is called after each unit with (units done, units total).
    pub fn extract_to<W, F>(
        &mut self,
        program: &Program,
        sink: &mut W,
        mut progress: F,
    ) -> Result<ExtractStats, VrError>
    where
        W: Write,
        F: FnMut(usize, usize),
    {
        let map = &program.vobu_map;
        let total = map.vobu_sizes.len();
        let mut pos = map.start_offset();
        self.vro.seek(SeekFrom::Start(pos))?;

        let mut stats = ExtractStats {
            vobus: total,
            ..ExtractStats::default()
        };
        for (done, &sectors) in map.vobu_sizes.iter().enumerate() {
            let want = u64::from(sectors) * SECTOR_SIZE;
            match self.stream_vobu(sink, want) {
                Ok(()) => stats.bytes_written += want,
                Err(VobuError::Sink(e)) => return Err(e.into()),
                Err(VobuError::Source { copied }) => {
                    warn!(
                        "unreadable VOBU at offset {}, skipping {} bytes",
                        pos,
                        want - copied
                    );
                    stats.bytes_written += copied;
                    stats.error_vobus += 1;
                    // realign so the next unit reads from its own range
                    self.vro.seek(SeekFrom::Start(pos + want))?;
                }
            }
            self.vro.advise_dont_need(pos, want);
            pos += want;
            progress(done + 1, total);
        }

        Ok(stats)
    }

    /// Extracts one program to a new file at `path`, or a near variant of it
    /// when the name is taken.
    ///
    /// An existing file is never overwritten: `_2` through `_9` are tried as
    /// stem suffixes before giving up with [`VrError::OutputExists`]. On
    /// success the file's access and modification times are set to `touch`
    /// (the recording timestamp, or a caller-chosen fallback) and the file's
    /// cache footprint is dropped. Returns the path actually written.
    pub fn extract_to_file<F>(
        &mut self,
        program: &Program,
        path: &Path,
        touch: SystemTime,
        progress: F,
    ) -> Result<(PathBuf, ExtractStats), VrError>
    where
        F: FnMut(usize, usize),
    {
        let (path, mut file) = create_new(path)?;
        let stats = self.extract_to(program, &mut file, progress)?;
        file.flush()?;

        let times = FileTimes::new().set_accessed(touch).set_modified(touch);
        if let Err(e) = file.set_times(times) {
            warn!("cannot set timestamps on {}: {e}", path.display());
        }
        file.advise_dont_need(0, 0);

        Ok((path, stats))
    }

    fn stream_vobu<W: Write>(&mut self, sink: &mut W, want: u64) -> Result<(), VobuError> {
        let mut buf = [0u8; SECTOR_SIZE as usize];
        let mut copied = 0u64;
        while copied < want {
            let chunk = (want - copied).min(SECTOR_SIZE) as usize;
            let got = match read_some(&mut self.vro, &mut buf[..chunk]) {
                Ok(n) => n,
                Err(e) => {
                    warn!("error reading from VRO: {e}");
                    return Err(VobuError::Source { copied });
                }
            };
            if got > 0 {
                sink.write_all(&buf[..got]).map_err(VobuError::Sink)?;
                copied += got as u64;
            }
            if got < chunk {
                return Err(VobuError::Source { copied });
            }
        }
        Ok(())
    }
}

/// Reads until `buf` is full or EOF.
fn read_some<R: Read>(src: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut total = 0;
    while total < buf.len() {
        match src.read(&mut buf[total..])? {
            0 => break,
            n => total += n,
        }
    }
    Ok(total)
}

/// Opens a fresh output file, disambiguating name collisions.
fn create_new(path: &Path) -> Result<(PathBuf, File), VrError> {
    for attempt in 0..9 {
        let candidate = if attempt == 0 {
            path.to_path_buf()
        } else {
            suffixed(path, attempt + 1)
        };
        match OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&candidate)
        {
            Ok(file) => return Ok((candidate, file)),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => continue,
            Err(e) => {
                return Err(VrError::OutputCreate {
                    path: candidate,
                    source: e,
                })
            }
        }
    }
    Err(VrError::OutputExists(path.to_path_buf()))
}

/// `video.vob` -> `video_2.vob`
fn suffixed(path: &Path, n: u32) -> PathBuf {
    let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or("program");
    let mut name = format!("{stem}_{n}");
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        name.push('.');
        name.push_str(ext);
    }
    path.with_file_name(name)
}
