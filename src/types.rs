use std::fmt::{self, Display};
use std::path::Path;

use chrono::{NaiveDate, NaiveDateTime};

use crate::error::VrError;
use crate::parser::parse_ifo;
use crate::region::Region;
use crate::text::{self, TextEncoding};

/// Size in bytes of one DVD sector, the granularity of all VOBU addressing.
pub const SECTOR_SIZE: u64 = 2048;

/// The decoded management information of a DVD-VR disc.
///
/// This is the entry point into the crate; see the [crate-level docs] for an
/// overview. Obtain one through [`open`] or [`parse`], then inspect the
/// public fields or use the 1-based [`program`] and [`find_label_set`]
/// accessors.
///
/// [crate-level docs]: ../index.html
/// [`open`]: #method.open
/// [`parse`]: #method.parse
/// [`program`]: #method.program
/// [`find_label_set`]: #method.find_label_set
#[derive(Debug, Clone)]
pub struct VrIfo {
    /// Specification version, printed as `V{major}.{minor}`.
    pub version: (u8, u8),
    /// Character encoding of all label and title text on the disc.
    pub text_encoding: TextEncoding,
    /// First free-text disc label field, raw bytes in the disc encoding.
    pub disc_label1: Vec<u8>,
    /// Second free-text disc label field.
    pub disc_label2: Vec<u8>,
    /// The distinct video/audio profiles used by recordings on this disc.
    pub vob_formats: Vec<VobFormat>,
    /// The recorded programs, in table order.
    pub programs: Vec<Program>,
    /// Label sets covering the programs; may be empty.
    pub label_sets: Vec<LabelSet>,
}

impl VrIfo {
    /// Opens and decodes a `VR_MANGR.IFO` file.
    ///
    /// # Examples
    /// ```no_run
    /// use dvdvr::VrIfo;
    ///
    /// let ifo = VrIfo::open("VR_MANGR.IFO".as_ref()).expect("failed to parse IFO file.");
    /// println!("{} programs", ifo.program_count());
    /// ```
    pub fn open(path: &Path) -> Result<VrIfo, VrError> {
        let region = Region::open(path)?;
        parse_ifo(region.bytes())
    }

    /// Decodes an IFO management region already held in memory.
    ///
    /// The buffer must contain at least the full region the manifest header
    /// declares; trailing bytes beyond it are ignored.
    pub fn parse(bytes: &[u8]) -> Result<VrIfo, VrError> {
        parse_ifo(bytes)
    }

    pub fn program_count(&self) -> usize {
        self.programs.len()
    }

    /// Looks up a program by its 1-based number.
    pub fn program(&self, number: usize) -> Result<&Program, VrError> {
        number
            .checked_sub(1)
            .and_then(|i| self.programs.get(i))
            .ok_or(VrError::ProgramOutOfRange {
                requested: number,
                count: self.programs.len(),
            })
    }

    /// Finds the label set covering the given 1-based program number.
    ///
    /// Returns `None` when the disc carries no label for it; that is normal
    /// on discs without any text data.
    pub fn find_label_set(&self, number: usize) -> Option<&LabelSet> {
        text::find_label_set(&self.label_sets, number)
    }

    /// The first disc label, converted to text; `None` when blank.
    pub fn disc_label1(&self) -> Option<String> {
        self.text_encoding.decode(&self.disc_label1)
    }

    /// The second disc label, converted to text; `None` when blank.
    pub fn disc_label2(&self) -> Option<String> {
        self.text_encoding.decode(&self.disc_label2)
    }
}

/// One distinct video/audio profile used on the disc.
///
/// Programs reference these by their 1-based position through
/// [`Program::format_id`].
#[derive(Debug, Clone)]
pub struct VobFormat {
    pub video: VideoAttr,
    /// Number of audio streams recordings with this format carry.
    pub audio_streams: u8,
    pub audio0: AudioAttr,
    pub audio1: AudioAttr,
}

/// One recorded program (title).
#[derive(Debug, Clone)]
pub struct Program {
    /// When the recording was made; `None` when the disc stores no time.
    pub timestamp: Option<NaiveDateTime>,
    /// 1-based reference into [`VrIfo::vob_formats`].
    pub format_id: u8,
    pub vobu_map: VobuMap,
}

impl Program {
    /// Total size of the program data in the VRO file, from the metadata.
    pub fn size_bytes(&self) -> u64 {
        self.vobu_map.size_bytes()
    }
}

/// The ordered list of addressable units making up one program.
///
/// Each entry is a unit length in sectors. Read in order starting at
/// [`start_offset`], the units describe exactly the byte ranges of the VRO
/// file belonging to the program; ranges deleted by in-place edits are
/// simply absent from the list.
///
/// [`start_offset`]: #method.start_offset
#[derive(Debug, Clone)]
pub struct VobuMap {
    /// Sector number in the VRO file where the first unit begins.
    pub start_sector: u32,
    /// Time offset of the first unit; units unknown, kept as stored.
    pub time_offset: u16,
    /// Unit lengths in sectors, at most 1023 each.
    pub vobu_sizes: Vec<u16>,
}

impl VobuMap {
    /// Byte offset into the VRO file of the program's first unit.
    pub fn start_offset(&self) -> u64 {
        u64::from(self.start_sector) * SECTOR_SIZE
    }

    pub fn size_bytes(&self) -> u64 {
        self.vobu_sizes
            .iter()
            .map(|&s| u64::from(s) * SECTOR_SIZE)
            .sum()
    }
}

/// A label/title pair covering a consecutive range of programs.
#[derive(Debug, Clone)]
pub struct LabelSet {
    /// Number of programs this set covers.
    pub programs: u16,
    pub set_id: u16,
    /// 1-based number of the first covered program, or `None` when the disc
    /// stores a sentinel and the start must be derived from the accumulated
    /// counts of the preceding sets.
    pub first_program: Option<u16>,
    pub(crate) label: Vec<u8>,
    pub(crate) title: Vec<u8>,
}

impl LabelSet {
    pub fn label(&self, encoding: TextEncoding) -> Option<String> {
        encoding.decode(&self.label)
    }

    pub fn title(&self, encoding: TextEncoding) -> Option<String> {
        encoding.decode(&self.title)
    }

    /// The title, unless it repeats the label byte for byte.
    pub fn title_if_distinct(&self, encoding: TextEncoding) -> Option<String> {
        if self.title == self.label {
            None
        } else {
            self.title(encoding)
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum TvSystem {
    Ntsc,
    Pal,
    Unknown(u8),
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum AspectRatio {
    /// 4:3
    Standard,
    /// 16:9
    Widescreen,
    Unknown(u8),
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Compression {
    Mpeg1,
    Mpeg2,
    Unknown(u8),
}

/// Decoded video attributes of a [`VobFormat`].
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct VideoAttr {
    /// Width and height in pixels; `None` when either the resolution class
    /// or the TV system code is unrecognized.
    pub resolution: Option<(u16, u16)>,
    pub aspect: AspectRatio,
    pub tv_system: TvSystem,
    pub compression: Compression,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum AudioCoding {
    Ac3,
    Mpeg1,
    Mpeg2Ext,
    LinearPcm,
    Unknown(u8),
}

/// Decoded attributes of one audio stream.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct AudioAttr {
    pub channels: u8,
    pub coding: AudioCoding,
}

/// Decodes the packed 16-bit video attribute field.
///
/// Unrecognized codes decode to the `Unknown` variants rather than failing;
/// several camcorder vendors use values beyond the documented ones.
pub fn decode_video(attr: u16) -> VideoAttr {
    let resolution = ((attr & 0x0038) >> 3) as u8;
    let aspect = ((attr & 0x0C00) >> 10) as u8;
    let tv_sys = ((attr & 0x3000) >> 12) as u8;
    let compression = ((attr & 0xC000) >> 14) as u8;

    let tv_system = match tv_sys {
        0 => TvSystem::Ntsc,
        1 => TvSystem::Pal,
        n => TvSystem::Unknown(n),
    };
    let vertical = match tv_system {
        TvSystem::Ntsc => Some(480u16),
        TvSystem::Pal => Some(576),
        TvSystem::Unknown(_) => None,
    };
    let resolution = vertical.and_then(|v| match resolution {
        0 => Some((720, v)),
        1 => Some((704, v)),
        2 => Some((352, v)),
        3 => Some((352, v / 2)),
        _ => None,
    });

    VideoAttr {
        resolution,
        aspect: match aspect {
            0 => AspectRatio::Standard,
            1 => AspectRatio::Widescreen,
            n => AspectRatio::Unknown(n),
        },
        tv_system,
        compression: match compression {
            0 => Compression::Mpeg1,
            1 => Compression::Mpeg2,
            n => Compression::Unknown(n),
        },
    }
}

/// Decodes a 3-byte audio attribute field.
pub fn decode_audio(attr: [u8; 3]) -> AudioAttr {
    let coding = (attr[0] & 0xE0) >> 5;
    let raw_channels = attr[1] & 0x0F;
    // Stored as count minus one. 9 is seen on some camcorders and means
    // 2 channels, not 10.
    let channels = if raw_channels == 9 { 2 } else { raw_channels + 1 };

    AudioAttr {
        channels,
        coding: match coding {
            0 => AudioCoding::Ac3,
            2 => AudioCoding::Mpeg1,
            3 => AudioCoding::Mpeg2Ext,
            4 => AudioCoding::LinearPcm,
            n => AudioCoding::Unknown(n),
        },
    }
}

/// Decodes the packed 5-byte recording timestamp.
///
/// A zero year marks an absent timestamp and yields `None`, as does any
/// packing that is not a valid calendar date.
pub fn decode_timestamp(pgtm: [u8; 5]) -> Option<NaiveDateTime> {
    let year = (u16::from(pgtm[0]) << 8 | u16::from(pgtm[1])) >> 2;
    if year == 0 {
        return None;
    }
    let month = (pgtm[1] & 0x03) << 2 | pgtm[2] >> 6;
    let day = (pgtm[2] & 0x3E) >> 1;
    let hour = (pgtm[2] & 0x01) << 4 | pgtm[3] >> 4;
    let min = (pgtm[3] & 0x0F) << 2 | pgtm[4] >> 6;
    let sec = pgtm[4] & 0x3F;

    NaiveDate::from_ymd_opt(i32::from(year), u32::from(month), u32::from(day))?
        .and_hms_opt(u32::from(hour), u32::from(min), u32::from(sec))
}

impl Display for TvSystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TvSystem::Ntsc => write!(f, "NTSC"),
            TvSystem::Pal => write!(f, "PAL"),
            TvSystem::Unknown(n) => write!(f, "unknown (code {}, please report)", n),
        }
    }
}

impl Display for AspectRatio {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AspectRatio::Standard => write!(f, "4:3"),
            AspectRatio::Widescreen => write!(f, "16:9"),
            AspectRatio::Unknown(n) => write!(f, "unknown (code {}, please report)", n),
        }
    }
}

impl Display for Compression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Compression::Mpeg1 => write!(f, "MPEG1"),
            Compression::Mpeg2 => write!(f, "MPEG2"),
            Compression::Unknown(n) => write!(f, "unknown (code {}, please report)", n),
        }
    }
}

impl Display for AudioCoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AudioCoding::Ac3 => write!(f, "Dolby AC-3"),
            AudioCoding::Mpeg1 => write!(f, "MPEG-1"),
            AudioCoding::Mpeg2Ext => write!(f, "MPEG-2ext"),
            AudioCoding::LinearPcm => write!(f, "Linear PCM"),
            AudioCoding::Unknown(n) => write!(f, "unknown (code {}, please report)", n),
        }
    }
}
