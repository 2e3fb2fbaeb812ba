use std::fmt::{self, Display};

use encoding_rs::{Encoding, BIG5, EUC_KR, GBK, SHIFT_JIS, WINDOWS_1252};
use tracing::warn;

use crate::types::LabelSet;

/// The character encoding the disc declares for all its text fields.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum TextEncoding {
    Latin1,
    ShiftJis,
    EucKr,
    Gbk,
    Big5,
    /// An undocumented selector; text is decoded as Latin-1.
    Unknown(u8),
}

impl TextEncoding {
    pub(crate) fn from_selector(code: u8) -> TextEncoding {
        match code {
            0 => TextEncoding::Latin1,
            1 => TextEncoding::ShiftJis,
            2 => TextEncoding::EucKr,
            3 => TextEncoding::Gbk,
            4 => TextEncoding::Big5,
            n => {
                warn!("unknown text encoding selector {n}, assuming Latin-1");
                TextEncoding::Unknown(n)
            }
        }
    }

    fn encoding(self) -> &'static Encoding {
        match self {
            TextEncoding::Latin1 | TextEncoding::Unknown(_) => WINDOWS_1252,
            TextEncoding::ShiftJis => SHIFT_JIS,
            TextEncoding::EucKr => EUC_KR,
            TextEncoding::Gbk => GBK,
            TextEncoding::Big5 => BIG5,
        }
    }

    /// Converts a fixed-width text field to a string.
    ///
    /// Trailing NUL padding is stripped first; a field that is then empty or
    /// a lone space carries no text and yields `None`.
    pub fn decode(self, raw: &[u8]) -> Option<String> {
        let end = raw
            .iter()
            .rposition(|&b| b != 0)
            .map(|i| i + 1)
            .unwrap_or(0);
        let trimmed = &raw[..end];
        if trimmed.is_empty() || trimmed == b" " {
            return None;
        }
        let (text, _, _) = self.encoding().decode(trimmed);
        Some(text.into_owned())
    }
}

impl Display for TextEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TextEncoding::Latin1 => write!(f, "ISO-8859-1"),
            TextEncoding::ShiftJis => write!(f, "Shift_JIS"),
            TextEncoding::EucKr => write!(f, "EUC-KR"),
            TextEncoding::Gbk => write!(f, "GBK"),
            TextEncoding::Big5 => write!(f, "Big5"),
            TextEncoding::Unknown(n) => write!(f, "unknown (code {}, assuming Latin-1)", n),
        }
    }
}

/// Finds the label set covering a 1-based program number.
///
/// Sets whose stored first-program id is present are matched against it
/// directly. Sets storing the sentinel get their start derived positionally:
/// one past the programs accounted for by earlier positional sets, in table
/// order. Returns `None` when no set covers the program, which is normal on
/// discs without label data.
pub fn find_label_set(sets: &[LabelSet], program: usize) -> Option<&LabelSet> {
    let mut counted = 0usize;
    for set in sets {
        let start = match set.first_program {
            Some(first) => usize::from(first),
            None => {
                let start = counted + 1;
                counted += usize::from(set.programs);
                start
            }
        };
        if start > 0 && program >= start && program < start + usize::from(set.programs) {
            return Some(set);
        }
    }
    None
}
