use nom::{
    bytes::complete::{tag, take},
    combinator::{cond, map},
    multi::count,
    number::complete::{be_u16, be_u32, be_u8},
    IResult,
};
use tracing::warn;

use crate::error::VrError;
use crate::region::{IFO_ID, MANIFEST_LEN};
use crate::text::TextEncoding;
use crate::types::{
    decode_audio, decode_timestamp, decode_video, LabelSet, Program, VobFormat, VobuMap, VrIfo,
};

/// The fields of the fixed manifest header this crate consumes. Everything
/// else in the header is reserved or not yet understood and left alone.
struct Manifest {
    version: u16,
    text_encoding: u8,
    disc_label1: Vec<u8>,
    disc_label2: Vec<u8>,
    /// Start address of the program info table, relative to manifest start.
    pgit_sa: u32,
    /// Start address of the default program label set table; 0 when absent.
    psi_sa: u32,
}

fn manifest(input: &[u8]) -> IResult<&[u8], Manifest> {
    let (input, _) = tag(&IFO_ID[..])(input)?;
    let (input, _vmg_ea) = be_u32(input)?;
    let (input, _) = take(12usize)(input)?; // reserved
    let (input, _vmgi_ea) = be_u32(input)?;
    let (input, version) = be_u16(input)?;
    let (input, _) = take(30usize)(input)?; // reserved
    let (input, text_encoding) = be_u8(input)?;
    let (input, _) = take(1usize)(input)?;
    let (input, disc_label1) = take(16usize)(input)?;
    let (input, disc_label2) = take(16usize)(input)?;
    let (input, _) = take(158usize)(input)?; // reserved
    let (input, pgit_sa) = be_u32(input)?;
    let (input, _info2_sa) = be_u32(input)?;
    let (input, _) = take(40usize)(input)?; // reserved
    let (input, psi_sa) = be_u32(input)?;
    Ok((
        input,
        Manifest {
            version,
            text_encoding,
            disc_label1: disc_label1.to_vec(),
            disc_label2: disc_label2.to_vec(),
            pgit_sa,
            psi_sa,
        },
    ))
}

/// Header of the program info table: table count, format count, end address.
fn pgiti(input: &[u8]) -> IResult<&[u8], (u8, u8, u32)> {
    let (input, _) = take(2usize)(input)?;
    let (input, nr_of_pgi) = be_u8(input)?;
    let (input, nr_of_vob_formats) = be_u8(input)?;
    let (input, pgit_ea) = be_u32(input)?;
    Ok((input, (nr_of_pgi, nr_of_vob_formats, pgit_ea)))
}

fn vob_format(input: &[u8]) -> IResult<&[u8], VobFormat> {
    let (input, video_attr) = be_u16(input)?;
    let (input, audio_streams) = be_u8(input)?;
    let (input, _) = take(1usize)(input)?;
    let (input, audio0) = take(3usize)(input)?;
    let (input, audio1) = take(3usize)(input)?;
    let (input, _) = take(50usize)(input)?; // reserved
    Ok((
        input,
        VobFormat {
            video: decode_video(video_attr),
            audio_streams,
            audio0: decode_audio(audio0.try_into().unwrap()),
            audio1: decode_audio(audio1.try_into().unwrap()),
        },
    ))
}

/// 3-byte VOBU info record. The middle two bytes hold the unit length in
/// sectors in their low 10 bits; the remaining bits are flags this crate
/// does not decode.
fn vobu_size(input: &[u8]) -> IResult<&[u8], u16> {
    map(take(3usize), |b: &[u8]| {
        u16::from_be_bytes([b[1], b[2]]) & 0x03FF
    })(input)
}

fn vobu_map(input: &[u8]) -> IResult<&[u8], VobuMap> {
    let (input, nr_of_time_info) = be_u16(input)?;
    let (input, nr_of_vobu_info) = be_u16(input)?;
    let (input, time_offset) = be_u16(input)?;
    let (input, start_sector) = be_u32(input)?;
    // time info records are opaque, 7 bytes each
    let (input, _) = take(7 * nr_of_time_info as usize)(input)?;
    let (input, vobu_sizes) = count(vobu_size, nr_of_vobu_info as usize)(input)?;
    Ok((
        input,
        VobuMap {
            start_sector,
            time_offset,
            vobu_sizes,
        },
    ))
}

fn program(input: &[u8]) -> IResult<&[u8], Program> {
    let (input, vob_attr) = be_u16(input)?;
    let (input, pgtm) = take(5usize)(input)?;
    let (input, _) = take(1usize)(input)?;
    let (input, format_id) = be_u8(input)?;
    let (input, _v_s_ptm) = take(6usize)(input)?; // presentation times, opaque
    let (input, _v_e_ptm) = take(6usize)(input)?;
    // adjacent-VOB sub-record, present when attr bit 0x80 is set
    let (input, _) = cond(vob_attr & 0x80 != 0, take(12usize))(input)?;
    let (input, _) = take(2usize)(input)?;
    let (input, vobu_map) = vobu_map(input)?;
    Ok((
        input,
        Program {
            timestamp: decode_timestamp(pgtm.try_into().unwrap()),
            format_id,
            vobu_map,
        },
    ))
}

fn label_set(input: &[u8]) -> IResult<&[u8], LabelSet> {
    let (input, programs) = be_u16(input)?;
    let (input, set_id) = be_u16(input)?;
    let (input, first_program) = be_u16(input)?;
    let (input, _) = take(2usize)(input)?;
    let (input, label) = take(64usize)(input)?;
    let (input, title) = take(64usize)(input)?;
    Ok((
        input,
        LabelSet {
            programs,
            set_id,
            // 0 and all-ones both mean "not stored, derive positionally"
            first_program: match first_program {
                0 | 0xFFFF => None,
                n => Some(n),
            },
            label: label.to_vec(),
            title: title.to_vec(),
        },
    ))
}

fn label_sets(input: &[u8]) -> IResult<&[u8], Vec<LabelSet>> {
    let (input, nr_of_sets) = be_u16(input)?;
    let (input, _total_programs) = be_u16(input)?;
    count(label_set, nr_of_sets as usize)(input)
}

/// Runs a record parser over a slice, turning any parse failure into a
/// malformed-metadata error at the record's offset.
fn complete<T>(res: IResult<&[u8], T>, what: &'static str, offset: usize) -> Result<T, VrError> {
    res.map(|(_, v)| v)
        .map_err(|_| VrError::malformed(what, offset))
}

/// Bounds-checked access to the region starting at `offset`.
fn at<'a>(data: &'a [u8], offset: usize, what: &'static str) -> Result<&'a [u8], VrError> {
    data.get(offset..)
        .ok_or(VrError::malformed(what, offset))
}

/// Decodes a full IFO management region into the typed model.
///
/// Decoding is eager: every table and program entry is resolved up front,
/// and every offset dereference is bounds checked against the region.
pub(crate) fn parse_ifo(data: &[u8]) -> Result<VrIfo, VrError> {
    if data.len() < MANIFEST_LEN {
        return Err(VrError::Truncated {
            declared: MANIFEST_LEN,
            actual: data.len(),
        });
    }
    if &data[..IFO_ID.len()] != IFO_ID {
        return Err(VrError::InvalidId);
    }
    let declared = u32::from_be_bytes(data[12..16].try_into().unwrap()) as usize + 1;
    if data.len() < declared {
        return Err(VrError::Truncated {
            declared,
            actual: data.len(),
        });
    }
    let data = &data[..declared];

    let mat = complete(manifest(data), "manifest header", 0)?;

    let pgit_base = mat.pgit_sa as usize;
    let table = at(data, pgit_base, "program info table offset")?;
    let (rest, (nr_of_pgi, nr_of_vob_formats, _pgit_ea)) =
        pgiti(table).map_err(|_| VrError::malformed("program info table header", pgit_base))?;

    if nr_of_pgi == 0 {
        return Err(VrError::NoProgramTables);
    }
    if nr_of_pgi > 1 {
        warn!("only processing 1 of the {nr_of_pgi} program info tables");
    }

    let (rest, vob_formats) = count(vob_format, nr_of_vob_formats as usize)(rest)
        .map_err(|_| VrError::malformed("vob format descriptors", pgit_base))?;

    let (rest, nr_of_programs) =
        be_u16::<_, nom::error::Error<&[u8]>>(rest)
            .map_err(|_| VrError::malformed("program count", pgit_base))?;
    let (_, offsets) = count(be_u32::<_, nom::error::Error<&[u8]>>, nr_of_programs as usize)(rest)
        .map_err(|_| VrError::malformed("program offset table", pgit_base))?;

    let mut programs = Vec::with_capacity(offsets.len());
    for sa in offsets {
        // program entry offsets are relative to the program info table
        let offset = pgit_base
            .checked_add(sa as usize)
            .ok_or(VrError::malformed("program entry offset", pgit_base))?;
        let entry = at(data, offset, "program entry offset")?;
        programs.push(complete(program(entry), "program entry", offset)?);
    }

    let label_sets = if mat.psi_sa != 0 {
        let offset = mat.psi_sa as usize;
        let table = at(data, offset, "label set table offset")?;
        complete(label_sets(table), "label set table", offset)?
    } else {
        Vec::new()
    };

    Ok(VrIfo {
        version: ((mat.version & 0x00F0) as u8 >> 4, (mat.version & 0x000F) as u8),
        text_encoding: TextEncoding::from_selector(mat.text_encoding),
        disc_label1: mat.disc_label1,
        disc_label2: mat.disc_label2,
        vob_formats,
        programs,
        label_sets,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manifest_id() {
        let mut data = vec![0u8; 512];
        data[..12].copy_from_slice(b"DVD_RTR_VMG0");
        assert!(manifest(&data).is_ok());

        data[0] = b'X';
        assert!(manifest(&data).is_err());
    }

    #[test]
    fn vobu_size_mask() {
        // flag bits above the low 10 must be masked off
        let data = [0xFF, 0xFE, 0x03];
        let (rest, size) = vobu_size(&data).unwrap();
        assert!(rest.is_empty());
        assert_eq!(size, 0x0203);

        let data = [0x00, 0x03, 0xFF];
        assert_eq!(vobu_size(&data).unwrap().1, 1023);
    }

    #[test]
    fn vobu_map_skips_time_info() {
        let mut data = Vec::new();
        data.extend_from_slice(&1u16.to_be_bytes()); // one time info
        data.extend_from_slice(&2u16.to_be_bytes()); // two vobus
        data.extend_from_slice(&0u16.to_be_bytes());
        data.extend_from_slice(&7u32.to_be_bytes()); // start sector
        data.extend_from_slice(&[0xAA; 7]); // time info record
        data.extend_from_slice(&[0, 0, 3]);
        data.extend_from_slice(&[0, 0, 1]);

        let (rest, map) = vobu_map(&data).unwrap();
        assert!(rest.is_empty());
        assert_eq!(map.start_sector, 7);
        assert_eq!(map.vobu_sizes, vec![3, 1]);
    }

    #[test]
    fn program_with_adjacent_vob() {
        let mut data = Vec::new();
        data.extend_from_slice(&0x0080u16.to_be_bytes()); // adjacency flag
        data.extend_from_slice(&[0; 5]); // no timestamp
        data.push(0);
        data.push(2); // format id
        data.extend_from_slice(&[0; 12]); // presentation times
        data.extend_from_slice(&[0xBB; 12]); // adjacent vob record
        data.extend_from_slice(&[0; 2]);
        data.extend_from_slice(&0u16.to_be_bytes());
        data.extend_from_slice(&1u16.to_be_bytes());
        data.extend_from_slice(&0u16.to_be_bytes());
        data.extend_from_slice(&5u32.to_be_bytes());
        data.extend_from_slice(&[0, 0, 4]);

        let (rest, p) = program(&data).unwrap();
        assert!(rest.is_empty());
        assert_eq!(p.timestamp, None);
        assert_eq!(p.format_id, 2);
        assert_eq!(p.vobu_map.vobu_sizes, vec![4]);
    }

    #[test]
    fn multiple_program_tables_use_first() {
        // pgiti declaring two tables; decode proceeds with the first
        let mut pgit = Vec::new();
        pgit.extend([0u8, 0]);
        pgit.push(2); // two program info tables
        pgit.push(1); // one vob format
        pgit.extend(0u32.to_be_bytes());
        pgit.extend([0u8; 60]); // format descriptor, all defaults
        pgit.extend(1u16.to_be_bytes()); // one program
        pgit.extend((pgit.len() as u32 + 4).to_be_bytes());
        pgit.extend(0u16.to_be_bytes()); // vob_attr
        pgit.extend([0u8; 5]); // no timestamp
        pgit.push(0);
        pgit.push(1); // format id
        pgit.extend([0u8; 12]); // presentation times
        pgit.extend([0u8; 2]);
        pgit.extend(0u16.to_be_bytes());
        pgit.extend(1u16.to_be_bytes());
        pgit.extend(0u16.to_be_bytes());
        pgit.extend(3u32.to_be_bytes()); // start sector
        pgit.extend([0, 0, 2]);

        let mut data = vec![0u8; 512 + pgit.len()];
        let len = data.len() as u32;
        data[..12].copy_from_slice(IFO_ID);
        data[12..16].copy_from_slice(&(len - 1).to_be_bytes());
        data[256..260].copy_from_slice(&512u32.to_be_bytes());
        data[512..].copy_from_slice(&pgit);

        let ifo = parse_ifo(&data).unwrap();
        assert_eq!(ifo.vob_formats.len(), 1);
        assert_eq!(ifo.programs.len(), 1);
        assert_eq!(ifo.programs[0].vobu_map.vobu_sizes, vec![2]);
    }

    #[test]
    fn zero_program_tables_fatal() {
        let mut data = vec![0u8; 512 + 8];
        let len = data.len() as u32;
        data[..12].copy_from_slice(IFO_ID);
        data[12..16].copy_from_slice(&(len - 1).to_be_bytes());
        data[256..260].copy_from_slice(&512u32.to_be_bytes());

        assert!(matches!(
            parse_ifo(&data),
            Err(VrError::NoProgramTables)
        ));
    }

    #[test]
    fn label_set_sentinels() {
        fn entry(first: u16) -> Vec<u8> {
            let mut data = Vec::new();
            data.extend_from_slice(&3u16.to_be_bytes());
            data.extend_from_slice(&1u16.to_be_bytes());
            data.extend_from_slice(&first.to_be_bytes());
            data.extend_from_slice(&[0; 2]);
            data.extend_from_slice(&[0x41; 64]);
            data.extend_from_slice(&[0x42; 64]);
            data
        }

        assert_eq!(label_set(&entry(0)).unwrap().1.first_program, None);
        assert_eq!(label_set(&entry(0xFFFF)).unwrap().1.first_program, None);
        assert_eq!(label_set(&entry(4)).unwrap().1.first_program, Some(4));
    }
}
