use std::fs::File;
use std::io::Write;
use std::time::{Duration, SystemTime};

use dvdvr::extract::Extractor;
use dvdvr::{AudioCoding, Compression, TextEncoding, TvSystem, VrError, VrIfo, SECTOR_SIZE};

struct ProgramSpec {
    pgtm: [u8; 5],
    format_id: u8,
    start_sector: u32,
    sizes: Vec<u16>,
}

struct LabelSpec {
    programs: u16,
    /// 0 is the "derive positionally" sentinel
    first: u16,
    label: &'static [u8],
    title: &'static [u8],
}

fn pack_pgtm(year: u16, month: u8, day: u8, hour: u8, min: u8, sec: u8) -> [u8; 5] {
    [
        (year >> 6) as u8,
        ((year & 0x3F) << 2) as u8 | (month >> 2),
        (month & 0x03) << 6 | (day & 0x1F) << 1 | (hour >> 4),
        (hour & 0x0F) << 4 | (min >> 2),
        (min & 0x03) << 6 | (sec & 0x3F),
    ]
}

fn fixed64(text: &[u8]) -> [u8; 64] {
    let mut field = [0u8; 64];
    field[..text.len()].copy_from_slice(text);
    field
}

/// Builds a minimal but structurally complete IFO image: manifest header,
/// one program info table with one format descriptor, the given program
/// entries, and an optional label set table.
fn build_ifo(programs: &[ProgramSpec], labels: &[LabelSpec]) -> Vec<u8> {
    let mut pgit = Vec::new();
    pgit.extend([0u8, 0]);
    pgit.push(1); // one program info table
    pgit.push(1); // one vob format
    pgit.extend(0u32.to_be_bytes()); // end address, unused here

    // format descriptor: MPEG2, NTSC 720x480, 4:3, one AC-3 stereo stream
    pgit.extend(0x4000u16.to_be_bytes());
    pgit.push(1);
    pgit.push(0);
    pgit.extend([0u8, 1, 0]);
    pgit.extend([0u8, 0, 0]);
    pgit.extend([0u8; 50]);

    pgit.extend((programs.len() as u16).to_be_bytes());
    let offsets_pos = pgit.len();
    pgit.extend(vec![0u8; 4 * programs.len()]);

    let mut entry_offsets = Vec::new();
    for p in programs {
        entry_offsets.push(pgit.len() as u32);
        pgit.extend(0u16.to_be_bytes()); // vob_attr, no adjacent record
        pgit.extend(p.pgtm);
        pgit.push(0);
        pgit.push(p.format_id);
        pgit.extend([0u8; 12]); // presentation times
        pgit.extend([0u8; 2]);
        pgit.extend(0u16.to_be_bytes()); // no time info records
        pgit.extend((p.sizes.len() as u16).to_be_bytes());
        pgit.extend(0u16.to_be_bytes());
        pgit.extend(p.start_sector.to_be_bytes());
        for &s in &p.sizes {
            pgit.extend([0, (s >> 8) as u8, (s & 0xFF) as u8]);
        }
    }
    for (i, off) in entry_offsets.iter().enumerate() {
        pgit[offsets_pos + 4 * i..offsets_pos + 4 * i + 4].copy_from_slice(&off.to_be_bytes());
    }

    let mut psi = Vec::new();
    if !labels.is_empty() {
        psi.extend((labels.len() as u16).to_be_bytes());
        let total: u16 = labels.iter().map(|l| l.programs).sum();
        psi.extend(total.to_be_bytes());
        for l in labels {
            psi.extend(l.programs.to_be_bytes());
            psi.extend(0u16.to_be_bytes());
            psi.extend(l.first.to_be_bytes());
            psi.extend([0u8; 2]);
            psi.extend(fixed64(l.label));
            psi.extend(fixed64(l.title));
        }
    }

    let total_len = 512 + pgit.len() + psi.len();
    let mut data = vec![0u8; total_len];
    data[..12].copy_from_slice(b"DVD_RTR_VMG0");
    data[12..16].copy_from_slice(&(total_len as u32 - 1).to_be_bytes());
    data[32..34].copy_from_slice(&0x0011u16.to_be_bytes()); // V1.1
    data[64] = 0; // Latin-1
    data[66..71].copy_from_slice(b"MYDVD");
    data[256..260].copy_from_slice(&512u32.to_be_bytes());
    if !psi.is_empty() {
        data[304..308].copy_from_slice(&(512 + pgit.len() as u32).to_be_bytes());
    }
    data[512..512 + pgit.len()].copy_from_slice(&pgit);
    data[512 + pgit.len()..].copy_from_slice(&psi);
    data
}

fn two_programs() -> Vec<u8> {
    build_ifo(
        &[
            ProgramSpec {
                pgtm: pack_pgtm(2007, 6, 18, 14, 30, 5),
                format_id: 1,
                start_sector: 2,
                sizes: vec![3, 1, 4],
            },
            ProgramSpec {
                pgtm: [0; 5],
                format_id: 1,
                start_sector: 10,
                sizes: vec![2],
            },
        ],
        &[
            LabelSpec {
                programs: 1,
                first: 0,
                label: b"holiday",
                title: b"summer holiday",
            },
            LabelSpec {
                programs: 1,
                first: 0,
                label: b"untitled",
                title: b"untitled",
            },
        ],
    )
}

fn patterned_vro(sectors: usize) -> Vec<u8> {
    (0..sectors * SECTOR_SIZE as usize)
        .map(|i| (i % 251) as u8)
        .collect()
}

#[test]
fn complete_disc() {
    let ifo = VrIfo::parse(&two_programs()).unwrap();

    assert_eq!(ifo.version, (1, 1));
    assert_eq!(ifo.text_encoding, TextEncoding::Latin1);
    assert_eq!(ifo.disc_label1(), Some("MYDVD".into()));
    assert_eq!(ifo.disc_label2(), None);
    assert_eq!(ifo.program_count(), 2);

    let format = &ifo.vob_formats[0];
    assert_eq!(format.video.tv_system, TvSystem::Ntsc);
    assert_eq!(format.video.resolution, Some((720, 480)));
    assert_eq!(format.video.compression, Compression::Mpeg2);
    assert_eq!(format.audio0.channels, 2);
    assert_eq!(format.audio0.coding, AudioCoding::Ac3);
}

#[test]
fn program_entries() {
    let ifo = VrIfo::parse(&two_programs()).unwrap();

    let first = ifo.program(1).unwrap();
    let ts = first.timestamp.unwrap();
    assert_eq!(ts.to_string(), "2007-06-18 14:30:05");
    assert_eq!(first.vobu_map.vobu_sizes, vec![3, 1, 4]);
    assert_eq!(first.vobu_map.start_offset(), 2 * SECTOR_SIZE);
    assert_eq!(first.size_bytes(), 8 * SECTOR_SIZE);

    let second = ifo.program(2).unwrap();
    assert_eq!(second.timestamp, None);

    assert!(matches!(
        ifo.program(3),
        Err(VrError::ProgramOutOfRange {
            requested: 3,
            count: 2
        })
    ));
    assert!(ifo.program(0).is_err());
}

#[test]
fn labels_resolve_positionally() {
    let ifo = VrIfo::parse(&two_programs()).unwrap();
    let enc = ifo.text_encoding;

    let set = ifo.find_label_set(1).unwrap();
    assert_eq!(set.label(enc), Some("holiday".into()));
    assert_eq!(set.title_if_distinct(enc), Some("summer holiday".into()));

    // identical title is suppressed
    let set = ifo.find_label_set(2).unwrap();
    assert_eq!(set.label(enc), Some("untitled".into()));
    assert_eq!(set.title_if_distinct(enc), None);

    assert!(ifo.find_label_set(3).is_none());
}

#[test]
fn bad_identifier() {
    let mut data = two_programs();
    data[0] = b'X';
    assert!(matches!(VrIfo::parse(&data), Err(VrError::InvalidId)));
}

#[test]
fn truncated_region() {
    let data = two_programs();
    // any cut below the declared length must fail cleanly
    for keep in [16, 256, 512, data.len() - 1] {
        assert!(
            matches!(VrIfo::parse(&data[..keep]), Err(VrError::Truncated { .. })),
            "no error when cut to {keep} bytes"
        );
    }
}

#[test]
fn offsets_outside_region() {
    // program info table offset pointing past the end
    let mut data = two_programs();
    data[256..260].copy_from_slice(&0x00FF_0000u32.to_be_bytes());
    assert!(matches!(
        VrIfo::parse(&data),
        Err(VrError::Malformed { .. })
    ));

    // first program entry offset pointing past the end
    let mut data = two_programs();
    // pgiti header (8) + one format descriptor (60) + program count (2)
    let offsets_pos = 512 + 8 + 60 + 2;
    data[offsets_pos..offsets_pos + 4].copy_from_slice(&0xFFFF_FF00u32.to_be_bytes());
    assert!(matches!(
        VrIfo::parse(&data),
        Err(VrError::Malformed { .. })
    ));
}

#[test]
fn extraction_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let vro_bytes = patterned_vro(16);
    let vro_path = dir.path().join("VR_MOVIE.VRO");
    File::create(&vro_path)
        .unwrap()
        .write_all(&vro_bytes)
        .unwrap();

    let ifo = VrIfo::parse(&two_programs()).unwrap();
    let program = ifo.program(1).unwrap();

    let touch = SystemTime::now() - Duration::from_secs(86_400);
    let mut extractor = Extractor::new(File::open(&vro_path).unwrap());
    let out_path = dir.path().join("holiday.vob");
    let (written, stats) = extractor
        .extract_to_file(program, &out_path, touch, |_, _| {})
        .unwrap();

    assert_eq!(written, out_path);
    assert_eq!(stats.bytes_written, 8 * SECTOR_SIZE);
    assert_eq!(stats.error_vobus, 0);

    // byte-identical to the source ranges, concatenated in map order
    let out = std::fs::read(&out_path).unwrap();
    let start = 2 * SECTOR_SIZE as usize;
    assert_eq!(out, &vro_bytes[start..start + 8 * SECTOR_SIZE as usize]);

    // recording timestamp restored onto the artifact
    let modified = std::fs::metadata(&out_path).unwrap().modified().unwrap();
    let drift = modified
        .duration_since(touch)
        .unwrap_or_else(|e| e.duration());
    assert!(drift < Duration::from_secs(2));
}

#[test]
fn short_vro_does_not_abort_the_run() {
    let dir = tempfile::tempdir().unwrap();
    // program 2 wants sectors 10..12 but the file ends at sector 11
    let vro_bytes = patterned_vro(11);
    let vro_path = dir.path().join("VR_MOVIE.VRO");
    File::create(&vro_path)
        .unwrap()
        .write_all(&vro_bytes)
        .unwrap();

    let ifo = VrIfo::parse(&two_programs()).unwrap();
    let mut extractor = Extractor::new(File::open(&vro_path).unwrap());

    let mut out = Vec::new();
    let stats = extractor
        .extract_to(ifo.program(2).unwrap(), &mut out, |_, _| {})
        .unwrap();
    assert_eq!(stats.error_vobus, 1);
    assert_eq!(stats.bytes_written, SECTOR_SIZE);
    assert_eq!(out.len() as u64, stats.bytes_written);

    // the same extractor still serves other programs in full
    let mut out = Vec::new();
    let stats = extractor
        .extract_to(ifo.program(1).unwrap(), &mut out, |_, _| {})
        .unwrap();
    assert_eq!(stats.error_vobus, 0);
    assert_eq!(stats.bytes_written, 8 * SECTOR_SIZE);
}

#[test]
fn name_collisions_never_overwrite() {
    let dir = tempfile::tempdir().unwrap();
    let vro_bytes = patterned_vro(16);
    let vro_path = dir.path().join("VR_MOVIE.VRO");
    File::create(&vro_path)
        .unwrap()
        .write_all(&vro_bytes)
        .unwrap();

    let ifo = VrIfo::parse(&two_programs()).unwrap();
    let mut extractor = Extractor::new(File::open(&vro_path).unwrap());
    let path = dir.path().join("out.vob");
    let touch = SystemTime::now();

    let (first, _) = extractor
        .extract_to_file(ifo.program(1).unwrap(), &path, touch, |_, _| {})
        .unwrap();
    let (second, _) = extractor
        .extract_to_file(ifo.program(2).unwrap(), &path, touch, |_, _| {})
        .unwrap();

    assert_eq!(first, path);
    assert_eq!(second, dir.path().join("out_2.vob"));
    assert_eq!(
        std::fs::metadata(&first).unwrap().len(),
        8 * SECTOR_SIZE
    );
    assert_eq!(std::fs::metadata(&second).unwrap().len(), 2 * SECTOR_SIZE);
}
