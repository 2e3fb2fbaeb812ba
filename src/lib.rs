//! A DVD-VR (Video Recording) disc metadata parser and program extractor.
//!
//! DVD-VR is the format camcorders and set-top recorders use on rewritable
//! discs: a `VR_MANGR.IFO` management file describes the recordings, and a
//! `VR_MOVIE.VRO` file holds the actual sector data. This crate decodes the
//! IFO metadata and, using its per-program VOBU maps, copies each recorded
//! program (title) out of the VRO into a standalone playable file. Splits
//! and deletions made on the recorder are honored, because they exist only
//! in the metadata: the extractor follows the map, not the raw layout.
//!
//! The entry point is [`VrIfo`], obtained through its [`open`] or [`parse`]
//! methods. Extraction is done by [`extract::Extractor`] against an open
//! VRO file.
//!
//! The IFO structures are not publicly documented; this crate follows the
//! layout established by the dvd-vr tool and what camcorder discs in the
//! wild actually contain. Fields whose meaning is unknown are skipped as
//! opaque reserved ranges rather than guessed at.
//!
//! [`open`]: types/struct.VrIfo.html#method.open
//! [`parse`]: types/struct.VrIfo.html#method.parse
//!
//! # Examples
//! ```no_run
//! # fn main() -> Result<(), dvdvr::VrError> {
//! use std::fs::File;
//! use dvdvr::{extract::Extractor, VrIfo};
//!
//! let ifo = VrIfo::open("VR_MANGR.IFO".as_ref())?;
//! println!("{} programs on disc", ifo.program_count());
//!
//! let mut extractor = Extractor::new(File::open("VR_MOVIE.VRO")?);
//! for (i, program) in ifo.programs.iter().enumerate() {
//!     let name = format!("program_{}.vob", i + 1);
//!     let mut out = File::create(&name)?;
//!     let stats = extractor.extract_to(program, &mut out, |_, _| {})?;
//!     println!("{}: {} bytes", name, stats.bytes_written);
//! }
//! # Ok(())
//! # }
//! ```

mod error;
mod parser;
mod region;

pub mod extract;
pub mod text;
pub mod types;

pub use error::VrError;
pub use text::{find_label_set, TextEncoding};
pub use types::*;
