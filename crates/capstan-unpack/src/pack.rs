//! Tabular-pack decoding seam.

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

use flate2::read::GzDecoder;
use tracing::debug;

use crate::error::UnpackResult;

/// Decoder from the tabular-pack class-file container to a jar stream.
///
/// The engine does not bundle a decoder; launchers supply one through the
/// engine options. Implementations pull from `input` (the gzip layer is
/// already removed) and write the resulting jar bytes to `output`.
pub trait Unpacker: Send + Sync {
    fn unpack(&self, input: &mut dyn Read, output: &mut dyn Write) -> UnpackResult<()>;
}

/// Decode a stored `.pack.gz` file into the final jar at `dst`: gzip layer
/// first, then the pack decoder.
///
/// The compressed payload sits on disk rather than being piped through,
/// because pack decoders pull from a rewindable input.
pub fn unpack_packgz_file(unpacker: &dyn Unpacker, src: &Path, dst: &Path) -> UnpackResult<()> {
    let input = File::open(src)?;
    let mut pack_stream = BufReader::new(GzDecoder::new(BufReader::new(input)));
    let mut output = BufWriter::new(File::create(dst)?);
    unpacker.unpack(&mut pack_stream, &mut output)?;
    output.flush()?;
    debug!(src = %src.display(), dst = %dst.display(), "unpacked pack.gz");
    Ok(())
}
