//! Gzip file decoding.

use std::fs::File;
use std::io::{self, BufReader, BufWriter, Write};
use std::path::Path;

use flate2::read::GzDecoder;
use tracing::debug;

use crate::error::UnpackResult;

/// Decode a gzip-compressed file into `dst`, returning the decoded length.
///
/// `dst` is truncated first; a decode failure leaves it partially written,
/// which is fine because callers only publish the artifact after success.
pub fn gunzip_file(src: &Path, dst: &Path) -> UnpackResult<u64> {
    let input = File::open(src)?;
    let mut decoder = GzDecoder::new(BufReader::new(input));
    let mut output = BufWriter::new(File::create(dst)?);
    let decoded = io::copy(&mut decoder, &mut output)?;
    output.flush()?;
    debug!(src = %src.display(), dst = %dst.display(), decoded, "gunzipped");
    Ok(decoded)
}
