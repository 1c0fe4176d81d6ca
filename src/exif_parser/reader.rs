use crate::error::ResolveError;
use exif::Exif;
use std::io::Cursor;
use tracing::debug;

/// Reads the EXIF container out of an in-memory photo (JPEG, PNG, TIFF,
/// HEIF or WebP). Non-standard structures are tolerated: a partial result
/// is used as long as the reader recovered anything.
pub fn read_exif(bytes: &[u8]) -> Result<Exif, ResolveError> {
    let mut exif_reader = exif::Reader::new();
    exif_reader.continue_on_error(true);

    match exif_reader.read_from_container(&mut Cursor::new(bytes)) {
        Ok(exif) => Ok(exif),
        Err(exif::Error::PartialResult(partial)) => {
            let (exif, errors) = partial.into_inner();
            debug!("EXIF read with {} recoverable error(s)", errors.len());
            Ok(exif)
        }
        Err(e) => Err(ResolveError::MetadataUnavailable(e.to_string())),
    }
}
