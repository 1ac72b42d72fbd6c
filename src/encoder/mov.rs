//! Calibration embedding for finished movies
//!
//! FFmpeg cannot carry an arbitrary binary box, so the calibration block is
//! added after the muxer has closed the file. The block is wrapped in a `wfov`
//! box. When `moov` is the last top-level box (FFmpeg's default layout) the
//! box becomes a child of `moov` and only the `moov` size changes; sample
//! offsets into `mdat` stay valid either way because nothing before the end
//! of the file moves.

use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::Path;

use crate::calibration::metadata::write_box;

/// Container box holding the encoded calibration block
pub const CALIBRATION_BOX: [u8; 4] = *b"wfov";

/// Where the calibration box ended up
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placement {
    /// Last child of `moov`
    Movie,
    /// Top level, after the last box
    TopLevel,
}

/// A box header found while walking a file
#[derive(Debug, Clone, Copy)]
struct BoxHeader {
    kind: [u8; 4],
    offset: u64,
    size: u64,
    header_len: u64,
    /// The size field was zero ("extends to end of file")
    open_ended: bool,
}

fn invalid(message: &str) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, message.to_string())
}

/// Walk the boxes in `[start, end)`.
fn read_boxes(file: &mut File, start: u64, end: u64) -> io::Result<Vec<BoxHeader>> {
    let mut boxes = Vec::new();
    let mut offset = start;

    while offset + 8 <= end {
        file.seek(SeekFrom::Start(offset))?;
        let mut header = [0u8; 8];
        file.read_exact(&mut header)?;

        let size32 = u32::from_be_bytes([header[0], header[1], header[2], header[3]]);
        let kind = [header[4], header[5], header[6], header[7]];

        let (size, header_len, open_ended) = match size32 {
            0 => (end - offset, 8, true),
            1 => {
                let mut large = [0u8; 8];
                file.read_exact(&mut large)?;
                (u64::from_be_bytes(large), 16, false)
            }
            n => (n as u64, 8, false),
        };

        if size < header_len || offset + size > end {
            return Err(invalid("box extends past its parent"));
        }
        boxes.push(BoxHeader {
            kind,
            offset,
            size,
            header_len,
            open_ended,
        });
        offset += size;
    }
    Ok(boxes)
}

/// Append `block` (an encoded calibration descriptor) to the movie at `path`.
pub fn embed_calibration(path: &Path, block: &[u8]) -> io::Result<Placement> {
    let mut file = OpenOptions::new().read(true).write(true).open(path)?;
    let len = file.metadata()?.len();
    let boxes = read_boxes(&mut file, 0, len)?;

    let mut wrapped = Vec::with_capacity(block.len() + 8);
    write_box(&mut wrapped, &CALIBRATION_BOX, block);

    // Size field rewrite for a trailing moov: (offset, new bytes)
    let mut patch: Option<(u64, Vec<u8>)> = None;
    let placement = match boxes.last() {
        Some(moov) if &moov.kind == b"moov" => {
            let new_size = moov.size + wrapped.len() as u64;
            if moov.header_len == 16 {
                patch = Some((moov.offset + 8, new_size.to_be_bytes().to_vec()));
            } else if !moov.open_ended {
                let size = u32::try_from(new_size)
                    .map_err(|_| invalid("moov too large for a 32-bit size"))?;
                patch = Some((moov.offset, size.to_be_bytes().to_vec()));
            }
            Placement::Movie
        }
        _ => Placement::TopLevel,
    };

    file.seek(SeekFrom::End(0))?;
    file.write_all(&wrapped)?;
    if let Some((offset, bytes)) = patch {
        file.seek(SeekFrom::Start(offset))?;
        file.write_all(&bytes)?;
    }

    file.flush()?;
    Ok(placement)
}

/// Read back the calibration block embedded in a movie, if any.
pub fn read_calibration(path: &Path) -> io::Result<Option<Vec<u8>>> {
    let mut file = File::open(path)?;
    let len = file.metadata()?.len();
    let top = read_boxes(&mut file, 0, len)?;

    let mut candidates: Vec<BoxHeader> = top
        .iter()
        .copied()
        .filter(|b| b.kind == CALIBRATION_BOX)
        .collect();
    for moov in top.iter().filter(|b| &b.kind == b"moov") {
        let children = read_boxes(
            &mut file,
            moov.offset + moov.header_len,
            moov.offset + moov.size,
        )?;
        candidates.extend(children.into_iter().filter(|b| b.kind == CALIBRATION_BOX));
    }

    let Some(found) = candidates.first() else {
        return Ok(None);
    };
    let mut payload = vec![0u8; (found.size - found.header_len) as usize];
    file.seek(SeekFrom::Start(found.offset + found.header_len))?;
    file.read_exact(&mut payload)?;
    Ok(Some(payload))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calibration::{build_descriptor, ImageDimensions, IntrinsicMatrix};
    use tempfile::tempdir;

    fn boxed(kind: &[u8; 4], payload: &[u8]) -> Vec<u8> {
        let mut out = Vec::new();
        write_box(&mut out, kind, payload);
        out
    }

    fn block() -> Vec<u8> {
        build_descriptor(
            &IntrinsicMatrix::new(1000.0, 1000.0, 960.0, 540.0),
            ImageDimensions::new(1920, 1080),
        )
        .encode()
    }

    #[test]
    fn test_embeds_inside_trailing_moov() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("clip.mov");
        let mvhd = boxed(b"mvhd", &[0u8; 100]);
        let mut movie = boxed(b"ftyp", b"qt  \0\0\0\0");
        movie.extend(boxed(b"mdat", &[7u8; 64]));
        movie.extend(boxed(b"moov", &mvhd));
        std::fs::write(&path, &movie).unwrap();

        let block = block();
        assert_eq!(embed_calibration(&path, &block).unwrap(), Placement::Movie);

        let bytes = std::fs::read(&path).unwrap();
        let moov_offset = movie.len() - (8 + mvhd.len());
        let moov_size = u32::from_be_bytes(bytes[moov_offset..moov_offset + 4].try_into().unwrap());
        assert_eq!(moov_size as usize, 8 + mvhd.len() + 8 + block.len());
        assert_eq!(moov_offset + moov_size as usize, bytes.len());
        // mdat untouched
        assert_eq!(&bytes[..movie.len() - (8 + mvhd.len())], &movie[..moov_offset]);

        assert_eq!(read_calibration(&path).unwrap(), Some(block));
    }

    #[test]
    fn test_embeds_top_level_when_moov_is_first() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("faststart.mov");
        let mut movie = boxed(b"ftyp", b"qt  \0\0\0\0");
        movie.extend(boxed(b"moov", &boxed(b"mvhd", &[0u8; 100])));
        movie.extend(boxed(b"mdat", &[7u8; 64]));
        std::fs::write(&path, &movie).unwrap();

        let block = block();
        assert_eq!(embed_calibration(&path, &block).unwrap(), Placement::TopLevel);
        assert_eq!(&std::fs::read(&path).unwrap()[..movie.len()], &movie[..]);
        assert_eq!(read_calibration(&path).unwrap(), Some(block));
    }

    #[test]
    fn test_block_carries_lens_matrix() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("clip.mov");
        std::fs::write(&path, boxed(b"moov", &[])).unwrap();
        embed_calibration(&path, &block()).unwrap();

        let stored = read_calibration(&path).unwrap().unwrap();
        let matrix = IntrinsicMatrix::new(1000.0, 1000.0, 960.0, 540.0).to_bytes();
        let lnin = stored.windows(4).position(|w| w == b"lnin").unwrap();
        assert_eq!(&stored[lnin + 4..lnin + 4 + matrix.len()], &matrix[..]);
    }

    #[test]
    fn test_rejects_truncated_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("broken.mov");
        let mut bytes = boxed(b"moov", &[0u8; 32]);
        bytes.truncate(20);
        std::fs::write(&path, &bytes).unwrap();

        let err = embed_calibration(&path, &block()).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[test]
    fn test_no_calibration() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("plain.mov");
        std::fs::write(&path, boxed(b"moov", &[])).unwrap();
        assert_eq!(read_calibration(&path).unwrap(), None);
    }
}
