use std::io::prelude::*;
use std::io::Cursor;

use zip::ZipArchive;

use super::super::{AgbError, AgbResult};

/// Accept either a raw `.gba` image or a zip archive containing one.
pub fn load_from_bytes(bytes: &[u8]) -> AgbResult<Box<[u8]>> {
    // zip magic
    if bytes.starts_with(b"PK") {
        from_zip_archive(bytes)
    } else {
        Ok(bytes.to_vec().into_boxed_slice())
    }
}

fn from_zip_archive(bytes: &[u8]) -> AgbResult<Box<[u8]>> {
    let reader = Cursor::new(bytes);
    let mut archive = ZipArchive::new(reader)?;
    for i in 0..archive.len() {
        let mut file = archive.by_index(i)?;
        if file.name().ends_with(".gba") {
            let mut buf = Vec::with_capacity(file.size() as usize);
            file.read_to_end(&mut buf)?;
            return Ok(buf.into_boxed_slice());
        }
    }
    Err(AgbError::CartridgeLoad(
        "no .gba file found in the zip archive".to_string(),
    ))
}
