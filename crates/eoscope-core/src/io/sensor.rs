use std::path::Path;

use tracing::debug;

use crate::error::{EoError, Result};
use crate::frame::{AmpGeometry, AmpId, PixelMask, SensorFrame};
use crate::io::fits::{Bitpix, FitsFile, FitsWriter, Header, HduKind};
use crate::io::write_atomic;

/// `EXTNAME` of amplifier `amp` (0-based) in the usual CCD segment layout:
/// the first eight amplifiers are `SEGMENT10`..`SEGMENT17`, the next eight run
/// back down `SEGMENT07`..`SEGMENT00`. Sensors with more than sixteen
/// amplifiers fall back to `SEGMENTnn` numbering.
pub fn segment_name(amp: AmpId) -> String {
    match amp {
        0..=7 => format!("SEGMENT1{amp}"),
        8..=15 => format!("SEGMENT0{}", 15 - amp),
        _ => format!("SEGMENT{amp:02}"),
    }
}

/// Read a multi-extension sensor file: one IMAGE extension per amplifier,
/// numbered in file order; `EXTNAME` is not interpreted. A file whose only image lives in the primary HDU
/// is read as a single-amplifier sensor.
pub fn read_sensor(path: &Path) -> Result<SensorFrame> {
    let fits = FitsFile::open(path)?;
    let primary = fits.header(0)?;
    let mut frame = SensorFrame::new(primary.user_cards());

    let mut amp: AmpId = 0;
    for index in 1..fits.num_hdus() {
        if fits.kind(index)? != HduKind::Image || !fits.has_image(index) {
            continue;
        }
        let data = fits.read_image(index)?;
        let geometry = AmpGeometry::from_header(fits.header(index)?, data.dim())?;
        frame.insert_amp(amp, data, geometry);
        amp = amp
            .checked_add(1)
            .ok_or_else(|| EoError::InvalidFits("too many image extensions".into()))?;
    }
    if frame.num_amps() == 0 && fits.has_image(0) {
        let data = fits.read_image(0)?;
        let geometry = AmpGeometry::from_header(primary, data.dim())?;
        frame.insert_amp(0, data, geometry);
    }
    if frame.num_amps() == 0 {
        return Err(EoError::InvalidFits(format!(
            "{} contains no image data",
            path.display()
        )));
    }
    debug!(path = %path.display(), amps = frame.num_amps(), "Read sensor frame");
    Ok(frame)
}

/// Write `frame` as primary header plus one IMAGE extension per amplifier.
pub fn write_sensor(path: &Path, frame: &SensorFrame, bitpix: Bitpix) -> Result<()> {
    write_atomic(path, |out| {
        let mut writer = FitsWriter::new(out);
        writer.write_primary(&frame.header)?;
        for (amp, data) in &frame.amps {
            let mut header = match frame.geometry.get(amp) {
                Some(geometry) => geometry.to_header(),
                None => Header::new(),
            };
            header.set_str("EXTNAME", &segment_name(*amp));
            header.set_int("AMP", *amp as i64 + 1);
            writer.write_image(&header, data, bitpix)?;
        }
        writer.finish()?;
        Ok(())
    })?;
    debug!(path = %path.display(), bitpix = bitpix.code(), "Wrote sensor frame");
    Ok(())
}

/// Read one raw exposure of a work cell. A file that cannot be decoded only
/// spoils its cell, so format errors come back as [`EoError::BadInput`].
pub fn read_input(path: &Path) -> Result<SensorFrame> {
    read_sensor(path).map_err(|e| match e {
        EoError::InvalidFits(reason) => EoError::BadInput {
            path: path.to_path_buf(),
            reason,
        },
        other => other,
    })
}

/// Read a defect mask file; any non-zero pixel is masked.
pub fn read_mask(path: &Path) -> Result<PixelMask> {
    Ok(PixelMask::from_frame(&read_input(path)?))
}
