//! Minimal ISO-BMFF reader for duration and frame rate
//!
//! Only the boxes needed for the sanity check are parsed: `moov/mvhd`
//! for the presentation duration, and for the first video track
//! (`hdlr` type `vide`) its `mdhd` timescale/duration and `stts` sample
//! count.

use super::media::{MediaInfo, MediaProbe};
use super::MediaError;
use std::path::Path;

#[derive(Debug, Clone, Copy, Default)]
pub struct Mp4Probe;

impl MediaProbe for Mp4Probe {
    fn probe(&self, path: &Path) -> Result<MediaInfo, MediaError> {
        let fail = |reason: String| MediaError::Probe {
            path: path.to_path_buf(),
            reason,
        };
        let data = std::fs::read(path).map_err(|e| fail(e.to_string()))?;
        parse_media_info(&data).map_err(fail)
    }
}

struct Mp4Box<'a> {
    kind: [u8; 4],
    body: &'a [u8],
}

fn read_u32(data: &[u8], at: usize) -> Result<u32, String> {
    data.get(at..at + 4)
        .map(|b| u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
        .ok_or_else(|| format!("truncated read at offset {at}"))
}

fn read_u64(data: &[u8], at: usize) -> Result<u64, String> {
    let hi = read_u32(data, at)? as u64;
    let lo = read_u32(data, at + 4)? as u64;
    Ok((hi << 32) | lo)
}

/// Split a buffer into its sibling boxes
fn boxes(mut data: &[u8]) -> Result<Vec<Mp4Box<'_>>, String> {
    let mut out = Vec::new();
    while data.len() >= 8 {
        let size = read_u32(data, 0)? as u64;
        let kind = [data[4], data[5], data[6], data[7]];
        let (header, total) = match size {
            0 => (8usize, data.len() as u64),
            1 => (16usize, read_u64(data, 8)?),
            n => (8usize, n),
        };
        if total < header as u64 || total > data.len() as u64 {
            return Err(format!(
                "box {} has invalid size {}",
                String::from_utf8_lossy(&kind),
                total
            ));
        }
        let total = total as usize;
        out.push(Mp4Box {
            kind,
            body: &data[header..total],
        });
        data = &data[total..];
    }
    Ok(out)
}

fn find<'a>(list: &'a [Mp4Box<'a>], kind: &[u8; 4]) -> Option<&'a Mp4Box<'a>> {
    list.iter().find(|b| &b.kind == kind)
}

/// `(timescale, duration)` from an `mvhd` or `mdhd` body
fn header_timing(body: &[u8]) -> Result<(u32, u64), String> {
    let version = *body.first().ok_or("empty header box")?;
    if version == 1 {
        Ok((read_u32(body, 20)?, read_u64(body, 24)?))
    } else {
        Ok((read_u32(body, 12)?, read_u32(body, 16)? as u64))
    }
}

fn sample_count(stts: &[u8]) -> Result<u64, String> {
    let entries = read_u32(stts, 4)? as usize;
    let mut total = 0u64;
    for i in 0..entries {
        total += read_u32(stts, 8 + i * 8)? as u64;
    }
    Ok(total)
}

pub fn parse_media_info(data: &[u8]) -> Result<MediaInfo, String> {
    let top = boxes(data)?;
    let moov = find(&top, b"moov").ok_or("no moov box")?;
    let moov_children = boxes(moov.body)?;

    let mvhd = find(&moov_children, b"mvhd").ok_or("no mvhd box")?;
    let (timescale, duration) = header_timing(mvhd.body)?;
    if timescale == 0 {
        return Err("mvhd timescale is zero".to_string());
    }
    let duration_secs = duration as f64 / timescale as f64;

    for trak in moov_children.iter().filter(|b| &b.kind == b"trak") {
        let trak_children = boxes(trak.body)?;
        let Some(mdia) = find(&trak_children, b"mdia") else {
            continue;
        };
        let mdia_children = boxes(mdia.body)?;
        let is_video = find(&mdia_children, b"hdlr")
            .and_then(|h| h.body.get(8..12))
            .map_or(false, |t| t == b"vide");
        if !is_video {
            continue;
        }

        let mdhd = find(&mdia_children, b"mdhd").ok_or("video track without mdhd")?;
        let (track_scale, track_duration) = header_timing(mdhd.body)?;
        let minf = find(&mdia_children, b"minf").ok_or("video track without minf")?;
        let minf_children = boxes(minf.body)?;
        let stbl = find(&minf_children, b"stbl").ok_or("video track without stbl")?;
        let stbl_children = boxes(stbl.body)?;
        let stts = find(&stbl_children, b"stts").ok_or("video track without stts")?;
        let samples = sample_count(stts.body)?;

        if track_scale == 0 || track_duration == 0 {
            return Err("video track has zero duration".to_string());
        }
        let track_secs = track_duration as f64 / track_scale as f64;
        return Ok(MediaInfo {
            duration_secs,
            frame_rate: samples as f64 / track_secs,
        });
    }

    Err("no video track".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{mp4_box, write_minimal_mp4};
    use tempfile::tempdir;

    #[test]
    fn test_probe_reads_written_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("clip.mp4");
        write_minimal_mp4(&path, 12.0, 30.0).unwrap();

        let info = Mp4Probe.probe(&path).unwrap();
        assert!((info.duration_secs - 12.0).abs() < 1e-9);
        assert!((info.frame_rate - 30.0).abs() < 1e-9);
    }

    #[test]
    fn test_missing_moov() {
        let data = mp4_box(b"ftyp", b"isom\0\0\0\0");
        assert_eq!(parse_media_info(&data).unwrap_err(), "no moov box");
    }

    #[test]
    fn test_truncated_box_rejected() {
        let mut data = mp4_box(b"moov", &[0u8; 32]);
        data.truncate(20);
        assert!(parse_media_info(&data).is_err());
    }

    #[test]
    fn test_garbage_file_is_probe_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("junk.mp4");
        std::fs::write(&path, b"not an mp4 at all").unwrap();
        assert!(matches!(
            Mp4Probe.probe(&path),
            Err(MediaError::Probe { .. })
        ));
    }
}
