//! Writes tiny but structurally valid MP4 containers for media checks
//!
//! The output carries no sample data, only the boxes the probe reads:
//! `ftyp`, then `moov` with `mvhd` and a single video `trak`.

use std::io;
use std::path::Path;

const TIMESCALE: u32 = 1000;

/// Wrap `body` in a box header
pub fn mp4_box(kind: &[u8; 4], body: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(8 + body.len());
    out.extend_from_slice(&((8 + body.len()) as u32).to_be_bytes());
    out.extend_from_slice(kind);
    out.extend_from_slice(body);
    out
}

fn mvhd(duration: u32) -> Vec<u8> {
    let mut body = vec![0u8; 12]; // version, flags, creation, modification
    body.extend_from_slice(&TIMESCALE.to_be_bytes());
    body.extend_from_slice(&duration.to_be_bytes());
    body.extend_from_slice(&0x0001_0000u32.to_be_bytes()); // rate 1.0
    body.extend_from_slice(&0x0100u16.to_be_bytes()); // volume 1.0
    body.extend_from_slice(&[0u8; 10]);
    for v in [0x0001_0000u32, 0, 0, 0, 0x0001_0000, 0, 0, 0, 0x4000_0000] {
        body.extend_from_slice(&v.to_be_bytes());
    }
    body.extend_from_slice(&[0u8; 24]);
    body.extend_from_slice(&2u32.to_be_bytes()); // next track id
    mp4_box(b"mvhd", &body)
}

fn mdhd(duration: u32) -> Vec<u8> {
    let mut body = vec![0u8; 12];
    body.extend_from_slice(&TIMESCALE.to_be_bytes());
    body.extend_from_slice(&duration.to_be_bytes());
    body.extend_from_slice(&0x55c4u16.to_be_bytes()); // "und"
    body.extend_from_slice(&[0u8; 2]);
    mp4_box(b"mdhd", &body)
}

fn hdlr() -> Vec<u8> {
    let mut body = vec![0u8; 8];
    body.extend_from_slice(b"vide");
    body.extend_from_slice(&[0u8; 12]);
    body.extend_from_slice(b"VideoHandler\0");
    mp4_box(b"hdlr", &body)
}

fn stts(samples: u32, delta: u32) -> Vec<u8> {
    let mut body = vec![0u8; 4];
    body.extend_from_slice(&1u32.to_be_bytes());
    body.extend_from_slice(&samples.to_be_bytes());
    body.extend_from_slice(&delta.to_be_bytes());
    mp4_box(b"stts", &body)
}

/// Container bytes for a clip of `duration_secs` at `fps`
pub fn minimal_mp4(duration_secs: f64, fps: f64) -> Vec<u8> {
    let duration = (duration_secs * TIMESCALE as f64).round() as u32;
    let samples = (duration_secs * fps).round() as u32;
    let delta = if samples == 0 { 0 } else { duration / samples };

    let stbl = mp4_box(b"stbl", &stts(samples, delta));
    let minf = mp4_box(b"minf", &stbl);
    let mdia = mp4_box(b"mdia", &[mdhd(duration), hdlr(), minf].concat());
    let trak = mp4_box(b"trak", &mdia);
    let moov = mp4_box(b"moov", &[mvhd(duration), trak].concat());

    let mut ftyp = b"isom".to_vec();
    ftyp.extend_from_slice(&0x200u32.to_be_bytes());
    ftyp.extend_from_slice(b"isomiso2mp41");

    [mp4_box(b"ftyp", &ftyp), moov].concat()
}

pub fn write_minimal_mp4<P: AsRef<Path>>(path: P, duration_secs: f64, fps: f64) -> io::Result<()> {
    std::fs::write(path, minimal_mp4(duration_secs, fps))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_box_header() {
        let b = mp4_box(b"free", &[1, 2, 3]);
        assert_eq!(&b[..4], &11u32.to_be_bytes());
        assert_eq!(&b[4..8], b"free");
    }

    #[test]
    fn test_mvhd_is_full_size() {
        // 8 byte header + 100 byte version-0 body
        assert_eq!(mvhd(1000).len(), 108);
    }
}
