use anyhow::{anyhow, bail, Context, Result};
use crabkyc::config::CrabKycConfig;
use crabkyc::quality::blur::laplacian_variance;
use crabkyc::quality::compression::mean_block_variance;
use crabkyc::quality::exposure::mean_value;
use crabkyc::quality::DocumentDetector;
use crabkyc::transport::{IntegritySigner, MediaProbe, Mp4Probe};
use crabkyc::types::CaptureFrame;
use serde_json::json;
use std::env;
use std::path::{Path, PathBuf};

const USAGE: &str = "Usage: crabkyc-cli <command> [args] [--json] [--config <path>]

Commands:
  analyze <image>          Per-frame quality metrics for one image
  document <image>         Run ID document detection on one image
  digest <file>            HMAC-SHA256 and SHA-256 digests of a file
  probe <mp4>              Duration and frame rate of a recording
  config-init [path]       Write the default configuration";

fn main() -> Result<()> {
    crabkyc::init_logging();

    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        eprintln!("{USAGE}");
        std::process::exit(1);
    }

    let opts = Options::parse(&args[2..])?;
    match args[1].as_str() {
        "analyze" => cmd_analyze(&opts),
        "document" => cmd_document(&opts),
        "digest" => cmd_digest(&opts),
        "probe" => cmd_probe(&opts),
        "config-init" => cmd_config_init(&opts),
        "--help" | "-h" | "help" => {
            println!("{USAGE}");
            Ok(())
        }
        other => {
            eprintln!("Unknown command: {other}\n\n{USAGE}");
            std::process::exit(1);
        }
    }
}

struct Options {
    positional: Vec<String>,
    json: bool,
    config: Option<PathBuf>,
}

impl Options {
    fn parse(args: &[String]) -> Result<Self> {
        let mut opts = Options {
            positional: Vec::new(),
            json: false,
            config: None,
        };
        let mut i = 0;
        while i < args.len() {
            match args[i].as_str() {
                "--json" => opts.json = true,
                "--config" => {
                    i += 1;
                    let path = args.get(i).ok_or_else(|| anyhow!("--config needs a path"))?;
                    opts.config = Some(PathBuf::from(path));
                }
                other => opts.positional.push(other.to_string()),
            }
            i += 1;
        }
        Ok(opts)
    }

    fn input(&self, what: &str) -> Result<&Path> {
        self.positional
            .first()
            .map(Path::new)
            .ok_or_else(|| anyhow!("{what} path required"))
    }

    fn load_config(&self) -> Result<CrabKycConfig> {
        let path = self
            .config
            .clone()
            .unwrap_or_else(CrabKycConfig::default_path);
        CrabKycConfig::load_layered(&path)
            .with_context(|| format!("loading config from {}", path.display()))
    }
}

fn load_frame(path: &Path) -> Result<CaptureFrame> {
    let image = image::open(path).with_context(|| format!("opening {}", path.display()))?;
    Ok(CaptureFrame::from_image(&image))
}

fn cmd_analyze(opts: &Options) -> Result<()> {
    let config = opts.load_config()?;
    let frame = load_frame(opts.input("image")?)?;
    let gray = frame.to_gray();

    let blur = laplacian_variance(&gray);
    let exposure = mean_value(&frame);
    let compression = mean_block_variance(&gray, config.window.block_size);
    let t = &config.precheck;

    let blur_pass = blur >= t.blur_min;
    let exposure_pass = (t.exposure_min..=t.exposure_max).contains(&exposure);
    let compression_pass = compression < t.compression_max;

    if opts.json {
        let out = json!({
            "width": frame.width,
            "height": frame.height,
            "blur": blur,
            "exposure": exposure,
            "compression": compression,
            "blur_pass": blur_pass,
            "exposure_pass": exposure_pass,
            "compression_pass": compression_pass,
        });
        println!("{}", serde_json::to_string(&out)?);
    } else {
        println!("Frame: {}x{}", frame.width, frame.height);
        println!("Blur:        {:>10.2} ({})", blur, verdict(blur_pass));
        println!("Exposure:    {:>10.2} ({})", exposure, verdict(exposure_pass));
        println!("Compression: {:>10.2} ({})", compression, verdict(compression_pass));
    }
    Ok(())
}

fn cmd_document(opts: &Options) -> Result<()> {
    let config = opts.load_config()?;
    let frame = load_frame(opts.input("image")?)?;
    let detection = DocumentDetector::new(config.document).detect(&frame);

    if opts.json {
        println!("{}", serde_json::to_string(&detection)?);
    } else {
        println!("Detected: {}", detection.detected);
        if let Some(bounds) = detection.bounds {
            println!(
                "Bounds:   {}x{} at ({}, {})",
                bounds.width, bounds.height, bounds.x, bounds.y
            );
        }
        if let Some(aspect) = detection.aspect_ratio {
            println!("Aspect:   {:.3} ({})", aspect, verdict(detection.aspect_pass));
        }
        if let Some(luma) = detection.mrz_mean_luma {
            println!("MRZ luma: {:.1} ({})", luma, verdict(detection.mrz_pass));
        }
    }
    Ok(())
}

fn cmd_digest(opts: &Options) -> Result<()> {
    let config = opts.load_config()?;
    let path = opts.input("file")?;
    let data = std::fs::read(path).with_context(|| format!("reading {}", path.display()))?;

    let signer = IntegritySigner::new(config.transport.hmac_secret.as_bytes())?;
    let hmac = signer.compute_hmac(&data);
    let sha256 = IntegritySigner::compute_sha256(&data);

    if opts.json {
        let out = json!({ "bytes": data.len(), "hmac": hmac, "sha256": sha256 });
        println!("{}", serde_json::to_string(&out)?);
    } else {
        println!("Bytes:  {}", data.len());
        println!("HMAC:   {hmac}");
        println!("SHA256: {sha256}");
    }
    Ok(())
}

fn cmd_probe(opts: &Options) -> Result<()> {
    let config = opts.load_config()?;
    let path = opts.input("mp4")?;
    let info = Mp4Probe.probe(path)?;
    let t = &config.transport;
    let duration_pass = (t.min_duration_secs..=t.max_duration_secs).contains(&info.duration_secs);
    let fps_pass = (t.min_fps..=t.max_fps).contains(&info.frame_rate);

    if opts.json {
        let out = json!({
            "duration_secs": info.duration_secs,
            "frame_rate": info.frame_rate,
            "duration_pass": duration_pass,
            "frame_rate_pass": fps_pass,
        });
        println!("{}", serde_json::to_string(&out)?);
    } else {
        println!("Duration:   {:.2}s ({})", info.duration_secs, verdict(duration_pass));
        println!("Frame rate: {:.2}fps ({})", info.frame_rate, verdict(fps_pass));
    }
    Ok(())
}

fn cmd_config_init(opts: &Options) -> Result<()> {
    let path = opts
        .positional
        .first()
        .map(PathBuf::from)
        .unwrap_or_else(CrabKycConfig::default_path);
    if path.exists() {
        bail!("{} already exists", path.display());
    }
    CrabKycConfig::default().save_to_file(&path)?;
    println!("Wrote {}", path.display());
    Ok(())
}

fn verdict(pass: bool) -> &'static str {
    if pass {
        "pass"
    } else {
        "FAIL"
    }
}
