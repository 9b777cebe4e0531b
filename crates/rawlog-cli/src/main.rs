use std::fs::{self, File};
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::Parser;
use log::info;

use rawlog_pipeline::{
    parse_image_size, parse_label_alpha, ProcessReport, RawlogReader, RawlogWriter,
    StereoRectifyConfig, StereoRectifyProcessor,
};

/// Rectify the stereo images of one sensor in a JSON-lines sensor log.
#[derive(Debug, Parser)]
#[command(author, version, about = "Stereo rectification of sensor logs")]
struct Args {
    /// Input log (one JSON record per line).
    #[arg(long)]
    input: PathBuf,

    /// Output log. Rectified images go to `<output-stem>_Images/` next to it.
    #[arg(long)]
    output: PathBuf,

    /// Sensor label and alpha, e.g. `BUMBLEBEE,0.5`. Alpha is -1 (auto) or
    /// within [0, 1].
    #[arg(long, value_name = "LABEL,ALPHA")]
    stereo_rectify: Option<String>,

    /// Optional JSON StereoRectifyConfig. Command-line flags override it.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Extension (and encoder) of the written images. Defaults to png.
    #[arg(long)]
    image_format: Option<String>,

    /// Resize rectified images to NCOLSxNROWS.
    #[arg(long, value_name = "NCOLSxNROWS")]
    image_size: Option<String>,

    /// Directory holding externally stored input images. Defaults to
    /// `<input-stem>_Images/` when it exists.
    #[arg(long)]
    input_images: Option<PathBuf>,

    /// Enable debug logging.
    #[arg(long, short)]
    verbose: bool,
}

fn load_json_file<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let data = fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_str(&data).with_context(|| format!("failed to parse {}", path.display()))
}

fn build_config(args: &Args) -> Result<StereoRectifyConfig> {
    let mut config = match (&args.config, &args.stereo_rectify) {
        (Some(path), _) => load_json_file::<StereoRectifyConfig>(path)?,
        (None, Some(arg)) => StereoRectifyConfig::from_arg(arg)?,
        (None, None) => bail!("either --stereo-rectify or --config is required"),
    };
    if let (Some(_), Some(arg)) = (&args.config, &args.stereo_rectify) {
        let (label, alpha) = parse_label_alpha(arg)?;
        config.target_label = label;
        config.alpha = alpha;
    }
    if let Some(format) = &args.image_format {
        config.image_format = format.clone();
    }
    if let Some(size) = &args.image_size {
        config.output_size = Some(parse_image_size(size)?);
    }
    config.validate()?;
    Ok(config)
}

fn input_images_dir(args: &Args) -> Option<PathBuf> {
    if args.input_images.is_some() {
        return args.input_images.clone();
    }
    let stem = args.input.file_stem()?;
    let dir = args
        .input
        .parent()
        .unwrap_or_else(|| Path::new(""))
        .join(format!("{}_Images", stem.to_string_lossy()));
    dir.is_dir().then_some(dir)
}

fn run(args: &Args, cancel: Arc<AtomicBool>) -> Result<ProcessReport> {
    let config = build_config(args)?;
    info!(
        "rectifying '{}' with alpha {}",
        config.target_label,
        config.alpha.value()
    );

    let input = File::open(&args.input)
        .with_context(|| format!("failed to open input log {}", args.input.display()))?;
    let mut processor =
        StereoRectifyProcessor::new(config, &args.output)?.with_cancel_flag(cancel);
    if let Some(dir) = input_images_dir(args) {
        info!("loading external input images from {}", dir.display());
        processor = processor.with_input_images_dir(dir);
    }

    let output = match File::create(&args.output) {
        Ok(file) => file,
        Err(err) => {
            // Still empty at this point; remove_dir refuses anything else.
            let _ = fs::remove_dir(processor.images_dir());
            return Err(err).with_context(|| {
                format!("failed to create output log {}", args.output.display())
            });
        }
    };
    let mut reader = RawlogReader::new(BufReader::new(input));
    let mut writer = RawlogWriter::new(BufWriter::new(output));

    let report = processor
        .run(&mut reader, &mut writer)
        .with_context(|| format!("failed to process {}", args.input.display()))?;
    writer
        .finish()
        .with_context(|| format!("failed to flush {}", args.output.display()))?;
    Ok(report)
}

fn main() {
    if let Err(err) = try_main() {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}

fn try_main() -> Result<()> {
    let args = Args::parse();

    env_logger::Builder::from_default_env()
        .filter_level(if args.verbose {
            log::LevelFilter::Debug
        } else {
            log::LevelFilter::Info
        })
        .init();

    let cancel = Arc::new(AtomicBool::new(false));
    let flag = cancel.clone();
    ctrlc::set_handler(move || {
        info!("interrupt received, stopping after the current record");
        flag.store(true, Ordering::SeqCst);
    })
    .context("failed to install Ctrl+C handler")?;

    let report = run(&args, cancel)?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rawlog_core::synthetic::stereo_observation;
    use rawlog_core::{ImageSize, LogRecord, Observation, Timestamp, Vec3};
    use rawlog_pipeline::RecordSink;
    use rawlog_rectify::Alpha;

    fn args(dir: &Path, extra: &[&str]) -> Args {
        let input = dir.join("in.jsonl");
        let output = dir.join("out.jsonl");
        let mut argv = vec![
            "rawlog-rectify".to_string(),
            "--input".into(),
            input.to_string_lossy().into_owned(),
            "--output".into(),
            output.to_string_lossy().into_owned(),
        ];
        argv.extend(extra.iter().map(|s| s.to_string()));
        Args::parse_from(argv)
    }

    fn write_input(dir: &Path) {
        let file = File::create(dir.join("in.jsonl")).unwrap();
        let mut writer = RawlogWriter::new(BufWriter::new(file));
        for t in 1..=2 {
            let obs = stereo_observation(
                "BUMBLEBEE",
                Timestamp::from_nanos(t),
                ImageSize::new(32, 24),
                Vec3::new(0.0, 0.0, 0.05),
            );
            writer
                .write_record(&LogRecord::Observation(Observation::StereoImages(obs)))
                .unwrap();
        }
        writer.finish().unwrap();
    }

    #[test]
    fn command_line_overrides_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let cfg_path = dir.path().join("cfg.json");
        fs::write(
            &cfg_path,
            r#"{ "target_label": "LEFTRIGHT", "alpha": 1.0, "image_format": "bmp" }"#,
        )
        .unwrap();
        let cfg_arg = cfg_path.to_string_lossy().into_owned();

        let a = args(
            dir.path(),
            &["--config", cfg_arg.as_str(), "--stereo-rectify", "CAM,0", "--image-size", "64x48"],
        );
        let config = build_config(&a).unwrap();
        assert_eq!(config.target_label, "CAM");
        assert_eq!(config.alpha, Alpha::Fixed(0.0));
        assert_eq!(config.image_format, "bmp");
        assert_eq!(config.output_size, Some(ImageSize::new(64, 48)));
    }

    #[test]
    fn missing_operation_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(build_config(&args(dir.path(), &[])).is_err());
        assert!(build_config(&args(dir.path(), &["--stereo-rectify", "CAM,1.5"])).is_err());
    }

    #[test]
    fn bad_alpha_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        write_input(dir.path());
        let a = args(dir.path(), &["--stereo-rectify", "CAM,2"]);
        assert!(run(&a, Arc::new(AtomicBool::new(false))).is_err());
        assert!(!dir.path().join("out.jsonl").exists());
        assert!(!dir.path().join("out_Images").exists());
    }

    #[test]
    fn unwritable_output_leaves_no_images_dir() {
        let dir = tempfile::tempdir().unwrap();
        write_input(dir.path());
        fs::create_dir(dir.path().join("out.jsonl")).unwrap();
        let a = args(dir.path(), &["--stereo-rectify", "bumblebee,-1"]);
        assert!(run(&a, Arc::new(AtomicBool::new(false))).is_err());
        assert!(!dir.path().join("out_Images").exists());
    }

    #[test]
    fn run_writes_log_images_and_report() {
        let dir = tempfile::tempdir().unwrap();
        write_input(dir.path());
        let a = args(dir.path(), &["--stereo-rectify", "bumblebee,-1"]);
        let report = run(&a, Arc::new(AtomicBool::new(false))).unwrap();
        assert_eq!(report.records, 2);
        assert_eq!(report.rectified, 2);

        let written = fs::read_to_string(dir.path().join("out.jsonl")).unwrap();
        assert_eq!(written.lines().count(), 2);
        assert_eq!(fs::read_dir(dir.path().join("out_Images")).unwrap().count(), 4);

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["rectified"], 2);

        // The image directory now exists, so a second run must refuse.
        assert!(run(&a, Arc::new(AtomicBool::new(false))).is_err());
    }
}
