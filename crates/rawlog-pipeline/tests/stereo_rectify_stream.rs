use std::fs;
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use rawlog_core::synthetic::{stereo_observation, textured_image};
use rawlog_core::{
    ImageField, ImageSize, LogRecord, Observation, OtherObservation, PixelFormat, SensoryFrame,
    StereoImageObservation, StereoSide, Timestamp, Vec3,
};
use rawlog_pipeline::{
    RawlogReader, RawlogWriter, RecordSink, RectifyError, StereoRectifyConfig,
    StereoRectifyProcessor,
};
use rawlog_rectify::{Alpha, RectifyMapError};

const SIZE: ImageSize = ImageSize {
    width: 48,
    height: 32,
};

fn stereo(label: &str, t: u64) -> StereoImageObservation {
    stereo_observation(label, Timestamp::from_nanos(t), SIZE, Vec3::new(0.0, 0.02, 0.05))
}

fn other(kind: &str, label: &str, t: u64) -> Observation {
    let mut fields = serde_json::Map::new();
    fields.insert("voltage".into(), serde_json::json!(12.4));
    Observation::Other(OtherObservation {
        kind: kind.into(),
        sensor_label: label.into(),
        timestamp: Timestamp::from_nanos(t),
        fields,
    })
}

fn scenario() -> Vec<LogRecord> {
    vec![
        LogRecord::Observation(Observation::StereoImages(stereo("CAM1", 1_000_000_001))),
        LogRecord::Frame {
            actions: vec![serde_json::json!({ "odometry": [0.1, 0.0, 0.0] })],
            frame: SensoryFrame {
                observations: vec![
                    Observation::StereoImages(stereo("cam1", 2_000_000_002)),
                    other("gps", "GPS", 2_000_000_003),
                ],
            },
        },
        LogRecord::Observation(Observation::StereoImages(stereo("CAM2", 3_000_000_000))),
    ]
}

fn image_files(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

#[test]
fn end_to_end_rectifies_matching_pairs_only() {
    let tmp = tempfile::tempdir().unwrap();
    let output = tmp.path().join("out.jsonl");
    let config = StereoRectifyConfig::from_arg("CAM1,0").unwrap();
    let mut processor = StereoRectifyProcessor::new(config, &output).unwrap();
    assert_eq!(processor.images_dir(), tmp.path().join("out_Images"));

    let input = scenario();
    let mut sink: Vec<LogRecord> = Vec::new();
    let report = processor
        .run(&mut input.clone().into_iter(), &mut sink)
        .unwrap();

    assert_eq!(report.records, 3);
    assert_eq!(report.observations, 4);
    assert_eq!(report.rectified, 2);
    assert!(processor.map().is_set());

    assert_eq!(
        image_files(&tmp.path().join("out_Images")),
        vec![
            "img_CAM1_1.000000001_left.png",
            "img_CAM1_1.000000001_right.png",
            "img_cam1_2.000000002_left.png",
            "img_cam1_2.000000002_right.png",
        ]
    );

    assert_eq!(sink.len(), input.len());
    // Untouched records and observations pass through unchanged.
    assert_eq!(sink[2], input[2]);
    assert_eq!(sink[1].observations()[1], input[1].observations()[1]);
    match (&sink[1], &input[1]) {
        (LogRecord::Frame { actions: a, .. }, LogRecord::Frame { actions: b, .. }) => {
            assert_eq!(a, b)
        }
        _ => panic!("frame record changed shape"),
    }

    let (left, right) = processor.map().rectified_cameras().unwrap();
    for record in &sink[..2] {
        let Observation::StereoImages(obs) = &record.observations()[0] else {
            panic!("stereo observation changed variant");
        };
        assert_eq!(obs.left_camera, left);
        assert_eq!(obs.right_camera, right);
        for side in StereoSide::BOTH {
            let file = obs.image(side).external_file().unwrap();
            assert!(file.ends_with(&format!("_{side}.png")));
            let decoded = image::open(processor.images_dir().join(file)).unwrap();
            assert_eq!((decoded.width(), decoded.height()), (48, 32));
        }
    }
}

#[test]
fn target_label_on_other_sensor_type_is_ignored() {
    let tmp = tempfile::tempdir().unwrap();
    let output = tmp.path().join("battery.jsonl");
    let config = StereoRectifyConfig::from_arg("CAM1,-1").unwrap();
    let mut processor = StereoRectifyProcessor::new(config, &output).unwrap();

    let input = vec![LogRecord::Observation(other("battery_state", "CAM1", 5))];
    let mut sink: Vec<LogRecord> = Vec::new();
    let report = processor
        .run(&mut input.clone().into_iter(), &mut sink)
        .unwrap();

    assert_eq!(report.rectified, 0);
    assert!(!processor.map().is_set());
    assert_eq!(sink, input);
    assert!(image_files(processor.images_dir()).is_empty());
}

#[test]
fn invalid_alpha_fails_before_creating_directory() {
    let tmp = tempfile::tempdir().unwrap();
    let output = tmp.path().join("out.jsonl");

    assert!(StereoRectifyConfig::from_arg("CAM1,2").is_err());

    let config = StereoRectifyConfig::new("CAM1", Alpha::Fixed(2.0));
    let err = StereoRectifyProcessor::new(config, &output).err().unwrap();
    assert!(matches!(err, RectifyError::Config(_)));
    assert!(!tmp.path().join("out_Images").exists());
}

#[test]
fn existing_image_directory_is_not_reused() {
    let tmp = tempfile::tempdir().unwrap();
    let output = tmp.path().join("out.jsonl");
    fs::create_dir(tmp.path().join("out_Images")).unwrap();

    let config = StereoRectifyConfig::from_arg("CAM1,0").unwrap();
    let err = StereoRectifyProcessor::new(config, &output).err().unwrap();
    assert!(matches!(err, RectifyError::OutputDirExists(_)));
}

#[test]
fn resized_output_and_jpeg_encoding() {
    let tmp = tempfile::tempdir().unwrap();
    let output = tmp.path().join("small.jsonl");
    let mut config = StereoRectifyConfig::from_arg("CAM1,0.5").unwrap();
    config.output_size = Some(ImageSize::new(24, 16));
    config.image_format = "jpg".into();
    let mut processor = StereoRectifyProcessor::new(config, &output).unwrap();

    let mut record = LogRecord::Observation(Observation::StereoImages(stereo("CAM1", 9)));
    assert_eq!(processor.process_record(&mut record).unwrap(), 1);

    let Observation::StereoImages(obs) = &record.observations()[0] else {
        panic!("expected stereo observation");
    };
    assert_eq!((obs.left_camera.ncols, obs.left_camera.nrows), (24, 16));
    let file = obs.image_left.external_file().unwrap();
    assert!(file.ends_with(".jpg"));
    let decoded = image::open(processor.images_dir().join(file)).unwrap();
    assert_eq!((decoded.width(), decoded.height()), (24, 16));
}

#[test]
fn externally_stored_inputs_are_loaded() {
    let tmp = tempfile::tempdir().unwrap();
    let inputs = tmp.path().join("in_Images");
    fs::create_dir(&inputs).unwrap();

    let mut obs = stereo("CAM1", 11);
    for side in StereoSide::BOTH {
        let name = format!("raw_{side}.png");
        textured_image(SIZE, PixelFormat::Luma8, 1)
            .into_dynamic()
            .unwrap()
            .save(inputs.join(&name))
            .unwrap();
        *obs.image_mut(side) = ImageField::External { file: name };
    }

    let config = StereoRectifyConfig::from_arg("CAM1,-1").unwrap();
    let mut processor = StereoRectifyProcessor::new(config, &tmp.path().join("out.jsonl"))
        .unwrap()
        .with_input_images_dir(&inputs);
    let mut record = LogRecord::Observation(Observation::StereoImages(obs));
    assert_eq!(processor.process_record(&mut record).unwrap(), 1);
    assert_eq!(image_files(processor.images_dir()).len(), 2);
}

#[test]
fn external_inputs_without_image_directory_fail() {
    let tmp = tempfile::tempdir().unwrap();
    let mut obs = stereo("CAM1", 12);
    obs.image_left = ImageField::External {
        file: "missing.png".into(),
    };

    let config = StereoRectifyConfig::from_arg("CAM1,-1").unwrap();
    let mut processor =
        StereoRectifyProcessor::new(config, &tmp.path().join("out.jsonl")).unwrap();
    let mut record = LogRecord::Observation(Observation::StereoImages(obs));
    let err = processor.process_record(&mut record).unwrap_err();
    assert!(matches!(
        err,
        RectifyError::Rectify {
            source: RectifyMapError::ImageNotLoaded(StereoSide::Left),
            ..
        }
    ));
}

#[test]
fn raised_cancel_flag_stops_the_run() {
    let tmp = tempfile::tempdir().unwrap();
    let config = StereoRectifyConfig::from_arg("CAM1,0").unwrap();
    let flag = Arc::new(AtomicBool::new(true));
    let mut processor = StereoRectifyProcessor::new(config, &tmp.path().join("out.jsonl"))
        .unwrap()
        .with_cancel_flag(flag);

    let mut sink: Vec<LogRecord> = Vec::new();
    let err = processor
        .run(&mut scenario().into_iter(), &mut sink)
        .unwrap_err();
    assert!(matches!(err, RectifyError::Cancelled { records: 0 }));
    assert!(sink.is_empty());
}

#[test]
fn file_backed_log_roundtrip() {
    let tmp = tempfile::tempdir().unwrap();
    let input_path = tmp.path().join("in.jsonl");
    let output_path = tmp.path().join("out.jsonl");

    let mut writer = RawlogWriter::new(BufWriter::new(File::create(&input_path).unwrap()));
    for record in scenario() {
        writer.write_record(&record).unwrap();
    }
    writer.finish().unwrap();

    let config = StereoRectifyConfig::from_arg("cam1,1").unwrap();
    let mut processor = StereoRectifyProcessor::new(config, &output_path).unwrap();
    let mut reader = RawlogReader::new(BufReader::new(File::open(&input_path).unwrap()));
    let mut writer = RawlogWriter::new(BufWriter::new(File::create(&output_path).unwrap()));
    let report = processor.run(&mut reader, &mut writer).unwrap();
    assert_eq!(writer.records_written(), 3);
    writer.finish().unwrap();
    assert_eq!(report.rectified, 2);

    let reader = RawlogReader::new(BufReader::new(File::open(&output_path).unwrap()));
    let records: Vec<LogRecord> = reader.collect::<Result<_, _>>().unwrap();
    assert_eq!(records.len(), 3);
    assert!(records[0].observations()[0]
        .as_stereo()
        .is_some_and(|s| s.image_left.is_external()));
}

#[test]
fn three_standalone_records_auto_alpha() {
    let tmp = tempfile::tempdir().unwrap();
    let output = tmp.path().join("out.jsonl");
    let config = StereoRectifyConfig::from_arg("CAM1,-1").unwrap();
    let mut processor = StereoRectifyProcessor::new(config, &output).unwrap();

    let other_stereo = stereo("OTHER", 3);
    let input = vec![
        LogRecord::Observation(Observation::StereoImages(stereo("CAM1", 1))),
        LogRecord::Observation(Observation::StereoImages(stereo("CAM1", 2))),
        LogRecord::Observation(Observation::StereoImages(other_stereo)),
    ];
    let mut sink: Vec<LogRecord> = Vec::new();
    let report = processor
        .run(&mut input.clone().into_iter(), &mut sink)
        .unwrap();

    assert_eq!(report.rectified, 2);
    assert_eq!(sink.len(), 3);
    assert_eq!(sink[2], input[2]);
    for record in &sink[..2] {
        let stereo = record.observations()[0].as_stereo().unwrap();
        assert!(stereo.image_left.is_external() && stereo.image_right.is_external());
        assert!(stereo.left_camera.distortion.is_zero());
    }
    assert_eq!(image_files(processor.images_dir()).len(), 4);
}

#[test]
fn untouched_records_survive_the_log_codec_exactly() {
    let mut records = Vec::new();
    for i in 0..200u64 {
        let mut obs = stereo("OTHER", 100 + i);
        obs.left_camera.intrinsics.fx = 500.0 + (i as f64) * 1.618_033_988_749_895 / 3.0;
        obs.right_camera.intrinsics.cy = 16.0 + (i as f64).sqrt() / 7.0;
        records.push(LogRecord::Observation(Observation::StereoImages(obs)));
    }
    let mut obs = stereo("OTHER", 1);
    obs.left_camera.intrinsics.fx = 500.736_410_594_845_15;
    records.push(LogRecord::Observation(Observation::StereoImages(obs)));

    let mut writer = RawlogWriter::new(Vec::new());
    for record in &records {
        writer.write_record(record).unwrap();
    }
    let bytes = writer.finish().unwrap();
    let read: Vec<LogRecord> = RawlogReader::new(bytes.as_slice())
        .collect::<Result<_, _>>()
        .unwrap();

    let mismatches = read.iter().zip(&records).filter(|(a, b)| a != b).count();
    assert_eq!(read.len(), records.len());
    assert_eq!(mismatches, 0);
}
