use super::*;
use crate::{
    config::LapseConfig,
    error::EncodeError,
    events::{EventBus, EventFilter, EventReceiver, LapseEvent},
    settings::TomlSettingsStore,
    upload::{CurlConnector, UploadDispatcher},
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

struct Fixture {
    assembler: TimelapseAssembler,
    event_bus: Arc<EventBus>,
    _root: tempfile::TempDir,
    root: PathBuf,
}

fn fixture(capabilities: EncoderCapabilities) -> Fixture {
    let root_dir = tempfile::tempdir().unwrap();
    let root = root_dir.path().to_path_buf();

    let mut config = LapseConfig::default();
    config.storage.location = root.to_string_lossy().into_owned();
    config.video.hardware_acceleration = false;
    let settings = Arc::new(TomlSettingsStore::in_memory(config));

    let event_bus = Arc::new(EventBus::new(200));
    let shutdown = CancellationToken::new();
    let uploader = Arc::new(UploadDispatcher::new(
        settings.clone(),
        Arc::new(CurlConnector::default()),
        Arc::clone(&event_bus),
    ));
    let assembler = TimelapseAssembler::new(
        settings,
        Arc::new(EncodeQueue::new(shutdown.clone())),
        Arc::new(capabilities),
        uploader,
        Arc::clone(&event_bus),
        shutdown,
    );

    Fixture {
        assembler,
        event_bus,
        _root: root_dir,
        root,
    }
}

fn write_frames(dir: &Path, count: usize) {
    std::fs::create_dir_all(dir).unwrap();
    for i in 0..count {
        std::fs::write(dir.join(format!("capture_{:04}.jpg", i)), b"jpeg").unwrap();
    }
}

fn options_for(dir: &Path, fps: u32) -> TimelapseOptions {
    let mut options = TimelapseOptions::new(
        "test",
        TimelapseInput::Directory(dir.to_path_buf()),
        &crate::config::VideoConfig::default(),
    );
    options.fps = fps;
    options
}

#[tokio::test]
async fn test_unavailable_encoder_fails_fast() {
    let f = fixture(EncoderCapabilities::unavailable("ffmpeg"));
    let mut receiver = EventReceiver::new(
        f.event_bus.subscribe(),
        EventFilter::EventTypes(vec!["timelapse_error"]),
        "test",
    );
    let images = f.root.join("images");
    write_frames(&images, 40);

    let result = f.assembler.assemble(options_for(&images, 30)).await;
    assert!(matches!(result, Err(EncodeError::EncoderUnavailable)));
    assert_eq!(receiver.drain().len(), 1);
}

#[tokio::test]
async fn test_too_few_frames_never_spawns_the_encoder() {
    // Spawning this program would fail with EncoderMissing instead
    let f = fixture(EncoderCapabilities::assume("/nonexistent/ffmpeg", true));
    let images = f.root.join("images");
    write_frames(&images, 3);

    let result = f.assembler.assemble(options_for(&images, 30)).await;
    assert!(matches!(
        result,
        Err(EncodeError::InsufficientFrames {
            found: 3,
            required: 30
        })
    ));

    let empty = f.root.join("empty");
    std::fs::create_dir_all(&empty).unwrap();
    let result = f.assembler.assemble(options_for(&empty, 1)).await;
    assert!(matches!(
        result,
        Err(EncodeError::InsufficientFrames { found: 0, .. })
    ));
    assert!(!f.root.join("videos").join("test.mp4").exists());
}

#[tokio::test]
async fn test_input_must_be_an_existing_directory() {
    let f = fixture(EncoderCapabilities::assume("/nonexistent/ffmpeg", true));

    let missing = f.root.join("missing");
    assert!(matches!(
        f.assembler.assemble(options_for(&missing, 1)).await,
        Err(EncodeError::InputNotFound { .. })
    ));

    let file = f.root.join("file.jpg");
    std::fs::write(&file, b"x").unwrap();
    assert!(matches!(
        f.assembler.assemble(options_for(&file, 1)).await,
        Err(EncodeError::NotADirectory { .. })
    ));
}

#[tokio::test]
async fn test_missing_music_is_rejected() {
    let f = fixture(EncoderCapabilities::assume("/nonexistent/ffmpeg", true));
    let images = f.root.join("images");
    write_frames(&images, 2);

    let mut options = options_for(&images, 1);
    options.music = Some(MusicTrack {
        path: f.root.join("song.mp3"),
        volume: 50,
    });
    assert!(matches!(
        f.assembler.assemble(options).await,
        Err(EncodeError::MusicNotFound { .. })
    ));
}

#[tokio::test]
async fn test_missing_binary_is_reported_as_encoder_missing() {
    let f = fixture(EncoderCapabilities::assume("/nonexistent/ffmpeg", true));
    let images = f.root.join("images");
    write_frames(&images, 2);

    assert!(matches!(
        f.assembler.assemble(options_for(&images, 1)).await,
        Err(EncodeError::EncoderMissing { .. })
    ));
}

#[tokio::test]
async fn test_frame_selection() {
    let dir = tempfile::tempdir().unwrap();
    for name in ["b.jpg", "a.JPEG", "c.png", "notes.txt"] {
        std::fs::write(dir.path().join(name), b"x").unwrap();
    }

    let frames = assembler::collect_frames(&TimelapseInput::Directory(dir.path().to_path_buf()))
        .await
        .unwrap();
    let names: Vec<_> = frames
        .iter()
        .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
        .collect();
    assert_eq!(names, vec!["a.JPEG", "b.jpg"]);

    std::fs::write(dir.path().join("d.webp"), b"x").unwrap();
    let listed = assembler::collect_frames(&TimelapseInput::Images(vec![
        dir.path().join("c.png"),
        dir.path().join("b.jpg"),
        dir.path().join("d.webp"),
        dir.path().join("notes.txt"),
        dir.path().join("gone.jpg"),
    ]))
    .await
    .unwrap();
    assert_eq!(
        listed,
        vec![
            dir.path().join("c.png"),
            dir.path().join("b.jpg"),
            dir.path().join("d.webp")
        ]
    );
}

#[test]
fn test_partial_output_is_a_hidden_sibling() {
    assert_eq!(
        assembler::partial_path(Path::new("/videos/auto-timelapse.mp4")),
        PathBuf::from("/videos/.auto-timelapse.partial.mp4")
    );
    assert_eq!(
        assembler::partial_path(Path::new("clip")),
        PathBuf::from(".clip.partial")
    );
}

#[cfg(unix)]
mod fake_encoder {
    use super::*;
    use std::os::unix::fs::PermissionsExt;

    fn install_script(dir: &Path, body: &str) -> String {
        let path = dir.join("fake-ffmpeg");
        std::fs::write(&path, format!("#!/bin/sh\n{}", body)).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path.to_string_lossy().into_owned()
    }

    #[tokio::test]
    async fn test_successful_encode_reports_progress_and_completion() {
        let bin = tempfile::tempdir().unwrap();
        let program = install_script(
            bin.path(),
            "for last; do :; done\n\
             echo frame=2\n\
             echo frame=4\n\
             echo progress=end\n\
             printf video > \"$last\"\n",
        );
        let f = fixture(EncoderCapabilities::assume(&program, true));
        let mut receiver = EventReceiver::new(
            f.event_bus.subscribe(),
            EventFilter::EventTypes(vec!["timelapse_progress", "timelapse_complete"]),
            "test",
        );
        let images = f.root.join("images");
        write_frames(&images, 4);

        let output = f.assembler.assemble(options_for(&images, 2)).await.unwrap();
        assert_eq!(output.frame_count, 4);
        assert_eq!(output.output_path, f.root.join("videos").join("test.mp4"));
        assert_eq!(std::fs::read(&output.output_path).unwrap(), b"video");

        let events = receiver.drain();
        let percents: Vec<u8> = events
            .iter()
            .filter_map(|event| match event {
                LapseEvent::TimelapseProgress { percent, .. } => Some(*percent),
                _ => None,
            })
            .collect();
        assert_eq!(percents, vec![50, 100]);
        assert!(matches!(
            events.last(),
            Some(LapseEvent::TimelapseComplete { is_auto: false, filename, .. }) if filename == "test.mp4"
        ));
    }

    #[tokio::test]
    async fn test_failed_encode_removes_partial_output() {
        let bin = tempfile::tempdir().unwrap();
        let program = install_script(
            bin.path(),
            "for last; do :; done\n\
             printf partial > \"$last\"\n\
             echo 'Input #0, concat' >&2\n\
             echo 'Error while decoding stream' >&2\n\
             exit 3\n",
        );
        let f = fixture(EncoderCapabilities::assume(&program, true));
        let images = f.root.join("images");
        write_frames(&images, 2);
        let videos = f.root.join("videos");
        std::fs::create_dir_all(&videos).unwrap();
        std::fs::write(videos.join("test.mp4"), b"previous").unwrap();

        match f.assembler.assemble(options_for(&images, 1)).await {
            Err(EncodeError::EncodingFailed { code, diagnostics }) => {
                assert_eq!(code, Some(3));
                assert_eq!(diagnostics, "Error while decoding stream");
            }
            other => panic!("unexpected result {:?}", other),
        }
        assert_eq!(std::fs::read(videos.join("test.mp4")).unwrap(), b"previous");
        assert!(!videos.join(".test.partial.mp4").exists());
    }
}
