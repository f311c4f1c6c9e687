/*!
 * Integration tests for job lifecycle: progress, locking and failure reporting
 */

use anyhow::Result;
use std::fs;
use std::sync::Arc;
use std::time::Duration;

use recapper::app_controller::clean_output;
use recapper::errors::RecapError;
use recapper::progress::{JobProgress, JobStatus, RunLock, LOCK_FILE, LOG_FILE, PROGRESS_FILE};
use recapper::providers::diarization::DiarizationCapability;
use recapper::recap::timeline::{SCENES_FILE, TRANSCRIPT_FILE, VIDEO_FILE};
use recapper::RecapScene;
use crate::common::mock_providers::{FakeMediaBackend, MockSummarizer};
use crate::common::{self, Workspace};

fn three_episodes() -> Result<Workspace> {
    let ws = Workspace::new()?;
    ws.add_numbered_episode("show_1_1.mp4", 1)?;
    ws.add_numbered_episode("show_1_2.mp4", 2)?;
    ws.add_numbered_episode("show_1_3.mp4", 3)?;
    Ok(ws)
}

/// The run log never goes backwards and ends at 100%
#[tokio::test]
async fn test_run_progressLog_shouldBeMonotonicAndFinishAtHundred() -> Result<()> {
    common::init_logging();
    let ws = three_episodes()?;
    let media = Arc::new(FakeMediaBackend::new().with_render_delay(Duration::from_millis(60)));

    ws.controller(Arc::new(MockSummarizer::echo()), DiarizationCapability::Off, media)
        .run(None)
        .await?;

    let values = common::log_percentages(&ws.output(LOG_FILE))?;
    assert!(values.len() > 5);
    assert_eq!(values[0], 0);
    assert_eq!(values.last().copied(), Some(100));
    assert!(values.windows(2).all(|w| w[0] <= w[1]), "progress went backwards: {:?}", values);

    let log = fs::read_to_string(ws.output(LOG_FILE))?;
    assert!(log.contains("Rendering recap video (~"), "render timer should report while encoding");
    assert!(log.contains("[1/3] show_1_1.mp4: 2 candidate segment(s)"));
    Ok(())
}

/// Subscribers follow the run until its terminal snapshot
#[tokio::test]
async fn test_execute_withSubscriber_shouldDeliverSnapshotsUntilDone() -> Result<()> {
    let ws = three_episodes()?;
    let controller = ws.controller(
        Arc::new(MockSummarizer::echo()),
        DiarizationCapability::Off,
        Arc::new(FakeMediaBackend::new()),
    );

    let prepared = controller.prepare_run()?;
    let run_id = prepared.run_id().to_string();
    let mut receiver = prepared.subscribe();
    let collector = tokio::spawn(async move {
        let mut seen = Vec::new();
        while receiver.changed().await.is_ok() {
            let snapshot = receiver.borrow_and_update().clone();
            let terminal = snapshot.status.is_terminal();
            seen.push(snapshot);
            if terminal {
                break;
            }
        }
        seen
    });

    let report = controller.execute(prepared, None).await?;
    let seen = collector.await?;

    assert_eq!(report.run_id, run_id);
    let last = seen.last().expect("at least one snapshot");
    assert_eq!(last.status, JobStatus::Done);
    assert_eq!(last.progress, 1.0);
    assert!(seen.windows(2).all(|w| w[0].progress <= w[1].progress));
    assert!(seen.iter().all(|s| s.run_id.as_deref() == Some(run_id.as_str())));
    Ok(())
}

/// A second run against a locked output area is rejected without touching it
#[tokio::test]
async fn test_run_whileLocked_shouldFailWithoutTouchingProgress() -> Result<()> {
    let ws = three_episodes()?;
    let lock = RunLock::acquire(&ws.config.paths.output_dir)?;
    let previous = r#"{"progress": 0.3, "status": "running", "message": "other run"}"#;
    common::create_test_file(&ws.config.paths.output_dir, PROGRESS_FILE, previous)?;

    let result = ws
        .controller(
            Arc::new(MockSummarizer::echo()),
            DiarizationCapability::Off,
            Arc::new(FakeMediaBackend::new()),
        )
        .run(None)
        .await;

    assert!(matches!(result, Err(RecapError::AlreadyRunning(_))));
    assert_eq!(fs::read_to_string(ws.output(PROGRESS_FILE))?, previous);
    assert!(!ws.output(LOG_FILE).exists());

    drop(lock);
    assert!(!RunLock::is_held(&ws.config.paths.output_dir));
    Ok(())
}

/// Successful and failed runs both release the lock and clean their scratch space
#[tokio::test]
async fn test_run_afterCompletion_shouldLeaveOnlyArtifacts() -> Result<()> {
    let ws = three_episodes()?;

    ws.controller(
        Arc::new(MockSummarizer::echo()),
        DiarizationCapability::Off,
        Arc::new(FakeMediaBackend::new()),
    )
    .run(None)
    .await?;

    assert_eq!(
        common::dir_entries(&ws.config.paths.output_dir)?,
        vec![PROGRESS_FILE, SCENES_FILE, LOG_FILE, VIDEO_FILE, TRANSCRIPT_FILE]
    );
    Ok(())
}

/// Failed clips are dropped from the video and from the metadata
#[tokio::test]
async fn test_run_withFailingClips_shouldDropThemFromMetadata() -> Result<()> {
    let ws = three_episodes()?;
    let media = Arc::new(FakeMediaBackend::new().with_failing_clips("show_1_2.mp4"));

    let report = ws
        .controller(Arc::new(MockSummarizer::echo()), DiarizationCapability::Off, media.clone())
        .run(None)
        .await?;

    assert_eq!(report.selected, 6);
    assert_eq!(report.scenes.len(), 4);
    let dropped_orders: Vec<usize> = report.dropped_clips.iter().map(|d| d.order).collect();
    assert_eq!(dropped_orders, vec![2, 3]);
    assert!(report.dropped_clips.iter().all(|d| d.file == "show_1_2.mp4"));

    let scenes: Vec<RecapScene> = serde_json::from_str(&fs::read_to_string(ws.output(SCENES_FILE))?)?;
    assert_eq!(scenes.len(), 4);
    assert!(scenes.iter().all(|s| s.file != "show_1_2.mp4"));
    assert_eq!(fs::read_to_string(ws.output(TRANSCRIPT_FILE))?.lines().count(), 4);
    assert_eq!(media.renders()[0].clips.len(), 4);
    assert!((report.duration - 12.0).abs() < 1e-9);

    let log = fs::read_to_string(ws.output(LOG_FILE))?;
    assert!(log.contains("dropped: ffmpeg failed: Error while decoding stream #0:0"));
    assert_eq!(JobProgress::read(&ws.config.paths.output_dir)?.status, JobStatus::Done);
    Ok(())
}

/// Fades follow the surviving clips: the new first and last clips are not faded at the outer edges
#[tokio::test]
async fn test_run_withFirstAndLastSourcesFailing_shouldFadeOnlySurvivingInnerBoundaries() -> Result<()> {
    let ws = three_episodes()?;
    ws.add_numbered_episode("show_1_4.mp4", 4)?;
    let media = Arc::new(
        FakeMediaBackend::new()
            .with_failing_clips("show_1_1.mp4")
            .with_failing_clips("show_1_4.mp4"),
    );

    let report = ws
        .controller(Arc::new(MockSummarizer::echo()), DiarizationCapability::Off, media.clone())
        .run(None)
        .await?;

    assert_eq!(report.selected, 8);
    assert_eq!(report.scenes.len(), 4);
    let renders = media.renders();
    let fades: Vec<(f64, f64)> = renders[0].clips.iter().map(|c| (c.fade_in, c.fade_out)).collect();
    assert_eq!(fades, vec![(0.0, 1.0), (1.0, 1.0), (1.0, 1.0), (1.0, 0.0)]);
    Ok(())
}

/// An injected config with a zero progress interval still renders
#[tokio::test]
async fn test_run_withZeroProgressInterval_shouldComplete() -> Result<()> {
    let mut ws = three_episodes()?;
    ws.config.render.progress_interval_ms = 0;
    let media = Arc::new(FakeMediaBackend::new().with_render_delay(Duration::from_millis(20)));

    let report = ws
        .controller(Arc::new(MockSummarizer::echo()), DiarizationCapability::Off, media)
        .run(None)
        .await?;

    assert_eq!(report.scenes.len(), 6);
    assert_eq!(JobProgress::read(&ws.config.paths.output_dir)?.status, JobStatus::Done);
    Ok(())
}

/// Every clip failing ends the run in error without a render
#[tokio::test]
async fn test_run_withAllClipsFailing_shouldEndInError() -> Result<()> {
    let ws = Workspace::new()?;
    ws.add_numbered_episode("show_1_1.mp4", 1)?;
    let media = Arc::new(FakeMediaBackend::new().with_failing_clips("show_1_1.mp4"));

    let result = ws
        .controller(Arc::new(MockSummarizer::echo()), DiarizationCapability::Off, media.clone())
        .run(None)
        .await;

    assert!(matches!(result, Err(RecapError::NoSurvivingClips)));
    assert!(media.renders().is_empty());
    assert!(!ws.output(VIDEO_FILE).exists());
    assert!(!ws.output(SCENES_FILE).exists());
    assert_eq!(JobProgress::read(&ws.config.paths.output_dir)?.status, JobStatus::Error);
    Ok(())
}

/// A render failure is terminal and leaves no partial artifacts
#[tokio::test]
async fn test_run_withRenderFailure_shouldEndInErrorWithoutArtifacts() -> Result<()> {
    let ws = three_episodes()?;
    let media = Arc::new(FakeMediaBackend::new().with_render_failure());

    let result = ws
        .controller(Arc::new(MockSummarizer::echo()), DiarizationCapability::Off, media)
        .run(None)
        .await;

    match result {
        Err(RecapError::Render(message)) => assert!(message.contains("Conversion failed!")),
        other => panic!("expected a render error, got {:?}", other.map(|r| r.run_id)),
    }
    let progress = JobProgress::read(&ws.config.paths.output_dir)?;
    assert_eq!(progress.status, JobStatus::Error);
    assert!(progress.message.starts_with("Failed to render recap video"));
    assert_eq!(common::dir_entries(&ws.config.paths.output_dir)?, vec![PROGRESS_FILE, LOG_FILE]);
    Ok(())
}

/// A failing summarizer ends the run in error
#[tokio::test]
async fn test_run_withFailingSummarizer_shouldEndInError() -> Result<()> {
    let ws = three_episodes()?;

    let result = ws
        .controller(
            Arc::new(MockSummarizer::failing()),
            DiarizationCapability::Off,
            Arc::new(FakeMediaBackend::new()),
        )
        .run(None)
        .await;

    assert!(matches!(result, Err(RecapError::Summarizer(_))));
    let progress = JobProgress::read(&ws.config.paths.output_dir)?;
    assert_eq!(progress.status, JobStatus::Error);
    assert!(progress.message.contains("mock summarizer down"));
    Ok(())
}

/// Artifacts of an earlier run do not survive a failed run
#[tokio::test]
async fn test_run_withStaleArtifacts_shouldRemoveThemEvenOnFailure() -> Result<()> {
    let ws = Workspace::new()?;
    ws.add_episode("show_1_1.mp4", None)?;
    common::create_test_file(&ws.config.paths.output_dir, VIDEO_FILE, "old recap")?;
    common::create_test_file(&ws.config.paths.output_dir, SCENES_FILE, "[]")?;

    let result = ws
        .controller(
            Arc::new(MockSummarizer::echo()),
            DiarizationCapability::Off,
            Arc::new(FakeMediaBackend::new()),
        )
        .run(None)
        .await;

    assert!(matches!(result, Err(RecapError::NoPairs { .. })));
    assert!(!ws.output(VIDEO_FILE).exists());
    assert!(!ws.output(SCENES_FILE).exists());
    Ok(())
}

/// Dropping a run mid-flight still leaves a terminal record and a free output area
#[tokio::test]
async fn test_run_whenCancelled_shouldWriteErrorRecordAndReleaseLock() -> Result<()> {
    let ws = three_episodes()?;
    let media = Arc::new(FakeMediaBackend::new().with_render_delay(Duration::from_secs(5)));
    let controller = ws.controller(Arc::new(MockSummarizer::echo()), DiarizationCapability::Off, media);

    let outcome = tokio::time::timeout(Duration::from_millis(200), controller.run(None)).await;
    assert!(outcome.is_err(), "run should still be rendering");

    let progress = JobProgress::read(&ws.config.paths.output_dir)?;
    assert_eq!(progress.status, JobStatus::Error);
    assert_eq!(progress.message, "Run aborted unexpectedly");
    assert!(!RunLock::is_held(&ws.config.paths.output_dir));
    assert!(!ws.output(VIDEO_FILE).exists());
    Ok(())
}

/// Status reports idle before any run and the terminal record afterwards
#[tokio::test]
async fn test_status_beforeAndAfterRun_shouldReflectRecord() -> Result<()> {
    let ws = three_episodes()?;
    let controller = ws.controller(
        Arc::new(MockSummarizer::echo()),
        DiarizationCapability::Off,
        Arc::new(FakeMediaBackend::new()),
    );

    assert_eq!(controller.status()?, JobProgress::idle());
    controller.run(None).await?;
    assert_eq!(controller.status()?.status, JobStatus::Done);
    Ok(())
}

/// Cleaning respects a held lock unless forced
#[tokio::test]
async fn test_clean_output_shouldRespectLockUnlessForced() -> Result<()> {
    let ws = three_episodes()?;
    let output_dir = ws.config.paths.output_dir.clone();
    ws.controller(
        Arc::new(MockSummarizer::echo()),
        DiarizationCapability::Off,
        Arc::new(FakeMediaBackend::new()),
    )
    .run(None)
    .await?;

    assert_eq!(clean_output(&output_dir, false)?, 5);
    assert_eq!(JobProgress::read(&output_dir)?, JobProgress::idle());

    // a stale lock left by a crashed process
    common::create_test_file(&output_dir, LOCK_FILE, "12345")?;
    common::create_test_file(&output_dir, VIDEO_FILE, "partial")?;
    assert!(matches!(clean_output(&output_dir, false), Err(RecapError::AlreadyRunning(_))));
    assert!(ws.output(VIDEO_FILE).exists());

    assert_eq!(clean_output(&output_dir, true)?, 2);
    assert!(!RunLock::is_held(&output_dir));
    Ok(())
}
