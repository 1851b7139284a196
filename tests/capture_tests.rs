// Integration tests for the audio capture pipeline

mod common;

use std::sync::{Arc, Mutex};
use std::time::Duration;

use common::{Counters, FakeInput};
use live_voice::audio::capture::rms;
use live_voice::audio::codec;
use live_voice::{AudioCapture, AudioFrame, CaptureConfig};
use tokio::sync::mpsc;

fn capture(counters: Counters) -> (AudioCapture, Arc<Mutex<Option<mpsc::Sender<Vec<f32>>>>>) {
    let feed = Arc::new(Mutex::new(None));
    let input = FakeInput::new(false, counters, Arc::clone(&feed));
    let config = CaptureConfig {
        frame_size: 256,
        sample_rate: 16000,
    };
    (AudioCapture::new(Box::new(input), config), feed)
}

async fn push(feed: &Arc<Mutex<Option<mpsc::Sender<Vec<f32>>>>>, samples: Vec<f32>) {
    let tx = feed.lock().unwrap().clone().expect("capture not started");
    tx.send(samples).await.unwrap();
}

async fn recv(frames: &mut mpsc::UnboundedReceiver<(AudioFrame, f32)>) -> Option<(AudioFrame, f32)> {
    tokio::time::timeout(Duration::from_millis(500), frames.recv())
        .await
        .ok()
        .flatten()
}

#[tokio::test]
async fn test_frames_only_flow_while_gate_is_open() -> anyhow::Result<()> {
    let (mut capture, feed) = capture(Counters::default());
    let (tx, mut frames) = mpsc::unbounded_channel();

    capture
        .start(move |frame, loudness| {
            let _ = tx.send((frame, loudness));
        })
        .await?;

    // Captured before the session opened: discarded
    push(&feed, vec![0.5; 256]).await;
    assert!(recv(&mut frames).await.is_none());

    capture.gate().open();
    push(&feed, vec![0.5; 256]).await;

    let (frame, loudness) = recv(&mut frames).await.expect("frame after gate opened");
    assert_eq!(frame.sequence, 0);
    assert_eq!(frame.sample_count, 256);
    assert_eq!(frame.sample_rate, 16000);
    assert!((frame.duration_secs() - 0.016).abs() < 1e-9);
    assert_eq!(frame.pcm.len(), 512);
    assert_eq!(codec::decode(&frame.pcm)?, vec![0.5; 256]);
    assert!((loudness - 0.5).abs() < 1e-6);
    assert_eq!(capture.frames_delivered(), 1);

    capture.stop().await;
    Ok(())
}

#[tokio::test]
async fn test_blocks_are_cut_into_fixed_frames() -> anyhow::Result<()> {
    let (mut capture, feed) = capture(Counters::default());
    let (tx, mut frames) = mpsc::unbounded_channel();

    capture.gate().open();
    capture
        .start(move |frame, loudness| {
            let _ = tx.send((frame, loudness));
        })
        .await?;

    // 100 + 300 + 112 = 512 samples = two frames
    push(&feed, vec![0.1; 100]).await;
    push(&feed, vec![0.1; 300]).await;
    push(&feed, vec![0.1; 112]).await;

    let (first, _) = recv(&mut frames).await.expect("first frame");
    let (second, _) = recv(&mut frames).await.expect("second frame");

    assert_eq!(first.sequence, 0);
    assert_eq!(second.sequence, 1);
    assert_eq!(first.timestamp_ms, 0);
    assert_eq!(second.timestamp_ms, 16);
    assert!(recv(&mut frames).await.is_none());

    capture.stop().await;
    Ok(())
}

#[tokio::test]
async fn test_stop_is_idempotent() -> anyhow::Result<()> {
    let counters = Counters::default();
    let (mut capture, _feed) = capture(counters.clone());

    // Stopping before start releases nothing
    capture.stop().await;
    assert_eq!(counters.stops(), 0);

    capture.start(|_, _| {}).await?;
    assert!(capture.is_capturing());
    assert_eq!(counters.starts(), 1);

    capture.stop().await;
    capture.stop().await;

    assert!(!capture.is_capturing());
    assert!(!capture.gate().is_open());
    assert_eq!(counters.stops(), 1);
    Ok(())
}

#[tokio::test]
async fn test_unavailable_microphone() {
    let feed = Arc::new(Mutex::new(None));
    let input = FakeInput::new(true, Counters::default(), feed);
    let mut capture = AudioCapture::new(Box::new(input), CaptureConfig::default());

    let result = capture.start(|_, _| {}).await;

    assert!(matches!(
        result,
        Err(live_voice::AudioError::DeviceUnavailable(_))
    ));
    assert!(!capture.is_capturing());
}

#[test]
fn test_rms() {
    assert_eq!(rms(&[]), 0.0);
    assert_eq!(rms(&[0.0; 64]), 0.0);
    assert!((rms(&[0.5, -0.5, 0.5, -0.5]) - 0.5).abs() < 1e-6);
}
