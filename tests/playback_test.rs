//! Playback synchronization over finalized assets.

mod common;

use common::{finalize_asset, ms, sample};
use metatrack::playback::{PlaybackSession, PlaybackSynchronizer, PlayerEvent};
use metatrack_common::TimedSample;
use std::sync::Arc;
use tempfile::TempDir;

fn payloads(delivered: &[TimedSample]) -> Vec<String> {
    delivered
        .iter()
        .map(|s| String::from_utf8_lossy(s.payload()).into_owned())
        .collect()
}

fn three_sample_asset(dir: &TempDir) -> Arc<metatrack_media::MuxedAsset> {
    Arc::new(finalize_asset(
        dir,
        45,
        vec![sample("A", 0), sample("B", 500), sample("C", 1200)],
    ))
}

#[test]
fn test_advance_delivers_each_sample_once() {
    let dir = TempDir::new().unwrap();
    let asset = three_sample_asset(&dir);
    let mut sync = PlaybackSynchronizer::new(asset);

    let mut delivered = Vec::new();
    sync.advance_to(ms(400), |s| delivered.push(s.clone()));
    assert_eq!(payloads(&delivered), vec!["A"]);

    delivered.clear();
    sync.advance_to(ms(900), |s| delivered.push(s.clone()));
    assert_eq!(payloads(&delivered), vec!["B"]);

    delivered.clear();
    sync.advance_to(ms(2000), |s| delivered.push(s.clone()));
    assert_eq!(payloads(&delivered), vec!["C"]);
    assert!(sync.is_exhausted());

    delivered.clear();
    sync.advance_to(ms(2000), |s| delivered.push(s.clone()));
    assert!(delivered.is_empty());
}

#[test]
fn test_delivered_times_match_recording() {
    let dir = TempDir::new().unwrap();
    let asset = three_sample_asset(&dir);
    let mut sync = PlaybackSynchronizer::new(asset);

    let mut times = Vec::new();
    for step in 0..=20 {
        sync.advance_to(ms(step * 100), |s| times.push(s.presentation_time()));
    }
    assert_eq!(times, vec![ms(0), ms(500), ms(1200)]);
}

#[test]
fn test_seek_skips_sample_at_target() {
    let dir = TempDir::new().unwrap();
    let asset = three_sample_asset(&dir);
    let mut sync = PlaybackSynchronizer::new(asset);

    sync.seek(ms(500));
    assert_eq!(sync.next_index(), 2);

    let mut delivered = Vec::new();
    sync.advance_to(ms(1300), |s| delivered.push(s.clone()));
    assert_eq!(payloads(&delivered), vec!["C"]);
}

#[test]
fn test_seek_backward_replays() {
    let dir = TempDir::new().unwrap();
    let asset = three_sample_asset(&dir);
    let mut sync = PlaybackSynchronizer::new(asset);

    sync.advance_to(ms(2000), |_| {});
    assert!(sync.is_exhausted());

    sync.seek(ms(100));
    let mut delivered = Vec::new();
    sync.advance_to(ms(2000), |s| delivered.push(s.clone()));
    assert_eq!(payloads(&delivered), vec!["B", "C"]);
}

#[test]
fn test_cursors_share_one_asset() {
    let dir = TempDir::new().unwrap();
    let asset = three_sample_asset(&dir);
    let mut first = PlaybackSynchronizer::new(asset.clone());
    let mut second = PlaybackSynchronizer::new(asset.clone());

    let mut a = 0;
    let mut b = 0;
    first.advance_to(ms(600), |_| a += 1);
    second.advance_to(ms(100), |_| b += 1);

    assert_eq!(a, 2);
    assert_eq!(b, 1);
    assert_eq!(Arc::strong_count(&asset), 3);
}

#[tokio::test]
async fn test_session_replays_asset_over_channel() {
    let dir = TempDir::new().unwrap();
    let asset = three_sample_asset(&dir);
    let session = PlaybackSession::new(PlaybackSynchronizer::new(asset));

    let (tx, rx) = tokio::sync::mpsc::channel(16);
    tokio::spawn(async move {
        tx.send(PlayerEvent::Play).await.unwrap();
        tx.send(PlayerEvent::Advance(ms(700))).await.unwrap();
        tx.send(PlayerEvent::Pause).await.unwrap();
        tx.send(PlayerEvent::Advance(ms(1300))).await.unwrap();
        tx.send(PlayerEvent::Play).await.unwrap();
        tx.send(PlayerEvent::Seek(ms(0))).await.unwrap();
        tx.send(PlayerEvent::Advance(ms(100))).await.unwrap();
    });

    let mut delivered = Vec::new();
    let session = session.run(rx, |s| delivered.push(s.clone())).await;

    assert_eq!(payloads(&delivered), vec!["A", "B"]);
    assert!(session.is_playing());
    assert_eq!(session.synchronizer().next_index(), 1);
}
