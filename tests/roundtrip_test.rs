//! Finalize, store and reopen recordings.

mod common;

use assert_matches::assert_matches;
use common::{finalize_asset, ms, sample};
use metatrack::store::{AssetHandle, AssetStore, DirectoryAssetStore, MemoryAssetStore};
use metatrack::Error;
use metatrack_common::{AssetId, MediaTime};
use metatrack_media::{Mp4File, MuxedAsset, MuxerConfig, TrackMuxer, VideoStream};
use std::io::{Read, Seek, SeekFrom};
use tempfile::TempDir;

#[test]
fn test_persisted_asset_reopens_identically() {
    let dir = TempDir::new().unwrap();
    let mut asset = finalize_asset(
        &dir,
        30,
        vec![sample("one", 0), sample("two", 250), sample("three", 900)],
    );
    assert!(asset.is_pending());

    let dest = dir.path().join("kept.mp4");
    asset.persist(&dest).unwrap();
    assert!(!asset.is_pending());

    let reopened = MuxedAsset::open(&dest).unwrap();
    assert_eq!(reopened.timescale(), asset.timescale());
    assert_eq!(reopened.duration(), asset.duration());
    assert_eq!(reopened.metadata_track(), asset.metadata_track());
    assert_eq!(reopened.metadata_mime(), Some("application/json"));
    assert_eq!(
        reopened.video_track().sample_table.sample_count,
        asset.video_track().sample_table.sample_count
    );
}

#[test]
fn test_metadata_readable_from_sample_tables() {
    let dir = TempDir::new().unwrap();
    let mut asset = finalize_asset(&dir, 30, vec![sample("x", 100), sample("yz", 400)]);
    let dest = dir.path().join("plain.mp4");
    asset.persist(&dest).unwrap();

    // Read the file with nothing but the container structure.
    let mp4 = Mp4File::open(&dest).unwrap();
    assert_eq!(mp4.timescale, 600);
    assert!(!mp4.has_faststart);

    let video = mp4.video_track.as_ref().unwrap();
    let meta = mp4.metadata_track.as_ref().unwrap();
    assert_eq!(video.timescale, meta.timescale);
    assert_eq!(meta.sample_entry_str(), Some("mett"));
    assert_eq!(meta.mime_format.as_deref(), Some("application/json"));

    let mut file = std::fs::File::open(&dest).unwrap();
    let mut pairs = Vec::new();
    for entry in meta.sample_table.iter() {
        let mut buf = vec![0u8; entry.size as usize];
        file.seek(SeekFrom::Start(entry.offset)).unwrap();
        file.read_exact(&mut buf).unwrap();
        pairs.push((String::from_utf8(buf).unwrap(), entry.pts()));
    }
    assert_eq!(pairs, vec![("x".to_string(), 60), ("yz".to_string(), 240)]);
}

#[test]
fn test_video_frames_survive_mux() {
    let dir = TempDir::new().unwrap();
    let asset = finalize_asset(&dir, 25, Vec::new());
    let video = asset.video_track();

    assert_eq!(video.sample_table.sample_count, 25);
    assert_eq!(video.sample_table.keyframe_indices(), vec![0, 10, 20]);
    assert_eq!(video.sample_table.total_size(), 25 * 64);
    let pts: Vec<u64> = video.sample_table.iter().map(|s| s.pts()).collect();
    assert_eq!(pts, (0..25).map(|i| i * 20).collect::<Vec<u64>>());
    assert_eq!(asset.duration(), MediaTime::new(500, 600));
}

#[test]
fn test_unsorted_metadata_leaves_no_file() {
    let dir = TempDir::new().unwrap();
    let muxer = TrackMuxer::new(MuxerConfig {
        output_dir: dir.path().to_path_buf(),
        ..MuxerConfig::default()
    })
    .unwrap();

    let video = VideoStream::empty().unwrap();
    let err = muxer
        .finalize(video, vec![sample("b", 200), sample("a", 100)])
        .unwrap_err();
    assert_matches!(
        err,
        metatrack_media::Error::UnsortedSamples { index: 1, .. }
    );
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
}

#[test]
fn test_directory_store_lifecycle() {
    let dir = TempDir::new().unwrap();
    let store = DirectoryAssetStore::new(dir.path().join("assets")).unwrap();
    assert!(store.list().unwrap().is_empty());

    let asset = finalize_asset(&dir, 10, vec![sample("m", 50)]);
    let handle = store.store(asset).unwrap();
    assert!(store.path_for(&handle.id).exists());
    assert_eq!(store.list().unwrap(), vec![handle]);

    let fetched = store.fetch(&handle).unwrap();
    assert!(!fetched.is_pending());
    assert_eq!(fetched.metadata_track().len(), 1);
    assert_eq!(fetched.metadata_track()[0].presentation_time(), ms(50));

    store.remove(&handle).unwrap();
    assert_matches!(store.fetch(&handle), Err(Error::NotFound(id)) if id == handle.id);
    assert_matches!(store.remove(&handle), Err(Error::NotFound(_)));
}

#[test]
fn test_directory_store_ignores_foreign_files() {
    let dir = TempDir::new().unwrap();
    let store = DirectoryAssetStore::new(dir.path()).unwrap();
    std::fs::write(dir.path().join("notes.txt"), b"hello").unwrap();
    std::fs::write(dir.path().join("not-a-uuid.mp4"), b"junk").unwrap();

    assert!(store.list().unwrap().is_empty());
}

#[test]
fn test_memory_store_lifecycle() {
    let dir = TempDir::new().unwrap();
    let store = MemoryAssetStore::new();

    let handle = store
        .store(finalize_asset(&dir, 5, vec![sample("a", 0)]))
        .unwrap();
    assert_eq!(store.len(), 1);
    assert_eq!(store.fetch(&handle).unwrap().metadata_track().len(), 1);

    let missing = AssetHandle::new(AssetId::new());
    assert_matches!(store.fetch(&missing), Err(Error::NotFound(_)));

    store.remove(&handle).unwrap();
    assert!(store.is_empty());
}
