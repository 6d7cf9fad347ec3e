//! Integration tests for queue membership, edits, ordering and release.

mod common;

use std::collections::HashSet;

use assert_matches::assert_matches;
use common::{audio_file, drain, png_file, video_file, TestHarness, NORMALIZED_DIMENSIONS, VIDEO_DIMENSIONS};
use mediaforge::conversion::{ConversionOutcome, ItemEdit, StatusKind};
use mediaforge::{ConvertAllSummary, InputFile};
use mf_core::events::EventPayload;
use mf_core::{Dimensions, MediaCategory, OutputFormat};

#[tokio::test]
async fn add_files_rejects_unsupported_and_keeps_order() {
    let h = TestHarness::new();
    let mut rx = h.events.subscribe();

    let ids = h
        .queue
        .add_files(vec![
            png_file("a.png", 64, 48),
            InputFile::new("notes.txt", "", b"hello".to_vec()),
            video_file("b.mp4"),
            InputFile::new("mystery", "", b"??".to_vec()),
            audio_file("c.mp3"),
        ])
        .await;
    assert_eq!(ids.len(), 3);

    let items = h.queue.items();
    let names: Vec<&str> = items.iter().map(|i| i.name.as_str()).collect();
    assert_eq!(names, ["a.png", "b.mp4", "c.mp3"]);
    assert_eq!(items.iter().map(|i| i.id).collect::<Vec<_>>(), ids);

    assert_eq!(items[0].output_format, OutputFormat::Jpg);
    assert_eq!(items[0].original, Some(Dimensions::new(64, 48)));
    assert_eq!(items[1].output_format, OutputFormat::Mp4);
    assert_eq!(items[1].original, Some(VIDEO_DIMENSIONS));
    assert_eq!(items[2].category, MediaCategory::Audio);
    assert_eq!(items[2].original, None);
    assert!(items.iter().all(|i| i.status == StatusKind::Pending));

    let rejected: Vec<String> = drain(&mut rx)
        .into_iter()
        .filter_map(|e| match e.payload {
            EventPayload::ItemRejected { name, .. } => Some(name),
            _ => None,
        })
        .collect();
    assert_eq!(rejected, ["notes.txt", "mystery"]);
}

#[tokio::test]
async fn corrupt_image_is_accepted_without_dimensions() {
    let h = TestHarness::new();
    let id = h
        .add(InputFile::new("broken.png", "image/png", b"not a png".to_vec()))
        .await;
    assert_eq!(h.queue.item(id).unwrap().original, None);
}

#[tokio::test]
async fn heic_without_declared_type_is_normalised_for_probe_and_convert() {
    let h = TestHarness::new();
    let id = h
        .add(InputFile::new("photo.heic", "", b"\0\0\0\x18ftypheic".to_vec()))
        .await;

    let item = h.queue.item(id).unwrap();
    assert_eq!(item.effective_mime, "image/heic");
    assert!(item.legacy);
    assert_eq!(item.original, Some(NORMALIZED_DIMENSIONS));
    assert_eq!(*h.normalizer.qualities.lock(), vec![0.5]);

    let outcome = h.queue.convert_item(id).await.unwrap();
    assert_eq!(outcome, ConversionOutcome::Completed);
    assert_eq!(*h.normalizer.qualities.lock(), vec![0.5, 0.95]);

    let download = h.queue.download(id).unwrap();
    assert_eq!(download.file_name, "photo.jpg");
    assert_eq!(download.mime_type, "image/jpeg");
}

#[tokio::test]
async fn aspect_lock_round_trip_through_queue() {
    let h = TestHarness::new();
    let id = h.add(video_file("clip.mp4")).await;

    h.queue.update_item(id, ItemEdit::Width(Some(960))).unwrap();
    assert_eq!(h.queue.item(id).unwrap().target_height, Some(540));

    h.queue.update_item(id, ItemEdit::Height(Some(540))).unwrap();
    let item = h.queue.item(id).unwrap();
    assert_eq!((item.target_width, item.target_height), (Some(960), Some(540)));
}

#[tokio::test]
async fn edits_are_validated() {
    let h = TestHarness::new();
    let id = h.add(audio_file("song.mp3")).await;

    assert_matches!(
        h.queue.update_item(id, ItemEdit::OutputFormat(OutputFormat::Mp4)),
        Err(mf_core::Error::Validation(_))
    );
    assert_matches!(
        h.queue.update_item(id, ItemEdit::Height(Some(0))),
        Err(mf_core::Error::Validation(_))
    );
    assert_matches!(
        h.queue.update_item(mf_core::ItemId::new(), ItemEdit::MaintainAspectRatio(false)),
        Err(mf_core::Error::NotFound { .. })
    );

    h.queue.update_item(id, ItemEdit::OutputFormat(OutputFormat::Aac)).unwrap();
    assert_eq!(h.queue.item(id).unwrap().output_format, OutputFormat::Aac);
}

#[tokio::test]
async fn convert_all_is_strictly_sequential() {
    let h = TestHarness::new();
    h.add(png_file("a.png", 20, 10)).await;
    h.add(video_file("b.mp4")).await;
    h.add(png_file("c.png", 10, 20)).await;

    let mut rx = h.events.subscribe();
    let summary = h.queue.convert_all().await;
    assert_eq!(summary.completed, 3);

    let mut current = None;
    let mut finished = Vec::new();
    for event in drain(&mut rx) {
        match event.payload {
            EventPayload::ConversionStarted { item_id } => {
                assert_eq!(current, None, "conversion started while another was running");
                current = Some(item_id);
            }
            EventPayload::ConversionProgress { item_id, .. } => {
                assert_eq!(current, Some(item_id));
            }
            EventPayload::ConversionCompleted { item_id, .. }
            | EventPayload::ConversionFailed { item_id, .. } => {
                assert_eq!(current, Some(item_id));
                current = None;
                finished.push(item_id);
            }
            _ => {}
        }
    }

    let order: Vec<_> = h.queue.items().iter().map(|i| i.id).collect();
    assert_eq!(finished, order);
    assert!(*h.engine.max_active.lock() <= 1);
}

#[tokio::test]
async fn one_failure_does_not_stop_the_run() {
    let h = TestHarness::new();
    let broken = h
        .add(InputFile::new("broken.png", "image/png", b"garbage".to_vec()))
        .await;
    let good = h.add(png_file("good.png", 8, 8)).await;
    let mut rx = h.events.subscribe();

    let summary = h.queue.convert_all().await;
    assert_eq!((summary.completed, summary.failed), (1, 1));

    let detail = drain(&mut rx).into_iter().find_map(|e| match e.payload {
        EventPayload::ConversionFailed { item_id, detail, .. } if item_id == broken => detail,
        _ => None,
    });
    assert!(detail.is_some_and(|d| !d.is_empty() && d != "failed to load image"));

    let broken = h.queue.item(broken).unwrap();
    assert_eq!(broken.status, StatusKind::Error);
    assert_eq!(broken.error.as_deref(), Some("failed to load image"));
    assert!(broken.download.is_none());

    let good = h.queue.item(good).unwrap();
    assert_eq!(good.status, StatusKind::Complete);
    assert!(good.output_size.unwrap() > 0);
    assert_eq!(h.queue.completed_count(), 1);
}

#[tokio::test]
async fn failed_items_are_retried_and_complete_items_are_not() {
    let h = TestHarness::new();
    let id = h.add(video_file("clip.webm")).await;
    *h.engine.fail_on.lock() = Some("libvpx".into());

    h.queue.convert_all().await;
    let item = h.queue.item(id).unwrap();
    assert_eq!(item.status, StatusKind::Error);
    assert_eq!(item.error.as_deref(), Some("Unknown encoder 'libvpx'"));

    // Still editable after failing.
    h.queue.update_item(id, ItemEdit::OutputFormat(OutputFormat::Mp4)).unwrap();

    let summary = h.queue.convert_all().await;
    assert_eq!(summary.completed, 1);
    assert_eq!(h.queue.item(id).unwrap().status, StatusKind::Complete);

    let again = h.queue.convert_all().await;
    assert_eq!(again, ConvertAllSummary::default());
    assert_matches!(
        h.queue.convert_item(id).await,
        Err(mf_core::Error::InvalidTransition { .. })
    );
}

#[tokio::test]
async fn removing_a_complete_item_invalidates_its_download() {
    let h = TestHarness::new();
    let id = h.add(png_file("shot.png", 4, 4)).await;
    h.queue.convert_all().await;

    let handle = h.queue.item(id).unwrap().download.unwrap();
    assert!(h.queue.resolve_download(handle).is_some());

    h.queue.remove_item(id).unwrap();
    assert!(h.queue.resolve_download(handle).is_none());
    assert!(h.queue.download(id).is_none());
    assert!(h.queue.item(id).is_none());
    assert_matches!(h.queue.remove_item(id), Err(mf_core::Error::NotFound { .. }));
}

#[tokio::test]
async fn reset_releases_everything() {
    let h = TestHarness::new();
    h.add(png_file("a.png", 4, 4)).await;
    h.add(png_file("b.png", 4, 4)).await;
    h.add(audio_file("c.wav")).await;
    h.queue.convert_all().await;

    let handles: Vec<_> = h.queue.items().iter().filter_map(|i| i.download).collect();
    assert_eq!(handles.len(), 3);

    assert_eq!(h.queue.reset_all(), 3);
    assert!(h.queue.is_empty());
    assert!(handles.iter().all(|d| h.queue.resolve_download(*d).is_none()));
}

#[tokio::test]
async fn downloads_follow_queue_order_with_stem_names() {
    let h = TestHarness::new();
    let a = h.add(png_file("first.shot.png", 4, 4)).await;
    h.add(InputFile::new("skip.png", "image/png", b"bad".to_vec())).await;
    let c = h.add(video_file("second.mp4")).await;
    h.queue
        .update_item(a, ItemEdit::OutputFormat(OutputFormat::Webp))
        .unwrap();
    h.queue
        .update_item(c, ItemEdit::OutputFormat(OutputFormat::Mp3))
        .unwrap();

    h.queue.convert_all().await;

    let downloads = h.queue.downloads();
    let names: Vec<&str> = downloads.iter().map(|d| d.file_name.as_str()).collect();
    assert_eq!(names, ["first.webp", "second.mp3"]);
    assert_eq!(downloads[0].mime_type, "image/webp");
    assert_eq!(downloads[1].mime_type, "audio/mpeg");

    let unique: HashSet<_> = downloads.iter().map(|d| d.id).collect();
    assert_eq!(unique.len(), 2);
}

/// Poll until the item reports `Converting`.
async fn wait_until_converting(h: &TestHarness, id: mf_core::ItemId) {
    for _ in 0..500 {
        if h.queue.item(id).map(|i| i.status) == Some(StatusKind::Converting) {
            return;
        }
        tokio::time::sleep(std::time::Duration::from_millis(2)).await;
    }
    panic!("item never started converting");
}

#[tokio::test]
async fn converting_items_are_locked_against_edits() {
    let h = TestHarness::new();
    let id = h.add(video_file("clip.mp4")).await;
    let gate = h.engine.close_gate();

    let queue = h.queue.clone();
    let run = tokio::spawn(async move { queue.convert_all().await });
    wait_until_converting(&h, id).await;

    assert!(h.queue.is_converting());
    assert_eq!(h.queue.item(id).unwrap().progress, Some(50));
    assert_matches!(
        h.queue.update_item(id, ItemEdit::Width(Some(640))),
        Err(mf_core::Error::Validation(_))
    );

    gate.add_permits(1);
    let summary = run.await.unwrap();
    assert_eq!(summary.completed, 1);
    assert!(!h.queue.is_converting());
    assert_eq!(h.queue.item(id).unwrap().target_width, None);
}

#[tokio::test]
async fn removal_mid_conversion_discards_the_result() {
    let h = TestHarness::new();
    let doomed = h.add(video_file("doomed.mp4")).await;
    let next = h.add(png_file("next.png", 6, 6)).await;
    let _gate = h.engine.close_gate();
    let mut rx = h.events.subscribe();

    let queue = h.queue.clone();
    let run = tokio::spawn(async move { queue.convert_all().await });
    wait_until_converting(&h, doomed).await;

    h.queue.remove_item(doomed).unwrap();
    let summary = run.await.unwrap();
    assert_eq!(summary.discarded, 1);
    assert_eq!(summary.completed, 1);

    let events = drain(&mut rx);
    assert!(!events.iter().any(|e| matches!(
        e.payload,
        EventPayload::ConversionCompleted { item_id, .. } if item_id == doomed
    )));
    assert!(events.iter().any(|e| matches!(
        e.payload,
        EventPayload::ConversionCompleted { item_id, .. } if item_id == next
    )));
    assert!(h.engine.files.lock().is_empty());
    assert_eq!(h.queue.downloads().len(), 1);
}

#[tokio::test]
async fn reset_mid_conversion_leaves_an_empty_queue() {
    let h = TestHarness::new();
    let id = h.add(audio_file("song.mp3")).await;
    let _gate = h.engine.close_gate();

    let queue = h.queue.clone();
    let run = tokio::spawn(async move { queue.convert_all().await });
    wait_until_converting(&h, id).await;

    assert_eq!(h.queue.reset_all(), 1);
    let summary = run.await.unwrap();
    assert_eq!(summary.discarded, 1);
    assert!(h.queue.is_empty());
    assert!(h.queue.downloads().is_empty());
}
