mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{requested, serve, sha, ws20};
use terrasync::test_support::{CountingMirrors, ManifestBuilder};
use terrasync::{Mirror, RunReport, SyncEvent, SyncTarget, TileName};
use terrasync_http::{Scheduler, SchedulerConfig};
use tokio::sync::mpsc::UnboundedReceiver;
use wiremock::matchers::{method, path_regex};
use wiremock::{Mock, MockServer, ResponseTemplate};

const STG: &[u8] = b"OBJECT_STATIC windsock.ac 12.0 45.0 0 0\n";

async fn mount_tile(server: &MockServer, tile: &str) {
    let tile: TileName = tile.parse().unwrap();
    let container = tile.container().to_string();
    serve(
        server,
        &format!("/Terrain/{container}/.dirindex"),
        ManifestBuilder::new(format!("Terrain/{container}"))
            .dir(&tile.to_string(), Some("abab"))
            .build(),
    )
    .await;
    serve(
        server,
        &format!("/Terrain/{}/.dirindex", tile.relative_path()),
        ManifestBuilder::new(format!("Terrain/{}", tile.relative_path()))
            .file(&format!("{tile}.stg"), &sha(STG), STG.len() as u64)
            .build(),
    )
    .await;
    serve(server, &format!("/Terrain/{}/{tile}.stg", tile.relative_path()), STG).await;
}

fn tile_target(name: &str) -> SyncTarget {
    SyncTarget::Tile(name.parse().unwrap())
}

async fn wait_finished(events: &mut UnboundedReceiver<SyncEvent>) -> (Vec<SyncEvent>, RunReport) {
    let mut seen = Vec::new();
    loop {
        let event = tokio::time::timeout(Duration::from_secs(20), events.recv())
            .await
            .expect("timed out waiting for the worker")
            .expect("worker hung up");
        if let SyncEvent::Finished(report) = &event {
            let report = report.clone();
            seen.push(event);
            return (seen, report);
        }
        seen.push(event);
    }
}

fn config(dir: &std::path::Path) -> SchedulerConfig {
    SchedulerConfig {
        roots: vec![ws20(dir)],
        ..SchedulerConfig::default()
    }
}

#[tokio::test]
async fn runs_queued_tiles_and_publishes_the_tile_map() {
    let server = MockServer::start().await;
    mount_tile(&server, "e012n45").await;
    mount_tile(&server, "w122n37").await;
    let dir = tempfile::tempdir().unwrap();
    let source = Arc::new(CountingMirrors::new(vec![Mirror::new(server.uri(), 100)]));

    let (scheduler, mut events) = Scheduler::start(config(dir.path()), source.clone()).unwrap();
    scheduler.enqueue([tile_target("w122n37"), tile_target("e012n45")], false);

    let (seen, report) = wait_finished(&mut events).await;

    assert_eq!(seen.first(), Some(&SyncEvent::Started));
    assert!(seen.contains(&SyncEvent::Advance(1)));
    assert_eq!(report.targets, 2);
    assert_eq!(report.updates, 2);
    assert!(!report.cancelled);
    assert_eq!(report.mirrors.len(), 1);
    assert_eq!(report.total_downloads(), 6);

    let tiles = scheduler.tiles();
    assert!(tiles.contains(&"e012n45".parse().unwrap()));
    assert!(tiles.contains(&"w122n37".parse().unwrap()));
    assert!(scheduler.queue().is_empty());
    assert!(dir.path().join("Terrain/w130n30/w122n37/w122n37.stg").exists());

    scheduler.quit();
    scheduler.join();
    assert!(!scheduler.is_running());
}

#[tokio::test]
async fn each_pass_rederives_mirrors() {
    let server = MockServer::start().await;
    mount_tile(&server, "e012n45").await;
    let dir = tempfile::tempdir().unwrap();
    let source = Arc::new(CountingMirrors::new(vec![Mirror::new(server.uri(), 100)]));

    let (scheduler, mut events) = Scheduler::start(config(dir.path()), source.clone()).unwrap();
    scheduler.enqueue([tile_target("e012n45")], false);
    let (_, first) = wait_finished(&mut events).await;
    scheduler.enqueue([tile_target("e012n45")], false);
    let (_, second) = wait_finished(&mut events).await;

    assert_eq!(source.lookups(), 2);
    assert_eq!(first.mirrors[0].downloads, 3);
    assert_eq!(second.mirrors[0].downloads, 2, "the unchanged file is not fetched again");
    assert_eq!(second.mirrors[0].unchanged, 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn cancel_stops_the_pass_and_empties_the_queue() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path_regex(r"\.dirindex$"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string("d:e001n01\n")
                .set_delay(Duration::from_secs(5)),
        )
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let source = Arc::new(CountingMirrors::new(vec![Mirror::new(server.uri(), 100)]));
    let (scheduler, mut events) = Scheduler::start(config(dir.path()), source).unwrap();

    let targets = ["e001n01", "e011n11", "e021n21", "e031n31", "e041n41"];
    scheduler.enqueue(targets.iter().map(|t| tile_target(t)), false);

    let started = tokio::time::timeout(Duration::from_secs(10), events.recv())
        .await
        .unwrap();
    assert_eq!(started, Some(SyncEvent::Started));
    tokio::time::sleep(Duration::from_millis(300)).await;
    scheduler.cancel();

    let (_, report) = wait_finished(&mut events).await;
    assert!(report.cancelled);
    assert_eq!(report.targets, 0);
    assert!(scheduler.queue().is_empty());

    let paths = requested(&server).await;
    assert!(
        paths.iter().all(|p| p.starts_with("/Terrain/e000n00")),
        "only the first target was started: {paths:?}"
    );

    scheduler.quit();
    scheduler.join();
}

#[tokio::test]
async fn cancelled_pass_reports_the_updates_it_made() {
    let server = MockServer::start().await;
    let tile: TileName = "e012n45".parse().unwrap();
    let dir_path = format!("Terrain/{}", tile.relative_path());
    serve(
        &server,
        "/Terrain/e010n40/.dirindex",
        ManifestBuilder::new("Terrain/e010n40").dir("e012n45", None).build(),
    )
    .await;
    serve(
        &server,
        &format!("/{dir_path}/.dirindex"),
        ManifestBuilder::new(dir_path.as_str())
            .file("a.stg", &sha(STG), STG.len() as u64)
            .file("b.stg", &sha(STG), STG.len() as u64)
            .file("c.stg", &sha(STG), STG.len() as u64)
            .build(),
    )
    .await;
    serve(&server, &format!("/{dir_path}/a.stg"), STG).await;
    serve(&server, &format!("/{dir_path}/b.stg"), STG).await;
    Mock::given(method("GET"))
        .and(path_regex(r"/c\.stg$"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(30)))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let source = Arc::new(CountingMirrors::new(vec![Mirror::new(server.uri(), 100)]));
    let (scheduler, mut events) = Scheduler::start(config(dir.path()), source).unwrap();
    scheduler.enqueue([tile_target("e012n45")], false);

    let mut advanced = 0;
    while advanced < 2 {
        let event = tokio::time::timeout(Duration::from_secs(10), events.recv())
            .await
            .expect("timed out waiting for progress")
            .expect("worker hung up");
        if let SyncEvent::Advance(n) = event {
            advanced += n;
        }
    }
    scheduler.cancel();

    let (_, report) = wait_finished(&mut events).await;
    assert!(report.cancelled);
    assert_eq!(report.targets, 0);
    assert_eq!(report.updates, 2);
    assert!(dir.path().join(&dir_path).join("b.stg").exists());
    assert!(!dir.path().join(&dir_path).join("c.stg").exists());

    scheduler.quit();
    scheduler.join();
}

#[tokio::test]
async fn enqueue_after_cancel_runs_again() {
    let server = MockServer::start().await;
    mount_tile(&server, "e012n45").await;
    let dir = tempfile::tempdir().unwrap();
    let source = Arc::new(CountingMirrors::new(vec![Mirror::new(server.uri(), 100)]));
    let (scheduler, mut events) = Scheduler::start(config(dir.path()), source).unwrap();

    scheduler.cancel();
    scheduler.enqueue([tile_target("e012n45")], false);
    let (_, report) = wait_finished(&mut events).await;

    assert!(!report.cancelled);
    assert_eq!(report.targets, 1);
}

#[tokio::test]
async fn delete_removes_tiles_from_disk_and_map() {
    let server = MockServer::start().await;
    mount_tile(&server, "e012n45").await;
    let dir = tempfile::tempdir().unwrap();
    let source = Arc::new(CountingMirrors::new(vec![Mirror::new(server.uri(), 100)]));
    let (scheduler, mut events) = Scheduler::start(config(dir.path()), source).unwrap();

    scheduler.enqueue([tile_target("e012n45")], false);
    wait_finished(&mut events).await;

    let tile: TileName = "e012n45".parse().unwrap();
    let tile_dir = dir.path().join("Terrain/e010n40/e012n45");
    assert!(tile_dir.exists());

    scheduler.delete(&[tile]).unwrap();
    assert!(!tile_dir.exists());
    assert!(!scheduler.tiles().contains(&tile));

    scheduler.rebuild_tile_map();
    assert!(scheduler.tiles().is_empty());
}

#[test]
fn queue_is_sorted_and_drops_deleted_tiles() {
    let dir = tempfile::tempdir().unwrap();
    let source = Arc::new(CountingMirrors::new(Vec::new()));
    let (scheduler, _events) = Scheduler::start(config(dir.path()), source).unwrap();
    // Quit first so the worker never drains the queue under us.
    scheduler.quit();
    scheduler.join();

    scheduler.enqueue(
        [
            tile_target("w001n01"),
            SyncTarget::Models {
                base_path: dir.path().to_path_buf(),
            },
            tile_target("e001n01"),
        ],
        true,
    );
    let names: Vec<String> = scheduler.queue().iter().map(SyncTarget::name).collect();
    assert_eq!(names, vec!["Models", "e001n01", "w001n01"]);

    scheduler.delete(&["e001n01".parse().unwrap()]).unwrap();
    let names: Vec<String> = scheduler.queue().iter().map(SyncTarget::name).collect();
    assert_eq!(names, vec!["Models", "w001n01"]);
}

#[test]
fn existing_tiles_are_found_at_start() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::create_dir_all(dir.path().join("Terrain/e010n40/e012n45")).unwrap();
    let source = Arc::new(CountingMirrors::new(Vec::new()));
    let (scheduler, _events) = Scheduler::start(config(dir.path()), source).unwrap();

    assert!(scheduler.is_running());
    assert!(scheduler.tiles().contains(&"e012n45".parse().unwrap()));
    scheduler.quit();
    scheduler.join();
    assert!(!scheduler.is_running());
}
