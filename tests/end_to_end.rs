use std::path::Path;
use std::sync::Arc;

use hotsync::archive::wrap_single_entry;
use hotsync::catalog::{ChangeEntry, ChangeKind};
use hotsync::config::{RetrySettings, SyncConfig};
use hotsync::container::{AssetClass, AssetContainer, EmbeddedAsset};
use hotsync::fsx;
use hotsync::jobs::default_registry;
use hotsync::sync::{run_sync, SyncOutcome, SyncRequest};
use hotsync::workers::{JobFilter, JobOutcome};
use hotsync::{SyncError, Version};
use serde_json::json;
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const INDEX_PAYLOAD: &[u8] = b"index bundle";
const AVATAR_V1: &[u8] = b"avatar bundle v1";
const AVATAR_V2: &[u8] = b"avatar bundle v2";
const EXCEL_PAYLOAD: &[u8] = b"excel bundle";

/// Recognizes the test bundles by content.
struct FakeContainer;

impl AssetContainer for FakeContainer {
    fn embedded_assets(&self, bundle: &Path) -> Result<Vec<EmbeddedAsset>, SyncError> {
        let bytes = fsx::read(bundle).map_err(|e| SyncError::io(e, bundle))?;
        if bytes != AVATAR_V2 {
            return Err(SyncError::collaborator("fake container", "unexpected bundle"));
        }
        Ok(vec![
            EmbeddedAsset {
                container_path: "assets/torappu/dynamicassets/arts/charavatars/char_002_amiya.png".into(),
                name: "char_002_amiya".into(),
                class: AssetClass::Texture2D,
                extension: Some("png".into()),
                data: b"PNG amiya".to_vec(),
            },
            EmbeddedAsset {
                container_path: "assets/torappu/dynamicassets/arts/charavatars/hub.asset".into(),
                name: "hub".into(),
                class: AssetClass::MonoBehaviour,
                extension: None,
                data: b"ignored".to_vec(),
            },
        ])
    }

    fn read_typetree(&self, bundle: &Path, container_path: &str) -> Result<Option<serde_json::Value>, SyncError> {
        let bytes = fsx::read(bundle).map_err(|e| SyncError::io(e, bundle))?;
        if bytes != INDEX_PAYLOAD || !container_path.ends_with("torappu_index.asset") {
            return Ok(None);
        }
        Ok(Some(json!({"assetToBundleList": [
            {"assetName": "arts/charavatars/char_002_amiya", "bundleName": "arts/charavatars_hub.ab"},
            {"assetName": "gamedata/excel/item_table", "bundleName": "gamedata/excel.ab"}
        ]})))
    }
}

/// A reader that cannot parse the index typetree.
struct BrokenIndexContainer;

impl AssetContainer for BrokenIndexContainer {
    fn embedded_assets(&self, _bundle: &Path) -> Result<Vec<EmbeddedAsset>, SyncError> {
        Ok(Vec::new())
    }

    fn read_typetree(&self, _bundle: &Path, _container_path: &str) -> Result<Option<serde_json::Value>, SyncError> {
        Err(SyncError::collaborator("fake container", "typetree unreadable"))
    }
}

fn catalog(avatar: &[u8]) -> Vec<u8> {
    let body = json!({
        "versionId": "test",
        "abInfos": [
            {"name": "torappu_index.ab", "md5": fsx::md5_hex(INDEX_PAYLOAD), "totalSize": 12, "abSize": 10},
            {"name": "arts/charavatars_hub.ab", "md5": fsx::md5_hex(avatar), "totalSize": 16, "abSize": 14},
            {"name": "gamedata/excel.ab", "md5": fsx::md5_hex(EXCEL_PAYLOAD), "totalSize": 12, "abSize": 10}
        ]
    });
    serde_json::to_vec_pretty(&body).unwrap()
}

fn config(server: &MockServer, storage: &TempDir) -> SyncConfig {
    SyncConfig {
        storage_dir: storage.path().to_path_buf(),
        cdn_base_url: server.uri(),
        retry: RetrySettings { initial_delay_ms: 1, max_delay_ms: 1, max_attempts: Some(1) },
        catalog_attempts: 1,
        max_concurrent_downloads: 2,
        ..Default::default()
    }
}

async fn mount_bundle(server: &MockServer, object: &str, payload: &[u8], times: u64) {
    Mock::given(method("GET"))
        .and(path(format!("/v2/{}", object)))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(wrap_single_entry("bundle", payload).unwrap()))
        .expect(times)
        .mount(server)
        .await;
}

#[tokio::test]
async fn one_changed_bundle_runs_only_the_jobs_that_need_it() {
    let server = MockServer::start().await;
    let storage = TempDir::new().unwrap();
    let config = config(&server, &storage);

    // v1 is already mirrored, v2 comes from the CDN
    fsx::write_atomic(&storage.path().join("hot_update_list").join("v1"), &catalog(AVATAR_V1)).unwrap();
    // this version's gamedata already exists, so only changed gamedata bundles would be decoded
    fsx::create_dir_all(storage.path().join("asset").join("gamedata").join("v2")).unwrap();

    let served = catalog(AVATAR_V2);
    Mock::given(method("GET"))
        .and(path("/v2/hot_update_list.json"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(served.clone()))
        .expect(1)
        .mount(&server)
        .await;
    mount_bundle(&server, "torappu_index.dat", INDEX_PAYLOAD, 1).await;
    mount_bundle(&server, "arts_charavatars_hub.dat", AVATAR_V2, 1).await;
    mount_bundle(&server, "gamedata_excel.dat", EXCEL_PAYLOAD, 0).await;

    let request = SyncRequest {
        version: Version::new("2.4.01", "v2"),
        previous: Some(Version::new("2.4.01", "v1")),
        filter: JobFilter::default(),
    };
    let outcome = run_sync(&config, &request, Arc::new(FakeContainer), default_registry().unwrap()).await.unwrap();

    let SyncOutcome::Completed { changes, report } = outcome else {
        panic!("expected a completed run");
    };
    assert_eq!(changes, vec![ChangeEntry::new(ChangeKind::Update, "arts/charavatars_hub.ab")]);

    assert_eq!(report.outcome("asset_index"), Some(&JobOutcome::Completed));
    assert_eq!(report.outcome("game_data"), Some(&JobOutcome::Skipped));
    assert_eq!(report.outcome("item_demand"), Some(&JobOutcome::Skipped));
    assert_eq!(report.outcome("char_avatar"), Some(&JobOutcome::Completed));
    assert_eq!(report.outcome("item_icon"), Some(&JobOutcome::Skipped));
    assert_eq!(report.outcome("audio"), Some(&JobOutcome::Skipped));
    assert_eq!(report.failed().count(), 0);

    let exported = storage.path().join("asset/raw/char_avatar/char_002_amiya.png");
    assert_eq!(fsx::read(&exported).unwrap(), b"PNG amiya");
    assert!(!storage.path().join("asset/raw/char_avatar/hub.bin").exists());

    // the fetched catalog is stored byte for byte
    assert_eq!(fsx::read(storage.path().join("hot_update_list/v2")).unwrap(), served);
    // the old bundle version is never fetched, the new one lands under its hash
    assert!(storage.path().join("assetbundle").join(fsx::md5_hex(AVATAR_V2)).is_file());
}

#[tokio::test]
async fn unchanged_version_does_nothing() {
    let server = MockServer::start().await;
    let storage = TempDir::new().unwrap();
    Mock::given(method("GET")).respond_with(ResponseTemplate::new(200)).expect(0).mount(&server).await;

    let version = Version::new("2.4.01", "v2");
    let request = SyncRequest { version: version.clone(), previous: Some(version), filter: JobFilter::default() };
    let outcome = run_sync(&config(&server, &storage), &request, Arc::new(FakeContainer), default_registry().unwrap()).await.unwrap();
    assert!(matches!(outcome, SyncOutcome::Unchanged));
    assert!(!storage.path().join("hot_update_list").exists());
}

#[tokio::test]
async fn unavailable_catalog_is_fatal() {
    let server = MockServer::start().await;
    let storage = TempDir::new().unwrap();
    Mock::given(method("GET")).respond_with(ResponseTemplate::new(404)).mount(&server).await;

    let request = SyncRequest { version: Version::new("2.4.01", "v9"), previous: None, filter: JobFilter::default() };
    let result = run_sync(&config(&server, &storage), &request, Arc::new(FakeContainer), default_registry().unwrap()).await;
    assert!(matches!(result, Err(SyncError::Catalog { res_version, .. }) if res_version == "v9"));
}

#[tokio::test]
async fn job_failures_do_not_fail_the_run() {
    let server = MockServer::start().await;
    let storage = TempDir::new().unwrap();
    let config = config(&server, &storage);

    // first mirror: everything is new, but no bundle is reachable
    Mock::given(method("GET"))
        .and(path("/v2/hot_update_list.json"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(catalog(AVATAR_V2)))
        .mount(&server)
        .await;

    let request = SyncRequest { version: Version::new("2.4.01", "v2"), previous: None, filter: JobFilter::new(Some(["asset_index"]), Vec::<String>::new()) };
    let outcome = run_sync(&config, &request, Arc::new(FakeContainer), default_registry().unwrap()).await.unwrap();
    let SyncOutcome::Completed { changes, report } = outcome else {
        panic!("expected a completed run");
    };
    assert_eq!(changes.len(), 3);
    assert!(changes.iter().all(|c| c.kind == ChangeKind::Create));
    assert!(matches!(report.outcome("asset_index"), Some(JobOutcome::Failed(_))));
    assert_eq!(report.outcome("char_avatar"), Some(&JobOutcome::Filtered));
}

#[tokio::test]
async fn failed_index_load_fails_dependent_jobs() {
    let server = MockServer::start().await;
    let storage = TempDir::new().unwrap();
    let config = config(&server, &storage);

    Mock::given(method("GET"))
        .and(path("/v2/hot_update_list.json"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(catalog(AVATAR_V2)))
        .mount(&server)
        .await;
    mount_bundle(&server, "torappu_index.dat", INDEX_PAYLOAD, 1).await;
    mount_bundle(&server, "arts_charavatars_hub.dat", AVATAR_V2, 0).await;
    mount_bundle(&server, "gamedata_excel.dat", EXCEL_PAYLOAD, 0).await;

    // first mirror: no gamedata yet and every bundle is new
    let request = SyncRequest { version: Version::new("2.4.01", "v2"), previous: None, filter: JobFilter::default() };
    let outcome = run_sync(&config, &request, Arc::new(BrokenIndexContainer), default_registry().unwrap()).await.unwrap();
    let SyncOutcome::Completed { report, .. } = outcome else {
        panic!("expected a completed run");
    };

    assert!(matches!(report.outcome("asset_index"), Some(JobOutcome::Failed(reason)) if reason.contains("typetree unreadable")));
    for name in ["game_data", "item_demand", "char_avatar", "item_icon", "audio"] {
        match report.outcome(name) {
            Some(JobOutcome::Failed(reason)) => assert!(reason.contains("asset index"), "{name}: {reason}"),
            other => panic!("{name} should fail without an index, got {:?}", other),
        }
    }
    assert_eq!(report.completed(), 0);
}
