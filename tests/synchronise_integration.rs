use classeur_sync::synchronise::LAST_RUN_KEY;
use classeur_sync::{Cache, FileCollection, Folder, FolderOptions, JsonFileCache};
use serde_json::{json, Value};
use tempfile::{tempdir, TempDir};
use wiremock::matchers::{basic_auth, header, method, path, path_regex, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const FOLDER: &str = "CRYEgM2Ju4DHKKeqNDOG";
const LISTING_PATH: &str = "/api/v2/folders/CRYEgM2Ju4DHKKeqNDOG/files";

fn options(server: &MockServer, cache: &TempDir) -> FolderOptions {
    let mut options = FolderOptions::new(FOLDER, "articles", "user", "key");
    options.host = Some(server.uri());
    options.cache_dir = Some(cache.path().to_path_buf());
    options.retries = Some(0);
    options
}

fn descriptors(start: usize, len: usize) -> Value {
    Value::Array(
        (start..start + len)
            .map(|i| json!({"id": format!("id-{i}"), "name": format!("file-{i}"), "folderId": FOLDER}))
            .collect(),
    )
}

fn revision(text: &str) -> Value {
    json!({
        "text": text,
        "updated": 1_577_836_800_000_i64,
        "properties": {"title": "Hello", "layout": "post"},
    })
}

async fn mount_page(server: &MockServer, range: &str, body: Value) {
    Mock::given(method("GET"))
        .and(path(LISTING_PATH))
        .and(header("range", range))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .expect(1)
        .mount(server)
        .await;
}

async fn mount_revisions(server: &MockServer, expected: u64) {
    Mock::given(method("GET"))
        .and(path_regex(r"^/api/v2/files/[^/]+/contentRevs/last$"))
        .respond_with(ResponseTemplate::new(200).set_body_json(revision("body")))
        .expect(expected)
        .mount(server)
        .await;
}

#[tokio::test]
async fn single_file_lands_under_dest_path() {
    let server = MockServer::start().await;
    let cache = tempdir().unwrap();

    Mock::given(method("GET"))
        .and(path(LISTING_PATH))
        .and(header("range", "items=0-19"))
        .and(query_param("sort", "updated"))
        .and(query_param("direction", "desc"))
        .and(basic_auth("user", "key"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!([{"id": "abc", "name": "test-file", "folderId": FOLDER}])),
        )
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v2/files/abc/contentRevs/last"))
        .and(basic_auth("user", "key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(revision("# Hello\n")))
        .expect(1)
        .mount(&server)
        .await;

    let folder = Folder::from_options(options(&server, &cache)).unwrap();
    let mut files = FileCollection::new();
    let report = folder.try_sync(&mut files).await.unwrap();

    assert_eq!(report.merged, 1);
    let record = &files["articles/test-file"];
    assert_eq!(record.id, "abc");
    assert_eq!(record.name, "test-file");
    assert_eq!(record.contents, b"# Hello\n".to_vec());
    assert_eq!(record.modified_date.to_rfc3339(), "2020-01-01T00:00:00+00:00");
    assert_eq!(record.metadata["title"], json!("Hello"));
    assert_eq!(record.metadata["folderId"], json!(FOLDER));
    assert!(!record.metadata.contains_key("text"));

    let values: JsonFileCache<Value> =
        JsonFileCache::new(cache.path(), &format!("classeur-{FOLDER}-values"));
    assert!(values.all().await.unwrap()[LAST_RUN_KEY].is_string());
    assert!(cache
        .path()
        .join(format!("classeur-{FOLDER}"))
        .join("articles%2Ftest-file.json")
        .exists());
}

#[tokio::test]
async fn listing_pages_until_a_short_page() {
    let server = MockServer::start().await;
    let cache = tempdir().unwrap();
    mount_page(&server, "items=0-19", descriptors(0, 20)).await;
    mount_page(&server, "items=20-39", descriptors(20, 20)).await;
    mount_page(&server, "items=40-59", descriptors(40, 3)).await;
    mount_revisions(&server, 43).await;

    let mut options = options(&server, &cache);
    options.concurrency = Some(4);
    let folder = Folder::from_options(options).unwrap();
    let mut files = FileCollection::new();
    let report = folder.try_sync(&mut files).await.unwrap();

    assert_eq!(report.scrape.completed, 43);
    assert_eq!(files.len(), 43);
    assert!(files.contains_key("articles/file-42"));
}

#[tokio::test]
async fn exact_multiple_ends_with_an_empty_page() {
    let server = MockServer::start().await;
    let cache = tempdir().unwrap();
    mount_page(&server, "items=0-19", descriptors(0, 20)).await;
    mount_page(&server, "items=20-39", json!([])).await;
    mount_revisions(&server, 20).await;

    let folder = Folder::from_options(options(&server, &cache)).unwrap();
    let mut files = FileCollection::new();
    folder.sync(&mut files).await;
    assert_eq!(files.len(), 20);
}

#[tokio::test]
async fn failed_download_only_drops_that_file() {
    let server = MockServer::start().await;
    let cache = tempdir().unwrap();
    mount_page(&server, "items=0-19", descriptors(0, 5)).await;
    Mock::given(method("GET"))
        .and(path("/api/v2/files/id-2/contentRevs/last"))
        .respond_with(ResponseTemplate::new(404))
        .with_priority(1)
        .expect(1)
        .mount(&server)
        .await;
    mount_revisions(&server, 4).await;

    let folder = Folder::from_options(options(&server, &cache)).unwrap();
    let mut files = FileCollection::new();
    let report = folder.try_sync(&mut files).await.unwrap();

    assert_eq!(report.scrape.completed, 4);
    assert_eq!(report.scrape.failed, 1);
    assert_eq!(files.len(), 4);
    assert!(!files.contains_key("articles/file-2"));
}

#[tokio::test]
async fn server_errors_on_download_are_retried() {
    let server = MockServer::start().await;
    let cache = tempdir().unwrap();
    mount_page(&server, "items=0-19", descriptors(0, 1)).await;
    Mock::given(method("GET"))
        .and(path("/api/v2/files/id-0/contentRevs/last"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .with_priority(1)
        .mount(&server)
        .await;
    mount_revisions(&server, 1).await;

    let mut options = options(&server, &cache);
    options.retries = Some(2);
    let folder = Folder::from_options(options).unwrap();
    let mut files = FileCollection::new();
    folder.try_sync(&mut files).await.unwrap();
    assert!(files.contains_key("articles/file-0"));
}

#[tokio::test]
async fn listing_failure_is_swallowed_by_sync() {
    let server = MockServer::start().await;
    let cache = tempdir().unwrap();
    Mock::given(method("GET"))
        .and(path(LISTING_PATH))
        .respond_with(ResponseTemplate::new(401).set_body_string("unauthorized"))
        .expect(1)
        .mount(&server)
        .await;

    let folder = Folder::from_options(options(&server, &cache)).unwrap();
    let mut files = FileCollection::new();
    let returned = folder.sync(&mut files).await;
    assert!(returned.is_empty());
}

#[tokio::test]
async fn repeated_runs_produce_the_same_collection() {
    let server = MockServer::start().await;
    let cache = tempdir().unwrap();
    Mock::given(method("GET"))
        .and(path(LISTING_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(descriptors(0, 7)))
        .expect(2)
        .mount(&server)
        .await;
    mount_revisions(&server, 14).await;

    let folder = Folder::from_options(options(&server, &cache)).unwrap();
    let mut first = FileCollection::new();
    folder.sync(&mut first).await;
    let mut second = FileCollection::new();
    folder.sync(&mut second).await;

    assert_eq!(first.len(), 7);
    assert_eq!(first, second);
}

#[tokio::test]
async fn cache_outlives_the_remote_folder_until_invalidated() {
    let server = MockServer::start().await;
    let cache = tempdir().unwrap();
    mount_page(&server, "items=0-19", descriptors(0, 3)).await;
    mount_revisions(&server, 3).await;
    let folder = Folder::from_options(options(&server, &cache)).unwrap();
    folder.sync(&mut FileCollection::new()).await;
    server.verify().await;

    // file-0 and file-1 were deleted remotely
    server.reset().await;
    Mock::given(method("GET"))
        .and(path(LISTING_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(descriptors(2, 1)))
        .mount(&server)
        .await;
    mount_revisions(&server, 2).await;

    let kept = Folder::from_options(options(&server, &cache)).unwrap();
    let mut files = FileCollection::new();
    kept.sync(&mut files).await;
    assert_eq!(files.len(), 3);

    let mut invalidating = options(&server, &cache);
    invalidating.invalidate = true;
    let fresh = Folder::from_options(invalidating).unwrap();
    let mut files = FileCollection::new();
    fresh.sync(&mut files).await;
    assert_eq!(files.keys().collect::<Vec<_>>(), vec!["articles/file-2"]);
}

#[tokio::test]
async fn merge_overwrites_host_entries_and_keeps_others() {
    let server = MockServer::start().await;
    let cache = tempdir().unwrap();
    mount_page(&server, "items=0-19", descriptors(0, 1)).await;
    mount_revisions(&server, 1).await;

    let folder = Folder::from_options(options(&server, &cache)).unwrap();
    let mut files = FileCollection::new();

    // a stale copy of the remote file plus an unrelated local page
    let placeholder: classeur_sync::FileRecord = serde_json::from_value(json!({
        "id": "local",
        "name": "about",
        "contents": [],
        "modifiedDate": "2019-01-01T00:00:00Z",
    }))
    .unwrap();
    files.insert("pages/about".to_string(), placeholder.clone());
    let mut stale = placeholder;
    stale.name = "file-0".to_string();
    files.insert("articles/file-0".to_string(), stale);

    folder.sync(&mut files).await;
    assert_eq!(files.len(), 2);
    assert_eq!(files["pages/about"].id, "local");
    assert_eq!(files["articles/file-0"].id, "id-0");
    assert_eq!(files["articles/file-0"].contents, b"body".to_vec());
}
