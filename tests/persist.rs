//! The JSON file store and usage log on a real temp directory.

use async_trait::async_trait;
use lecturelens::{
    AnalysisClient, AnalysisError, AnalysisOutput, AnalysisRequest, AnalysisSession, JsonFileStore,
    LensError, PersistenceGateway, Presentation, SessionCollaborators, SessionConfig, Slide,
    SlideId, SlideStatus, UsageLog, UsageRecord, UsageTracker,
};
use std::sync::Arc;
use tempfile::TempDir;

// 8-byte PNG signature, enough for the store to file it as a .png.
const PNG_URI: &str = "data:image/png;base64,iVBORw0KGgo=";

fn deck(id: &str, n: u32) -> Presentation {
    let slides = (1..=n)
        .map(|p| Slide::new(SlideId::for_page(id, p), p, PNG_URI))
        .collect();
    Presentation::new(id, format!("Deck {id}"), slides)
}

struct Echo;

#[async_trait]
impl AnalysisClient for Echo {
    async fn analyze(&self, request: &AnalysisRequest) -> Result<AnalysisOutput, AnalysisError> {
        Ok(AnalysisOutput {
            explanation: format!("Answer to: {}", request.prompt),
            total_tokens: 42,
        })
    }
}

// ── Store ────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn save_then_load_keeps_everything_but_inline_images() {
    let dir = TempDir::new().unwrap();
    let store = JsonFileStore::new(dir.path());
    let mut p = deck("week-1", 2);
    p.slides[0].status = SlideStatus::Success;
    p.slides[0].explanation = Some("Intro".into());
    p.slides[0].custom_prompt = Some("Keep it short".into());
    p.folder_id = Some("cs101".into());

    store.save(&p).await.unwrap();
    let loaded = store.load("week-1").await.unwrap();

    assert_eq!(loaded.title, p.title);
    assert_eq!(loaded.folder_id.as_deref(), Some("cs101"));
    assert_eq!(loaded.slides[0].status, SlideStatus::Success);
    assert_eq!(loaded.slides[0].explanation.as_deref(), Some("Intro"));
    assert_eq!(loaded.slides[0].custom_prompt.as_deref(), Some("Keep it short"));
    assert_eq!(loaded.slides[1].status, SlideStatus::Idle);

    let image = dir.path().join("week-1").join("page-001.png");
    assert!(image.exists());
    assert_eq!(loaded.slides[0].image_url, image.to_string_lossy());
    assert_eq!(std::fs::read(&image).unwrap()[..4], [0x89, b'P', b'N', b'G']);
}

#[tokio::test]
async fn resaving_overwrites_without_leaving_temp_files() {
    let dir = TempDir::new().unwrap();
    let store = JsonFileStore::new(dir.path());
    let mut p = deck("d", 1);
    store.save(&p).await.unwrap();
    p.title = "Renamed".into();
    store.save(&p).await.unwrap();

    assert_eq!(store.load("d").await.unwrap().title, "Renamed");
    let names: Vec<String> = std::fs::read_dir(dir.path())
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    assert!(names.iter().all(|n| !n.ends_with(".tmp")), "{names:?}");
}

#[tokio::test]
async fn list_filters_by_folder_newest_first() {
    let dir = TempDir::new().unwrap();
    let store = JsonFileStore::new(dir.path());

    let mut a = deck("a", 1);
    a.folder_id = Some("physics".into());
    let mut b = deck("b", 2);
    b.folder_id = Some("physics".into());
    b.slides[1].status = SlideStatus::Success;
    b.last_modified = a.last_modified + chrono::Duration::seconds(10);
    let c = deck("c", 1);
    for p in [&a, &b, &c] {
        store.save(p).await.unwrap();
    }
    std::fs::write(dir.path().join("broken.json"), b"{ not json").unwrap();

    let physics = store.list(Some("physics")).await.unwrap();
    let ids: Vec<&str> = physics.iter().map(|s| s.id.as_str()).collect();
    assert_eq!(ids, ["b", "a"]);
    assert_eq!(physics[0].analysed, 1);
    assert_eq!(store.list(None).await.unwrap().len(), 3);
}

#[tokio::test]
async fn list_of_missing_root_is_empty() {
    let dir = TempDir::new().unwrap();
    let store = JsonFileStore::new(dir.path().join("nowhere"));
    assert!(store.list(None).await.unwrap().is_empty());
}

#[tokio::test]
async fn delete_removes_document_and_images() {
    let dir = TempDir::new().unwrap();
    let store = JsonFileStore::new(dir.path());
    store.save(&deck("gone", 2)).await.unwrap();
    assert!(dir.path().join("gone").is_dir());

    store.delete("gone").await.unwrap();
    assert!(!dir.path().join("gone.json").exists());
    assert!(!dir.path().join("gone").exists());
    assert!(matches!(
        store.load("gone").await,
        Err(LensError::PresentationNotFound { .. })
    ));
    assert!(matches!(
        store.delete("gone").await,
        Err(LensError::PresentationNotFound { .. })
    ));
}

// ── Session through the store ────────────────────────────────────────────────

#[tokio::test]
async fn regenerate_prompt_survives_a_reload() {
    let dir = TempDir::new().unwrap();
    let store = Arc::new(JsonFileStore::new(dir.path()));
    let session = AnalysisSession::open(
        deck("lec", 2),
        SessionCollaborators {
            analyzer: Arc::new(Echo),
            gateway: store.clone(),
            usage: Arc::new(lecturelens::NoopUsageTracker),
        },
        SessionConfig::builder()
            .admission_delay_ms(0)
            .save_debounce_ms(20)
            .build()
            .unwrap(),
    );
    let slide = SlideId::for_page("lec", 2);
    let status = session
        .trigger_analysis(&slide, Some("Explain like I'm five".into()))
        .await
        .unwrap();
    assert_eq!(status, SlideStatus::Success);
    session.close().await.unwrap();

    let reloaded = store.load("lec").await.unwrap();
    let stored = reloaded.slide(&slide).unwrap();
    assert_eq!(stored.custom_prompt.as_deref(), Some("Explain like I'm five"));
    assert_eq!(
        stored.explanation.as_deref(),
        Some("Answer to: Explain like I'm five")
    );
    assert!(stored.analyzed_by.is_some());
}

#[tokio::test]
async fn reopened_session_continues_from_the_stored_state() {
    let dir = TempDir::new().unwrap();
    let store = Arc::new(JsonFileStore::new(dir.path()));
    let collaborators = SessionCollaborators {
        analyzer: Arc::new(Echo),
        gateway: store.clone(),
        usage: Arc::new(lecturelens::NoopUsageTracker),
    };
    let config = || {
        SessionConfig::builder()
            .admission_delay_ms(0)
            .save_debounce_ms(20)
            .build()
            .unwrap()
    };

    let first = AnalysisSession::open(deck("cont", 3), collaborators.clone(), config());
    first
        .trigger_analysis(&SlideId::for_page("cont", 1), None)
        .await
        .unwrap();
    first.close().await.unwrap();

    let second = AnalysisSession::open(store.load("cont").await.unwrap(), collaborators, config());
    assert!(!second.enqueue(&SlideId::for_page("cont", 1)));
    assert!(second.enqueue(&SlideId::for_page("cont", 3)));
    second.wait_idle().await;
    let done = second.close().await.unwrap();

    let statuses: Vec<SlideStatus> = done.slides.iter().map(|s| s.status).collect();
    assert_eq!(
        statuses,
        [SlideStatus::Success, SlideStatus::Idle, SlideStatus::Success]
    );
}

// ── Usage log ────────────────────────────────────────────────────────────────

fn record(user: &str, tokens: u64) -> UsageRecord {
    UsageRecord {
        timestamp: chrono::Utc::now(),
        user_id: user.into(),
        user_name: user.to_uppercase(),
        presentation_id: "p".into(),
        slide_id: SlideId::for_page("p", 1),
        page_number: 1,
        total_tokens: tokens,
    }
}

#[tokio::test]
async fn usage_log_appends_and_totals() {
    let dir = TempDir::new().unwrap();
    let log = Arc::new(UsageLog::new(dir.path().join("nested").join("usage.jsonl")));

    let writers: Vec<_> = [("ada", 10), ("bob", 5), ("ada", 7)]
        .into_iter()
        .map(|(u, t)| {
            let log = log.clone();
            tokio::spawn(async move { log.record(&record(u, t)).await })
        })
        .collect();
    for w in writers {
        w.await.unwrap().unwrap();
    }

    assert_eq!(log.read_all().await.unwrap().len(), 3);
    let totals = log.totals_by_user().await.unwrap();
    assert_eq!(totals.get("ada"), Some(&17));
    assert_eq!(totals.get("bob"), Some(&5));
}

#[tokio::test]
async fn usage_log_is_written_by_the_session() {
    let dir = TempDir::new().unwrap();
    let log = Arc::new(UsageLog::new(dir.path().join("usage.jsonl")));
    let session = AnalysisSession::open(
        deck("bill", 1),
        SessionCollaborators {
            analyzer: Arc::new(Echo),
            gateway: Arc::new(JsonFileStore::new(dir.path())),
            usage: log.clone(),
        },
        SessionConfig::builder()
            .analyst(lecturelens::Analyst::new("u1", "Ada"))
            .admission_delay_ms(0)
            .save_debounce_ms(20)
            .build()
            .unwrap(),
    );
    session
        .trigger_analysis(&SlideId::for_page("bill", 1), None)
        .await
        .unwrap();
    session.close().await.unwrap();

    // Reporting runs on its own task.
    let mut records = Vec::new();
    for _ in 0..50 {
        records = log.read_all().await.unwrap();
        if !records.is_empty() {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].user_name, "Ada");
    assert_eq!(records[0].total_tokens, 42);
}
