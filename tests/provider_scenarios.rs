use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use contenthub::cache::ContentCache;
use contenthub::config::{CacheConfig, ContentConfig, ContentOptions, FileSystemConfig};
use contenthub::content::{ContentQuery, SortDirection, SortField};
use contenthub::provider::{CachingProvider, ContentProvider, MemoryProvider, MemoryRepository};
use contenthub::{ContentHub, ErrorKind};
use tokio_util::sync::CancellationToken;

fn seeded_repository() -> MemoryRepository {
    let repo = MemoryRepository::new();
    repo.insert("blog/_index.md", "---\ntitle: Blog\n---\n");
    repo.insert(
        "blog/first.md",
        "---\ntitle: First\ndate: 2024-01-01\ncategories: [News]\ntags: [rust]\n---\nHello",
    );
    repo.insert(
        "blog/second.md",
        "---\ntitle: Second\ndate: 2024-02-01\ncategories: [News]\n---\nWorld",
    );
    repo.insert("docs/guide/intro.md", "---\ntitle: Intro\ndate: 2023-06-01\n---\n");
    repo
}

fn stack(repo: MemoryRepository) -> (Arc<ContentCache>, CachingProvider) {
    let cache = ContentCache::shared(CacheConfig::default());
    let inner = MemoryProvider::new(repo, "mem", "Memory", ContentOptions::default(), cache.clone());
    let provider = CachingProvider::new(Arc::new(inner), cache.clone());
    (cache, provider)
}

#[tokio::test]
async fn reads_survive_backend_outage_after_first_load() {
    let repo = seeded_repository();
    let (_cache, provider) = stack(repo.clone());
    let cancel = CancellationToken::new();

    provider.initialize(&cancel).await.unwrap();
    repo.set_available(false);

    let items = provider.get_all_items(&cancel).await.unwrap();
    assert_eq!(items.len(), 3);

    let first = provider
        .get_item_by_path("blog/first.md", &cancel)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(first.title, "First");

    let blog = provider
        .get_directory_by_path("blog", &cancel)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(blog.title, "Blog");
    assert_eq!(blog.item_count, 2);

    let news = provider
        .get_items_by_query(
            &ContentQuery::new()
                .with_category("news")
                .sorted_by(SortField::Date, SortDirection::Ascending),
            &cancel,
        )
        .await
        .unwrap();
    let titles: Vec<_> = news.iter().map(|i| i.title.as_str()).collect();
    assert_eq!(titles, vec!["First", "Second"]);

    let guide = provider
        .get_directory_by_path("docs/guide", &cancel)
        .await
        .unwrap()
        .unwrap();
    let docs = provider
        .get_directory_by_id(guide.parent_id.as_deref().unwrap(), &cancel)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(docs.path, "docs");

    // Writes need the backend
    let err = provider
        .update_item("blog/first.md", "---\ntitle: X\n---\n", "edit", &first.provider_specific_id, &cancel)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ProviderUnavailable);
}

#[tokio::test]
async fn stale_token_is_rejected_and_fresh_one_works() {
    let repo = seeded_repository();
    let (_cache, provider) = stack(repo.clone());
    let cancel = CancellationToken::new();

    let item = provider
        .get_item_by_path("blog/first.md", &cancel)
        .await
        .unwrap()
        .unwrap();
    let token = item.provider_specific_id.clone();

    // Someone else edits the file first
    let other = provider
        .update_item("blog/first.md", "---\ntitle: Theirs\n---\n", "theirs", &token, &cancel)
        .await
        .unwrap();

    let err = provider
        .update_item("blog/first.md", "---\ntitle: Mine\n---\n", "mine", &token, &cancel)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Conflict);
    assert!(err.is_conflict());

    let reread = provider
        .get_item_by_path("blog/first.md", &cancel)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(reread.title, "Theirs");
    assert_eq!(Some(reread.provider_specific_id.as_str()), other.token());

    provider
        .update_item(
            "blog/first.md",
            "---\ntitle: Mine\n---\n",
            "mine",
            &reread.provider_specific_id,
            &cancel,
        )
        .await
        .unwrap();
    assert!(repo.content("blog/first.md").unwrap().contains("Mine"));
}

#[tokio::test]
async fn concurrent_cold_reads_load_once() {
    let cache = Arc::new(ContentCache::new(CacheConfig::default()));
    let loads = Arc::new(AtomicUsize::new(0));

    let tasks: Vec<_> = (0..32)
        .map(|_| {
            let cache = cache.clone();
            let loads = loads.clone();
            tokio::spawn(async move {
                cache
                    .get_or_create("mem:get_all_items:", None, || async {
                        loads.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(25)).await;
                        Ok::<_, contenthub::ContentError>(Some(42usize))
                    })
                    .await
            })
        })
        .collect();

    for task in tasks {
        assert_eq!(task.await.unwrap().unwrap(), Some(42));
    }
    assert_eq!(loads.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn hub_over_local_directory() {
    let dir = tempfile::tempdir().unwrap();
    let content = dir.path().join("site");
    std::fs::create_dir_all(content.join("notes")).unwrap();
    std::fs::write(
        content.join("notes/todo.md"),
        "---\ntitle: Todo\ntags: [home]\n---\n- milk\n",
    )
    .unwrap();

    let config = ContentConfig {
        filesystem: Some(FileSystemConfig {
            root: "site".into(),
            ..Default::default()
        }),
        ..Default::default()
    };
    let hub = ContentHub::from_config(dir.path().to_path_buf(), config).unwrap();
    assert!(!hub.is_watching());
    let cancel = CancellationToken::new();

    let items = hub.provider.get_all_items(&cancel).await.unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].url, "notes/todo");

    hub.provider
        .create_item("notes/later.md", "---\ntitle: Later\n---\n", "add", &cancel)
        .await
        .unwrap();
    assert!(content.join("notes/later.md").exists());
    assert_eq!(hub.provider.get_all_items(&cancel).await.unwrap().len(), 2);

    let err = hub
        .provider
        .delete_directory("", "rm", &cancel)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::OperationDisallowed);
}

#[tokio::test]
async fn cancelled_before_start() {
    let (_cache, provider) = stack(seeded_repository());
    let cancel = CancellationToken::new();
    cancel.cancel();

    let err = provider
        .get_items_by_query(&ContentQuery::new(), &cancel)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Cancelled);

    let err = provider
        .create_item("blog/new.md", "---\ntitle: New\n---\n", "add", &cancel)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Cancelled);
}
