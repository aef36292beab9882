//! Integration tests for [`WordPressQueryAdapter`] over the static content
//! store: batching, query plan, field assembly and custom providers.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use serde_json::json;

use cardcrafter::content::{
    ContentQuery, DEBUG_IMAGE_URL_FIELD, DEBUG_THUMBNAIL_FIELD, NativeMetaProvider, QueryPlan,
};
use cardcrafter::normalize::is_placeholder;
use cardcrafter::{
    CardError, CardId, ContentRecord, ContentStore, FieldMapping, Result, StaticContentStore,
    WordPressQueryAdapter,
};

fn at(day: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, day, 9, 30, 0).unwrap()
}

fn blog() -> Arc<StaticContentStore> {
    let store = StaticContentStore::default();
    store.upsert(
        ContentRecord::new(10, "post", at(5))
            .title("Launch day")
            .excerpt("We shipped <strong>everything</strong>.")
            .permalink("https://site.test/launch-day/")
            .author(3)
            .thumbnail(100)
            .term("category", "news"),
    );
    store.upsert(
        ContentRecord::new(11, "post", at(7))
            .title("Retro")
            .content("[gallery ids=\"1,2\"]<p>What went well and what did not.</p>")
            .permalink("https://site.test/retro/")
            .author(3)
            .term("category", "team"),
    );
    store.upsert(
        ContentRecord::new(12, "post", at(9))
            .title("Hiring")
            .permalink("https://site.test/hiring/")
            .author(4)
            .custom_field("location", json!("Remote"))
            .meta("_edit_lock", json!("1:1"))
            .meta("salary_band", json!(["B"])),
    );
    store.upsert(ContentRecord::new(13, "page", at(1)).title("About"));
    store.add_media(100, "https://site.test/uploads/launch.jpg");
    store.add_author(3, "Jane Doe");
    store.add_author(4, "Omar Ali");
    Arc::new(store)
}

#[tokio::test]
async fn cards_are_built_with_one_batch_per_lookup() {
    let store = blog();
    let adapter = WordPressQueryAdapter::new(store.clone());

    let cards = adapter
        .query_and_normalize("post", "", 12, &FieldMapping::default())
        .await
        .unwrap();

    assert_eq!(cards.len(), 3);
    assert_eq!(store.query_count(), 1);
    assert_eq!(store.image_batch_count(), 1);
    assert_eq!(store.author_batch_count(), 1);

    // Newest first.
    let ids: Vec<CardId> = cards.iter().map(|c| c.id.clone()).collect();
    assert_eq!(ids, vec![CardId::Int(12), CardId::Int(11), CardId::Int(10)]);

    let launch = &cards[2];
    assert_eq!(launch.title, "Launch day");
    assert_eq!(launch.subtitle, "March 5, 2024");
    assert_eq!(launch.description, "We shipped everything.");
    assert_eq!(launch.image, "https://site.test/uploads/launch.jpg");
    assert_eq!(launch.link, "https://site.test/launch-day/");
    assert_eq!(launch.field("author"), Some(&json!("Jane Doe")));
    assert_eq!(launch.field("post_type"), Some(&json!("post")));

    let retro = &cards[1];
    assert_eq!(retro.description, "What went well and what did not.");
    assert!(is_placeholder(&retro.image));

    let hiring = &cards[0];
    assert_eq!(hiring.field("location"), Some(&json!("Remote")));
    assert_eq!(hiring.field("author"), Some(&json!("Omar Ali")));
    assert!(hiring.field("salary_band").is_none());
}

#[tokio::test]
async fn query_runs_with_card_grid_plan() {
    let store = blog();
    let adapter = WordPressQueryAdapter::new(store.clone());
    adapter
        .query_and_normalize("post", "category=news", 500, &FieldMapping::default())
        .await
        .unwrap();

    let query: ContentQuery = store.last_query().unwrap();
    assert_eq!(query.plan, QueryPlan::CARD_GRID);
    assert_eq!(query.post_type, "post");
    assert_eq!(query.status, "publish");
    assert_eq!(query.page_size, 100);
    assert!(query.filters.contains_key("category"));
}

#[tokio::test]
async fn filters_and_page_size_apply() {
    let adapter = WordPressQueryAdapter::new(blog());

    let news = adapter
        .query_and_normalize("post", "category=news", 12, &FieldMapping::default())
        .await
        .unwrap();
    assert_eq!(news.len(), 1);
    assert_eq!(news[0].title, "Launch day");

    let either = adapter
        .query_and_normalize(
            "post",
            "category[]=news&category[]=team",
            12,
            &FieldMapping::default(),
        )
        .await
        .unwrap();
    assert_eq!(either.len(), 2);

    let one = adapter
        .query_and_normalize("post", "", 1, &FieldMapping::default())
        .await
        .unwrap();
    assert_eq!(one.len(), 1);

    let by_title = adapter
        .query_and_normalize("post", "orderby=title&order=asc", 12, &FieldMapping::default())
        .await
        .unwrap();
    let titles: Vec<&str> = by_title.iter().map(|c| c.title.as_str()).collect();
    assert_eq!(titles, vec!["Hiring", "Launch day", "Retro"]);
}

#[tokio::test]
async fn empty_result_skips_batch_lookups() {
    let store = blog();
    let adapter = WordPressQueryAdapter::new(store.clone());
    let cards = adapter
        .query_and_normalize("event", "", 12, &FieldMapping::default())
        .await
        .unwrap();
    assert!(cards.is_empty());
    assert_eq!(store.query_count(), 1);
    assert_eq!(store.image_batch_count(), 0);
    assert_eq!(store.author_batch_count(), 0);
}

#[tokio::test]
async fn malformed_queries_are_rejected_before_the_store() {
    let store = blog();
    let adapter = WordPressQueryAdapter::new(store.clone());

    for query in [
        "post_status=draft",
        "posts_per_page=1000",
        "paged=2",
        "bad key=1",
        "=x",
    ] {
        let err = adapter
            .query_and_normalize("post", query, 12, &FieldMapping::default())
            .await
            .unwrap_err();
        assert!(matches!(err, CardError::Query(_)), "{query}: {err:?}");
    }

    let err = adapter
        .query_and_normalize("Bad Type!", "", 12, &FieldMapping::default())
        .await
        .unwrap_err();
    assert!(matches!(err, CardError::Query(_)));
    assert_eq!(store.query_count(), 0);
}

#[tokio::test]
async fn mapping_applies_to_native_fields() {
    let adapter = WordPressQueryAdapter::new(blog());
    let mapping = FieldMapping::default().subtitle("author");
    let cards = adapter
        .query_and_normalize("post", "category=news", 12, &mapping)
        .await
        .unwrap();
    assert_eq!(cards[0].subtitle, "Jane Doe");
}

#[tokio::test]
async fn meta_provider_is_opt_in() {
    let adapter = WordPressQueryAdapter::new(blog()).with_provider(Arc::new(NativeMetaProvider));
    let cards = adapter
        .query_and_normalize("post", "", 12, &FieldMapping::default())
        .await
        .unwrap();
    let hiring = &cards[0];
    assert_eq!(hiring.field("salary_band"), Some(&json!("B")));
    assert!(hiring.field("_edit_lock").is_none());
}

#[tokio::test]
async fn preview_carries_debug_fields() {
    let adapter = WordPressQueryAdapter::new(blog());
    let cards = adapter.preview_recent_posts().await.unwrap();
    assert_eq!(cards.len(), 3);

    let launch = cards.iter().find(|c| c.id == CardId::Int(10)).unwrap();
    assert_eq!(launch.field(DEBUG_THUMBNAIL_FIELD), Some(&json!(100)));
    assert_eq!(
        launch.field(DEBUG_IMAGE_URL_FIELD),
        Some(&json!("https://site.test/uploads/launch.jpg"))
    );

    let retro = cards.iter().find(|c| c.id == CardId::Int(11)).unwrap();
    assert_eq!(retro.field(DEBUG_THUMBNAIL_FIELD), Some(&json!(null)));
    assert_eq!(retro.field(DEBUG_IMAGE_URL_FIELD), Some(&json!(false)));
}

// =============================================================================
// Custom store
// =============================================================================

struct BrokenStore;

#[async_trait]
impl ContentStore for BrokenStore {
    fn name(&self) -> &str {
        "broken"
    }

    async fn query(&self, _query: &ContentQuery) -> Result<Vec<ContentRecord>> {
        Err(CardError::Content("connection reset".to_string()))
    }
}

#[tokio::test]
async fn store_failures_propagate() {
    let adapter = WordPressQueryAdapter::new(Arc::new(BrokenStore));
    let err = adapter
        .query_and_normalize("post", "", 12, &FieldMapping::default())
        .await
        .unwrap_err();
    assert!(matches!(err, CardError::Content(_)));
    assert_eq!(
        err.safe_message(),
        "Unable to retrieve data. Please check your data source URL."
    );
}
