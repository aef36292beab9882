//! End-to-end tests for [`CardService`]: proxy endpoint, render entry
//! point, native-query caching and invalidation.

use std::sync::Arc;
use std::time::Duration;

use chrono::{TimeZone, Utc};
use serde_json::json;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use cardcrafter::content::{DEBUG_IMAGE_URL_FIELD, DEBUG_THUMBNAIL_FIELD};
use cardcrafter::gateway::NO_POSTS_MESSAGE;
use cardcrafter::invalidation::DEPENDENCY_INDEX_KEY;
use cardcrafter::normalize::is_placeholder;
use cardcrafter::security::{PREVIEW_ACTION, PROXY_ACTION};
use cardcrafter::{
    CacheTtls, CardCrafter, CardId, CardService, ContentEvent, ContentRecord, DisplayOptions,
    FetchConfig, FieldMapping, KvStore, MemoryStore, MutationKind, ProxyRequest,
    RateLimitConfig, RequestContext, SiteConfig, SourceDescriptor, StaticContentStore,
    TargetPolicy,
};

const SECRET: &str = "test-secret";

struct Harness {
    service: CardService,
    store: Arc<MemoryStore>,
    content: Arc<StaticContentStore>,
}

fn harness_with(site: SiteConfig, rate_limit: RateLimitConfig) -> Harness {
    let store = Arc::new(MemoryStore::new());
    let content = Arc::new(StaticContentStore::default());
    let service = CardCrafter::builder()
        .secret(SECRET)
        .store(store.clone())
        .content_store(content.clone())
        .fetch_config(FetchConfig::default().policy(TargetPolicy::permissive()))
        .rate_limit(rate_limit)
        .site(site)
        .build()
        .unwrap();
    Harness {
        service,
        store,
        content,
    }
}

fn harness() -> Harness {
    harness_with(SiteConfig::default(), RateLimitConfig::default())
}

fn visitor(ip: &str) -> RequestContext {
    RequestContext::new().remote_addr(ip)
}

async fn team_server() -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/team.json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"id": 1, "name": "Jane", "role": "Eng", "photo": "img/jane.png"}
        ])))
        .mount(&server)
        .await;
    server
}

fn seed_posts(content: &StaticContentStore) {
    content.upsert(
        ContentRecord::new(1, "post", Utc.with_ymd_and_hms(2024, 1, 2, 8, 0, 0).unwrap())
            .title("First")
            .permalink("https://site.test/first/"),
    );
    content.upsert(
        ContentRecord::new(2, "page", Utc.with_ymd_and_hms(2024, 1, 3, 8, 0, 0).unwrap())
            .title("About"),
    );
}

// =============================================================================
// Proxy endpoint
// =============================================================================

#[tokio::test]
async fn proxy_rejects_bad_token() {
    let h = harness();
    let response = h
        .service
        .proxy_fetch(ProxyRequest::new("https://example.com/x.json", "forged"))
        .await;
    assert_eq!(response.status, 403);
    assert!(!response.is_success());
    assert_eq!(response.message(), Some("Security check failed."));
}

#[tokio::test]
async fn proxy_token_is_action_bound() {
    let h = harness();
    let preview_token = h.service.issue_token(PREVIEW_ACTION);
    let response = h
        .service
        .proxy_fetch(ProxyRequest::new("https://example.com/x.json", preview_token))
        .await;
    assert_eq!(response.status, 403);
}

#[tokio::test]
async fn proxy_returns_raw_json() {
    let server = team_server().await;
    let h = harness();
    let token = h.service.issue_token(PROXY_ACTION);

    let response = h
        .service
        .proxy_fetch(
            ProxyRequest::new(format!("{}/team.json", server.uri()), token)
                .context(visitor("203.0.113.9")),
        )
        .await;
    assert_eq!(response.status, 200);
    assert!(response.is_success());
    assert_eq!(response.body.data[0]["name"], "Jane");

    let envelope = serde_json::to_value(&response.body).unwrap();
    assert_eq!(envelope["success"], true);
}

#[tokio::test]
async fn proxy_can_normalize() {
    let server = team_server().await;
    let h = harness();
    let token = h.service.issue_token(PROXY_ACTION);
    let mapping = FieldMapping::default()
        .title("name")
        .subtitle("role")
        .image("photo");

    let response = h
        .service
        .proxy_fetch(ProxyRequest::new(format!("{}/team.json", server.uri()), token).mapping(mapping))
        .await;
    assert_eq!(response.status, 200);
    let card = &response.body.data[0];
    assert_eq!(card["title"], "Jane");
    assert_eq!(card["subtitle"], "Eng");
    assert_eq!(card["image"], format!("{}/img/jane.png", server.uri()));
}

#[tokio::test]
async fn proxy_rate_limits_per_visitor() {
    let server = team_server().await;
    let h = harness_with(
        SiteConfig::default(),
        RateLimitConfig::default().max_requests(2),
    );
    let url = format!("{}/team.json", server.uri());
    let token = h.service.issue_token(PROXY_ACTION);
    let request = |ip: &str| ProxyRequest::new(url.clone(), token.clone()).context(visitor(ip));

    assert_eq!(h.service.proxy_fetch(request("203.0.113.1")).await.status, 200);
    assert_eq!(h.service.proxy_fetch(request("203.0.113.1")).await.status, 200);

    let limited = h.service.proxy_fetch(request("203.0.113.1")).await;
    assert_eq!(limited.status, 429);
    assert_eq!(limited.message(), Some("Rate limit exceeded. Please wait."));
    assert!(limited.body.data["retry_after"].as_u64().unwrap() >= 1);

    // Another visitor has its own window; privileged callers skip the check.
    assert_eq!(h.service.proxy_fetch(request("203.0.113.2")).await.status, 200);
    let privileged = request("203.0.113.1").privileged(true);
    assert_eq!(h.service.proxy_fetch(privileged).await.status, 200);
}

#[tokio::test]
async fn proxy_errors_are_caller_safe() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let h = harness();
    let token = h.service.issue_token(PROXY_ACTION);
    let response = h
        .service
        .proxy_fetch(ProxyRequest::new(format!("{}/gone.json", server.uri()), token))
        .await;
    assert_eq!(response.status, 502);
    let message = response.message().unwrap();
    assert_eq!(message, "Data source not found. Please verify the URL is correct.");
    assert!(!message.contains("127.0.0.1"));
}

// =============================================================================
// Render
// =============================================================================

#[tokio::test]
async fn remote_render_points_the_widget_at_the_proxy() {
    let h = harness();
    let display = DisplayOptions::default().columns(99).layout("masonry");
    let config = h
        .service
        .render(
            &SourceDescriptor::remote("https://api.test/team.json"),
            &display,
            &FieldMapping::default(),
        )
        .await;

    assert!(!config.is_error());
    assert!(!config.wp_data_mode);
    assert!(!config.demo_mode);
    assert!(config.data.is_none());
    let source = config.source.unwrap();
    assert!(source.starts_with("/wp-admin/admin-ajax.php?action=cardcrafter_proxy_fetch"));
    assert!(source.contains("url=https%3A%2F%2Fapi.test%2Fteam.json"));
    assert!(source.contains("nonce="));
    assert_eq!(config.columns, 12);
    assert_eq!(config.layout, "masonry");
}

#[tokio::test]
async fn empty_url_uses_demo_source() {
    let h = harness_with(
        SiteConfig::default().demo_source("https://demo.test/team.json"),
        RateLimitConfig::default(),
    );
    let config = h
        .service
        .render(
            &SourceDescriptor::remote(""),
            &DisplayOptions::default(),
            &FieldMapping::default(),
        )
        .await;
    assert!(config.demo_mode);
    assert!(config.source.unwrap().contains("demo.test"));
}

#[tokio::test]
async fn render_degrades_to_error_config() {
    let h = harness();
    let config = h
        .service
        .render(
            &SourceDescriptor::remote("http://10.0.0.8/internal.json"),
            &DisplayOptions::default(),
            &FieldMapping::default(),
        )
        .await;
    assert!(config.is_error());
    assert!(config.source.is_none());
    assert_eq!(
        config.error.as_deref(),
        Some("Unable to retrieve data. Please check your data source URL.")
    );

    let config = h
        .service
        .render(
            &SourceDescriptor::remote(""),
            &DisplayOptions::default(),
            &FieldMapping::default(),
        )
        .await;
    assert_eq!(config.error.as_deref(), Some("Invalid URL."));
}

#[tokio::test]
async fn inline_records_render_directly() {
    let h = harness();
    let config = h
        .service
        .render(
            &SourceDescriptor::inline(json!([{"name": "Jane", "role": "Eng"}])),
            &DisplayOptions::default(),
            &FieldMapping::default().title("name").subtitle("role"),
        )
        .await;
    let cards = config.data.unwrap();
    assert_eq!(cards[0].title, "Jane");
    assert_eq!(cards[0].subtitle, "Eng");

    let bad = h
        .service
        .render(
            &SourceDescriptor::inline(json!({"not": "an array"})),
            &DisplayOptions::default(),
            &FieldMapping::default(),
        )
        .await;
    assert_eq!(bad.error.as_deref(), Some("Invalid JSON from source."));
}

#[tokio::test]
async fn fetch_cards_normalizes_remote_sources() {
    let server = team_server().await;
    let h = harness();
    let cards = h
        .service
        .fetch_cards(
            &SourceDescriptor::remote(format!("{}/team.json", server.uri())),
            &FieldMapping::default().title("name"),
        )
        .await
        .unwrap();
    assert_eq!(cards.len(), 1);
    assert_eq!(cards[0].id, CardId::Int(1));
    assert_eq!(cards[0].title, "Jane");
    assert_eq!(cards[0].field("role"), Some(&json!("Eng")));
}

#[tokio::test]
async fn team_feed_normalizes_with_fallbacks() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/team.json"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!([{"name": "Jane", "role": "Eng"}])),
        )
        .mount(&server)
        .await;

    let h = harness();
    let cards = h
        .service
        .fetch_cards(
            &SourceDescriptor::remote(format!("{}/team.json", server.uri())),
            &FieldMapping::default().title("name").subtitle("role"),
        )
        .await
        .unwrap();

    assert_eq!(cards.len(), 1);
    let card = &cards[0];
    assert_eq!(card.title, "Jane");
    assert_eq!(card.subtitle, "Eng");
    assert_eq!(card.description, "");
    assert_eq!(card.link, "");
    assert!(is_placeholder(&card.image));
    assert!(card.extra.is_empty());
}

// =============================================================================
// Native queries
// =============================================================================

#[tokio::test]
async fn native_render_is_cached_and_registered() {
    let h = harness();
    seed_posts(&h.content);
    let source = SourceDescriptor::wordpress("post");
    let mapping = FieldMapping::default();

    let config = h
        .service
        .render(&source, &DisplayOptions::default(), &mapping)
        .await;
    assert!(config.wp_data_mode);
    assert_eq!(config.data.as_ref().unwrap()[0].title, "First");

    // Second render is served from the cache.
    h.service
        .render(&source, &DisplayOptions::default(), &mapping)
        .await;
    assert_eq!(h.content.query_count(), 1);

    let key = h.service.wp_cache_key("post", "", 12, &mapping).unwrap();
    assert!(key.starts_with("cardcrafter_wp_query_"));
    assert!(h.store.get(&key).await.unwrap().is_some());
    assert_eq!(h.service.invalidation().keys_for("post").await.unwrap(), vec![key]);
    assert!(h.store.get(DEPENDENCY_INDEX_KEY).await.unwrap().is_some());
}

#[tokio::test]
async fn cache_key_covers_render_inputs() {
    let h = harness();
    let mapping = FieldMapping::default();
    let base = h.service.wp_cache_key("post", "", 12, &mapping).unwrap();

    assert_ne!(base, h.service.wp_cache_key("page", "", 12, &mapping).unwrap());
    assert_ne!(base, h.service.wp_cache_key("post", "tag=a", 12, &mapping).unwrap());
    assert_ne!(base, h.service.wp_cache_key("post", "", 6, &mapping).unwrap());
    assert_ne!(
        base,
        h.service
            .wp_cache_key("post", "", 12, &FieldMapping::default().title("name"))
            .unwrap()
    );

    let french = harness_with(SiteConfig::default().locale("fr_FR"), RateLimitConfig::default());
    assert_ne!(base, french.service.wp_cache_key("post", "", 12, &mapping).unwrap());

    // Clamped sizes share a key.
    assert_eq!(
        h.service.wp_cache_key("post", "", 100, &mapping).unwrap(),
        h.service.wp_cache_key("post", "", 5000, &mapping).unwrap()
    );
}

#[tokio::test]
async fn mutation_evicts_only_its_content_type() {
    let h = harness();
    seed_posts(&h.content);
    let mapping = FieldMapping::default();

    h.service
        .fetch_cards(&SourceDescriptor::wordpress("post"), &mapping)
        .await
        .unwrap();
    h.service
        .fetch_cards(&SourceDescriptor::wordpress("page"), &mapping)
        .await
        .unwrap();
    let post_key = h.service.wp_cache_key("post", "", 12, &mapping).unwrap();
    let page_key = h.service.wp_cache_key("page", "", 12, &mapping).unwrap();

    // Revisions and autosaves change nothing.
    let evicted = h
        .service
        .on_content_mutated(&ContentEvent::new(MutationKind::Autosave, "post").id(1))
        .await
        .unwrap();
    assert_eq!(evicted, 0);
    assert!(h.store.get(&post_key).await.unwrap().is_some());

    let evicted = h
        .service
        .on_content_mutated(&ContentEvent::new(MutationKind::Updated, "post").id(1))
        .await
        .unwrap();
    assert_eq!(evicted, 1);
    assert!(h.store.get(&post_key).await.unwrap().is_none());
    assert!(h.store.get(&page_key).await.unwrap().is_some());
    assert!(h.service.invalidation().keys_for("post").await.unwrap().is_empty());

    // The next render sees fresh content.
    h.content.upsert(
        ContentRecord::new(3, "post", Utc.with_ymd_and_hms(2024, 2, 1, 8, 0, 0).unwrap())
            .title("Second"),
    );
    let cards = h
        .service
        .fetch_cards(&SourceDescriptor::wordpress("post"), &mapping)
        .await
        .unwrap();
    assert_eq!(cards[0].title, "Second");
}

#[tokio::test]
async fn debug_mode_bypasses_the_cache() {
    let h = harness_with(SiteConfig::default().debug(true), RateLimitConfig::default());
    seed_posts(&h.content);
    let source = SourceDescriptor::wordpress("post");
    for _ in 0..2 {
        h.service
            .fetch_cards(&source, &FieldMapping::default())
            .await
            .unwrap();
    }
    assert_eq!(h.content.query_count(), 2);
}

#[tokio::test]
async fn empty_native_result_is_cached_briefly() {
    let store = Arc::new(MemoryStore::new());
    let service = CardCrafter::builder()
        .secret(SECRET)
        .store(store.clone())
        .cache_ttls(CacheTtls::default().empty_result(Duration::from_millis(100)))
        .build()
        .unwrap();

    let cards = service
        .fetch_cards(&SourceDescriptor::wordpress("post"), &FieldMapping::default())
        .await
        .unwrap();
    assert!(cards.is_empty());

    let key = service
        .wp_cache_key("post", "", 12, &FieldMapping::default())
        .unwrap();
    assert_eq!(store.get(&key).await.unwrap(), Some(json!([])));
    tokio::time::sleep(Duration::from_millis(250)).await;
    assert!(store.get(&key).await.unwrap().is_none());
}

#[tokio::test]
async fn native_render_rejects_bad_input() {
    let h = harness();
    let config = h
        .service
        .render(
            &SourceDescriptor::wordpress("post").with_query("post_status=draft"),
            &DisplayOptions::default(),
            &FieldMapping::default(),
        )
        .await;
    assert!(config.wp_data_mode);
    assert_eq!(config.error.as_deref(), Some("Invalid query parameters."));
    assert_eq!(h.content.query_count(), 0);
}

// =============================================================================
// Preview
// =============================================================================

#[tokio::test]
async fn preview_requires_its_own_token() {
    let h = harness();
    let proxy_token = h.service.issue_token(PROXY_ACTION);
    assert_eq!(h.service.posts_preview(&proxy_token).await.status, 403);
}

#[tokio::test]
async fn preview_without_posts_is_not_found() {
    let h = harness();
    let token = h.service.issue_token(PREVIEW_ACTION);
    let response = h.service.posts_preview(&token).await;
    assert_eq!(response.status, 404);
    assert_eq!(response.message(), Some(NO_POSTS_MESSAGE));
}

#[tokio::test]
async fn preview_lists_recent_posts() {
    let h = harness();
    seed_posts(&h.content);
    let token = h.service.issue_token(PREVIEW_ACTION);
    let response = h.service.posts_preview(&token).await;
    assert_eq!(response.status, 200);
    let posts = response.body.data.as_array().unwrap();
    assert_eq!(posts.len(), 1);
    assert_eq!(posts[0]["title"], "First");
    assert!(posts[0].get(DEBUG_THUMBNAIL_FIELD).is_some());
    assert_eq!(posts[0][DEBUG_IMAGE_URL_FIELD], false);
}
