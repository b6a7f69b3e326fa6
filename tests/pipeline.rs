//! Integration tests for the stream pipeline.
//!
//! Every test runs against a local `wiremock` fixture site that plays the
//! roles of the DLE site, its AJAX endpoint, the embed players and the CDN.

use std::collections::HashSet;

use anitube_source::{
    AnimeSource, AnitubeSource, EpisodeReference, ManifestExpander, SiteClient, SourceConfig,
    SourceError, StreamResolver,
};
use tracing_subscriber::EnvFilter;
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const MASTER: &str = "#EXTM3U\n\
#EXT-X-STREAM-INF:BANDWIDTH=5000000,RESOLUTION=1920x1080\n\
1080/index.m3u8\n\
#EXT-X-STREAM-INF:BANDWIDTH=2500000,RESOLUTION=1280x720\n\
720/index.m3u8\n";

const MEDIA: &str = "#EXTM3U\n#EXT-X-TARGETDURATION:6\n#EXTINF:6.0,\nseg0.ts\n#EXTINF:6.0,\nseg1.ts\n#EXT-X-ENDLIST\n";

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn config_for(server: &MockServer) -> SourceConfig {
    let mut config = SourceConfig::with_origin(&server.uri()).unwrap();
    config.timeout_secs = 5;
    config
}

async fn mount_get(server: &MockServer, at: &str, body: String) {
    Mock::given(method("GET"))
        .and(path(at))
        .respond_with(ResponseTemplate::new(200).set_body_string(body))
        .mount(server)
        .await;
}

fn page_with_container(news_id: &str) -> String {
    format!(
        r#"<html><body>
<h2 itemprop="name">Фрірен</h2>
<div class="playlists-ajax" data-news_id="{news_id}" data-xfname="playlist"></div>
</body></html>"#
    )
}

/// Two teams for episode 1, one for episode 2; team C points at the same
/// manifest page as team A.
fn fragment(uri: &str) -> String {
    format!(
        r#"<div class="playlists-lists">
  <ul><li data-id="0_0">Озвучування</li></ul>
  <ul><li data-id="0_0_0">TeamA</li><li data-id="0_0_1">TeamB</li><li data-id="0_0_2">TeamC</li></ul>
  <ul><li data-id="0_0_0_0">ПЛЕЄР ASHDI</li><li data-id="0_0_1_0">ПЛЕЄР TORTUGA</li><li data-id="0_0_2_0">ПЛЕЄР ASHDI</li></ul>
</div>
<div class="playlists-videos"><ul>
  <li data-id="0_0_0_0" data-file="{uri}/embed/a">1 серія</li>
  <li data-id="0_0_0_0" data-file="{uri}/embed/a2">2 серія</li>
  <li data-id="0_0_1_0" data-file="{uri}/embed/b">1 серія</li>
  <li data-id="0_0_2_0" data-file="{uri}/embed/a">1 серія</li>
</ul></div>"#
    )
}

async fn mount_site(server: &MockServer) {
    let uri = server.uri();
    mount_get(server, "/4110-frieren.html", page_with_container("4110")).await;

    let envelope = serde_json::json!({ "success": true, "response": fragment(&uri) });
    Mock::given(method("GET"))
        .and(path("/engine/ajax/playlists.php"))
        .and(query_param("news_id", "4110"))
        .and(query_param("xfield", "playlist"))
        .and(header("X-Requested-With", "XMLHttpRequest"))
        .respond_with(ResponseTemplate::new(200).set_body_json(envelope))
        .mount(server)
        .await;

    // Team A: Playerjs page with an escaped manifest literal.
    mount_get(
        server,
        "/embed/a",
        format!(
            r#"<script>new Playerjs({{id:"player", file:"{}"}});</script>"#,
            format!("{uri}/hls/a/master.m3u8").replace('/', "\\/")
        ),
    )
    .await;
    Mock::given(method("GET"))
        .and(path("/hls/a/master.m3u8"))
        .and(header("Referer", format!("{uri}/embed/a").as_str()))
        .respond_with(ResponseTemplate::new(200).set_body_string(MASTER))
        .mount(server)
        .await;

    // Team B: wrapper iframe around a page that only has an mp4.
    mount_get(
        server,
        "/embed/b",
        r#"<html><body><iframe src="/embed/b2"></iframe></body></html>"#.to_string(),
    )
    .await;
    mount_get(
        server,
        "/embed/b2",
        format!(r#"<video src="{uri}/files/b/720.mp4"></video><script>var f = "{uri}/files/b/720.mp4";</script>"#),
    )
    .await;
}

#[tokio::test]
async fn resolves_episode_streams_end_to_end() -> anyhow::Result<()> {
    init_tracing();
    let server = MockServer::start().await;
    mount_site(&server).await;
    let uri = server.uri();

    let source = AnitubeSource::new(config_for(&server))?;
    let episode = EpisodeReference::new(format!("{uri}/4110-frieren.html")).with_episode("1 серія");
    let streams = source.get_streams(&episode).await?;

    let urls: Vec<&str> = streams.iter().map(|s| s.url.as_str()).collect();
    assert_eq!(
        urls.len(),
        3,
        "expected two HLS variants and one mp4, got {urls:?}"
    );
    assert!(urls.contains(&format!("{uri}/hls/a/1080/index.m3u8").as_str()));
    assert!(urls.contains(&format!("{uri}/hls/a/720/index.m3u8").as_str()));
    assert!(urls.contains(&format!("{uri}/files/b/720.mp4").as_str()));

    let hd = streams
        .iter()
        .find(|s| s.url.ends_with("/1080/index.m3u8"))
        .unwrap();
    assert!(hd.label.contains("ПЛЕЄР ASHDI"));
    assert!(hd.label.ends_with("1080p"));
    assert_eq!(hd.referer(), Some(format!("{uri}/embed/a").as_str()));

    let mp4 = streams.iter().find(|s| s.url.ends_with(".mp4")).unwrap();
    assert!(mp4.label.contains("TeamB"));
    assert!(mp4.label.ends_with("Direct (mp4)"));
    assert_eq!(mp4.referer(), Some(format!("{uri}/embed/b2").as_str()));
    Ok(())
}

#[tokio::test]
async fn output_urls_are_unique_and_stable() -> anyhow::Result<()> {
    init_tracing();
    let server = MockServer::start().await;
    mount_site(&server).await;

    let source = AnitubeSource::new(config_for(&server))?;
    let episode = EpisodeReference::new(format!("{}/4110-frieren.html", server.uri()));

    let first = source.get_streams(&episode).await?;
    let unique: HashSet<&str> = first.iter().map(|s| s.url.as_str()).collect();
    assert_eq!(unique.len(), first.len());

    let second = source.get_streams(&episode).await?;
    let again: HashSet<&str> = second.iter().map(|s| s.url.as_str()).collect();
    assert_eq!(unique, again);
    Ok(())
}

#[tokio::test]
async fn ajax_failure_falls_back_to_page_markup() -> anyhow::Result<()> {
    init_tracing();
    let server = MockServer::start().await;
    let uri = server.uri();

    let page = format!(
        r#"<div class="playlists-ajax" data-news_id="77"></div>
<ul><li data-id="0_0">FanVoxUA</li></ul>
<ul>
  <li data-id="0_0" data-file="{uri}/embed/1">1 серія</li>
  <li data-id="0_0" data-file="{uri}/embed/2">2 серія</li>
</ul>"#
    );
    mount_get(&server, "/77-title.html", page).await;
    Mock::given(method("GET"))
        .and(path("/engine/ajax/playlists.php"))
        .respond_with(ResponseTemplate::new(500))
        .expect(1)
        .mount(&server)
        .await;

    let source = AnitubeSource::new(config_for(&server))?;
    let entries = source
        .pipeline()
        .locator()
        .locate(&EpisodeReference::new(format!("{uri}/77-title.html")))
        .await?;

    assert_eq!(entries.len(), 2);
    // Newest-first on the site, playback order after reversal.
    assert_eq!(entries[0].episode, "2 серія");
    assert_eq!(entries[1].raw_reference, format!("{uri}/embed/1"));
    assert_eq!(entries[1].label, "FanVoxUA");
    Ok(())
}

#[tokio::test]
async fn rejected_envelope_falls_back_to_page() -> anyhow::Result<()> {
    init_tracing();
    let server = MockServer::start().await;
    let uri = server.uri();

    let page = format!(r#"<div data-news_id="5"></div><li data-file="{uri}/embed/x">1 серія</li>"#);
    mount_get(&server, "/5-x.html", page).await;
    Mock::given(method("GET"))
        .and(path("/engine/ajax/playlists.php"))
        .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"success":false}"#))
        .mount(&server)
        .await;

    let mut config = config_for(&server);
    config.reverse_playlist = false;
    let source = AnitubeSource::new(config)?;
    let entries = source
        .pipeline()
        .locator()
        .locate(&EpisodeReference::new(format!("{uri}/5-x.html")))
        .await?;
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].label, "1 серія");
    Ok(())
}

#[tokio::test]
async fn page_fetch_failure_is_fatal() -> anyhow::Result<()> {
    init_tracing();
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/404-gone.html"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let source = AnitubeSource::new(config_for(&server))?;
    let result = source
        .get_streams(&EpisodeReference::new(format!("{}/404-gone.html", server.uri())))
        .await;
    assert!(matches!(result, Err(SourceError::EpisodePage { .. })));
    Ok(())
}

#[tokio::test]
async fn episode_without_streams_is_empty_not_error() -> anyhow::Result<()> {
    init_tracing();
    let server = MockServer::start().await;
    mount_get(&server, "/anime/", "<html><body>nothing</body></html>".to_string()).await;

    let source = AnitubeSource::new(config_for(&server))?;
    let streams = source
        .get_streams(&EpisodeReference::new(format!("{}/anime/", server.uri())))
        .await?;
    assert!(streams.is_empty());
    Ok(())
}

#[tokio::test]
async fn iframe_chain_beyond_budget_terminates() -> anyhow::Result<()> {
    init_tracing();
    let server = MockServer::start().await;
    let uri = server.uri();

    for i in 0..15 {
        let body = if i == 14 {
            format!(r#"<script>var f = "{uri}/hls/deep/index.m3u8";</script>"#)
        } else {
            format!(r#"<iframe src="/chain/{}"></iframe>"#, i + 1)
        };
        let expected = if i < 10 { 1 } else { 0 };
        Mock::given(method("GET"))
            .and(path(format!("/chain/{i}").as_str()))
            .respond_with(ResponseTemplate::new(200).set_body_string(body))
            .expect(expected)
            .mount(&server)
            .await;
    }

    let mut config = config_for(&server);
    config.max_embed_visits = 10;
    config.max_embed_depth = 100;
    let resolver = StreamResolver::new(SiteClient::new(config)?);
    let streams = resolver.resolve(&format!("{uri}/chain/0"), &uri).await;
    assert!(streams.is_empty());
    Ok(())
}

#[tokio::test]
async fn capped_chain_keeps_streams_found_inside_budget() -> anyhow::Result<()> {
    init_tracing();
    let server = MockServer::start().await;
    let uri = server.uri();

    for i in 0..15 {
        let next = format!(r#"<iframe src="/cap/{}"></iframe>"#, i + 1);
        let body = if i == 5 {
            format!(r#"<script>var mp4 = "{uri}/media/ep5.mp4";</script>{next}"#)
        } else {
            next
        };
        Mock::given(method("GET"))
            .and(path(format!("/cap/{i}").as_str()))
            .respond_with(ResponseTemplate::new(200).set_body_string(body))
            .expect(if i < 10 { 1 } else { 0 })
            .mount(&server)
            .await;
    }

    let mut config = config_for(&server);
    config.max_embed_visits = 10;
    config.max_embed_depth = 100;
    let resolver = StreamResolver::new(SiteClient::new(config)?);
    let streams = resolver.resolve(&format!("{uri}/cap/0"), &uri).await;
    assert_eq!(streams.len(), 1);
    assert_eq!(streams[0].url, format!("{uri}/media/ep5.mp4"));
    assert_eq!(streams[0].label, "Direct (mp4)");
    assert_eq!(streams[0].referer(), Some(format!("{uri}/cap/5").as_str()));
    Ok(())
}

#[tokio::test]
async fn iframe_chain_within_budget_resolves() -> anyhow::Result<()> {
    init_tracing();
    let server = MockServer::start().await;
    let uri = server.uri();

    mount_get(&server, "/nest/0", r#"<iframe src="/nest/1"></iframe>"#.to_string()).await;
    mount_get(&server, "/nest/1", r#"<iframe src="/nest/2"></iframe>"#.to_string()).await;
    mount_get(
        &server,
        "/nest/2",
        format!(r#"<script>var f = '{uri}/hls/nest/index.m3u8';</script>"#),
    )
    .await;
    mount_get(&server, "/hls/nest/index.m3u8", MEDIA.to_string()).await;

    let resolver = StreamResolver::new(SiteClient::new(config_for(&server))?);
    let streams = resolver.resolve(&format!("{uri}/nest/0"), &uri).await;
    assert_eq!(streams.len(), 1);
    assert_eq!(streams[0].url, format!("{uri}/hls/nest/index.m3u8"));
    assert_eq!(streams[0].label, "Default");
    assert_eq!(streams[0].referer(), Some(format!("{uri}/nest/2").as_str()));
    Ok(())
}

#[tokio::test]
async fn iframe_depth_limit_stops_descent() -> anyhow::Result<()> {
    init_tracing();
    let server = MockServer::start().await;
    let uri = server.uri();

    mount_get(&server, "/deep/0", r#"<iframe src="/deep/1"></iframe>"#.to_string()).await;
    mount_get(&server, "/deep/1", r#"<iframe src="/deep/2"></iframe>"#.to_string()).await;
    Mock::given(method("GET"))
        .and(path("/deep/2"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<p></p>"))
        .expect(0)
        .mount(&server)
        .await;

    let mut config = config_for(&server);
    config.max_embed_depth = 1;
    let resolver = StreamResolver::new(SiteClient::new(config)?);
    assert!(resolver.resolve(&format!("{uri}/deep/0"), &uri).await.is_empty());
    Ok(())
}

#[tokio::test]
async fn iframe_cycles_terminate() -> anyhow::Result<()> {
    init_tracing();
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/loop/a"))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            r#"<iframe src="/loop/a"></iframe><iframe src="/loop/b"></iframe>"#,
        ))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/loop/b"))
        .respond_with(ResponseTemplate::new(200).set_body_string(r#"<iframe src="/loop/a"></iframe>"#))
        .expect(1)
        .mount(&server)
        .await;

    let uri = server.uri();
    let resolver = StreamResolver::new(SiteClient::new(config_for(&server))?);
    assert!(resolver.resolve(&format!("{uri}/loop/a"), &uri).await.is_empty());
    Ok(())
}

#[tokio::test]
async fn dead_sibling_does_not_block_others() -> anyhow::Result<()> {
    init_tracing();
    let server = MockServer::start().await;
    let uri = server.uri();

    mount_get(
        &server,
        "/mirror/0",
        r#"<iframe src="/mirror/dead"></iframe><iframe src="/mirror/live"></iframe>"#.to_string(),
    )
    .await;
    Mock::given(method("GET"))
        .and(path("/mirror/dead"))
        .respond_with(ResponseTemplate::new(502))
        .mount(&server)
        .await;
    mount_get(
        &server,
        "/mirror/live",
        format!(r#"<script>var f = "{uri}/hls/live/master.m3u8";</script>"#),
    )
    .await;
    mount_get(&server, "/hls/live/master.m3u8", MASTER.to_string()).await;

    let resolver = StreamResolver::new(SiteClient::new(config_for(&server))?);
    let streams = resolver.resolve(&format!("{uri}/mirror/0"), &uri).await;
    let labels: Vec<&str> = streams.iter().map(|s| s.label.as_str()).collect();
    assert_eq!(labels, vec!["1080p", "720p"]);
    Ok(())
}

#[tokio::test]
async fn direct_mp4_reference_needs_no_fetch() -> anyhow::Result<()> {
    init_tracing();
    let server = MockServer::start().await;
    let uri = server.uri();

    let resolver = StreamResolver::new(SiteClient::new(config_for(&server))?);
    let streams = resolver
        .resolve(&format!("{uri}/files/ep1.mp4"), "https://page.example/ep1")
        .await;
    assert_eq!(streams.len(), 1);
    assert_eq!(streams[0].label, "Direct (mp4)");
    assert_eq!(streams[0].referer(), Some("https://page.example/ep1"));
    Ok(())
}

#[tokio::test]
async fn expander_handles_master_media_and_failures() -> anyhow::Result<()> {
    init_tracing();
    let server = MockServer::start().await;
    let uri = server.uri();

    mount_get(&server, "/cdn/master.m3u8", MASTER.to_string()).await;
    mount_get(&server, "/cdn/media.m3u8", MEDIA.to_string()).await;
    mount_get(&server, "/cdn/bogus.m3u8", "<html>captcha</html>".to_string()).await;
    Mock::given(method("GET"))
        .and(path("/cdn/broken.m3u8"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let expander = ManifestExpander::new(SiteClient::new(config_for(&server))?);
    let referer = format!("{uri}/embed/x");

    let master = expander
        .expand(&format!("{uri}/cdn/master.m3u8"), &referer)
        .await;
    assert_eq!(master.len(), 2);
    assert_eq!(master[0].label, "1080p");
    assert_eq!(master[0].url, format!("{uri}/cdn/1080/index.m3u8"));
    assert_eq!(master[1].label, "720p");
    assert_eq!(master[1].url, format!("{uri}/cdn/720/index.m3u8"));

    let media = expander.expand(&format!("{uri}/cdn/media.m3u8"), &referer).await;
    assert_eq!(media.len(), 1);
    assert_eq!(media[0].label, "Default");
    assert_eq!(media[0].url, format!("{uri}/cdn/media.m3u8"));
    assert_eq!(media[0].referer(), Some(referer.as_str()));

    assert!(expander
        .expand(&format!("{uri}/cdn/bogus.m3u8"), &referer)
        .await
        .is_empty());
    assert!(expander
        .expand(&format!("{uri}/cdn/broken.m3u8"), &referer)
        .await
        .is_empty());
    Ok(())
}
