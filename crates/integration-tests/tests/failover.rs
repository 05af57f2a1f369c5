//! Partial-failure and fatal-startup behavior

mod harness;

use std::sync::Arc;

use harness::host::TestHost;
use plexus_config::Config;
use plexus_mcp::{RouterError, RouterState};

fn parse_config(raw: &str) -> Config {
    let config: Config = toml::from_str(raw).expect("config must parse");
    config.validate().expect("config must validate");
    config
}

async fn connect(config: &Config) -> Result<Arc<RouterState>, RouterError> {
    let provider = plexus_embeddings::build_provider(&config.embeddings).expect("provider");
    RouterState::connect(config, provider).await.map(Arc::new)
}

#[tokio::test]
async fn failed_upstream_is_excluded_but_router_serves() {
    let bin = harness::mock_upstream_bin();
    let config = parse_config(&format!(
        r#"
        [upstreams.A]
        transport = "stdio"
        command = "{bin}"
        args = ["one=navigate to a URL"]
        semantic_prefix = "a"

        [upstreams.B]
        transport = "stdio"
        command = "/nonexistent/plexus-upstream"
        semantic_prefix = "b"
        "#
    ));

    let state = connect(&config).await.expect("startup must survive one failure");
    let mut host = TestHost::start(state);

    // The failed upstream's tools are absent from the listing
    let listing = host.request("tools/list", serde_json::json!({})).await;
    assert_eq!(TestHost::tool_names(&listing), vec!["a.one", "search_tools"]);

    // Calling into the dead upstream reports it as unavailable, with the
    // upstream id attached, rather than as an unknown tool
    let response = host.call("b.one", serde_json::json!({})).await;
    let error = response.error.expect("error");
    assert_eq!(error.code, -32000);
    assert_eq!(error.data.expect("data")["upstreamId"], "B");

    // The healthy upstream keeps serving
    let response = host.call("a.one", serde_json::json!({"url": "https://x"})).await;
    assert!(response.error.is_none());
}

#[tokio::test]
async fn all_upstreams_failing_is_fatal() {
    let config = parse_config(
        r#"
        [upstreams.A]
        transport = "stdio"
        command = "/nonexistent/plexus-upstream"

        [upstreams.B]
        transport = "stdio"
        command = "/another/nonexistent/binary"
        "#,
    );

    let err = connect(&config).await.err().expect("startup must fail");
    assert!(matches!(err, RouterError::AllUpstreamsFailed));
}

#[tokio::test]
async fn duplicate_public_names_are_fatal() {
    let bin = harness::mock_upstream_bin();
    // Two upstreams sharing a prefix and a native tool name collide
    let config = parse_config(&format!(
        r#"
        [upstreams.A]
        transport = "stdio"
        command = "{bin}"
        args = ["one=first copy"]
        semantic_prefix = "shared"

        [upstreams.B]
        transport = "stdio"
        command = "{bin}"
        args = ["one=second copy"]
        semantic_prefix = "shared"
        "#
    ));

    let err = connect(&config).await.err().expect("startup must fail");
    match err {
        RouterError::CatalogConflict { name } => assert_eq!(name, "shared.one"),
        other => panic!("expected catalog conflict, got {other:?}"),
    }
}

#[tokio::test]
async fn hung_upstream_call_times_out_with_identity() {
    let bin = harness::mock_upstream_bin();
    let config = parse_config(&format!(
        r#"
        [upstreams.A]
        transport = "stdio"
        command = "{bin}"
        args = ["one=works fine", "never=hangs forever"]
        semantic_prefix = "a"

        [router]
        call_timeout_secs = 1
        "#
    ));

    let state = connect(&config).await.expect("connect");
    let mut host = TestHost::start(state);

    let response = host.call("a.never", serde_json::json!({})).await;
    let error = response.error.expect("error");
    assert_eq!(error.code, -32000);
    let data = error.data.expect("data");
    assert_eq!(data["name"], "a.never");
    assert_eq!(data["upstreamId"], "A");

    // The timed-out call does not poison the session
    let response = host.call("a.one", serde_json::json!({})).await;
    assert!(response.error.is_none());
}

#[tokio::test]
async fn upstream_protocol_errors_pass_through() {
    let bin = harness::mock_upstream_bin();
    let config = parse_config(&format!(
        r#"
        [upstreams.A]
        transport = "stdio"
        command = "{bin}"
        args = ["fail=always errors"]
        semantic_prefix = "a"
        "#
    ));

    let state = connect(&config).await.expect("connect");
    let mut host = TestHost::start(state);

    let response = host.call("a.fail", serde_json::json!({})).await;
    let error = response.error.expect("error");
    assert_eq!(error.code, -32603);

    let data = error.data.expect("data");
    assert_eq!(data["upstreamError"]["code"], -32050);
    assert_eq!(data["upstreamError"]["message"], "boom");
    assert_eq!(data["upstreamError"]["data"]["detail"], "broken");
}

#[tokio::test]
async fn shutdown_stops_sessions_cleanly() {
    let bin = harness::mock_upstream_bin();
    let config = parse_config(&format!(
        r#"
        [upstreams.A]
        transport = "stdio"
        command = "{bin}"
        args = ["one=works"]
        semantic_prefix = "a"
        "#
    ));

    let state = connect(&config).await.expect("connect");
    state.shutdown().await;

    // After shutdown every session reports closed and calls fail fast
    let session = state.session("A").expect("session exists");
    assert!(!session.is_ready());
}
