//! End-to-end behavior of the dispatcher: CAS handshake, session reuse,
//! origin and CSRF filtering, static and dynamic dispatch.

mod common;

use axum::http::{header, StatusCode};
use tokio::sync::mpsc;

use cas_gate::Shutdown;
use common::{body_bytes, body_string, location, session_cookie, set_cookies, Harness, TestRequest, COOKIE};

const LOGIN_FOR_ROOT: &str =
    "https://cas.example.edu/cas/logon?service=https%3A%2F%2Fgate.example.edu%2Fapp%2F";

#[tokio::test]
async fn test_plain_transport_redirects_to_https() {
    let mut h = Harness::new();

    let response = h
        .send(TestRequest::get("/app/page.html?x=1").insecure())
        .await;

    assert_eq!(response.status(), StatusCode::FOUND);
    assert_eq!(location(&response), "https://gate.example.edu/app/page.html?x=1");
    assert_eq!(h.validator.calls(), 0);
    assert_eq!(h.handler_calls(), 0);
}

#[tokio::test]
async fn test_anonymous_get_redirects_to_cas_login() {
    let mut h = Harness::new();

    let response = h.send(TestRequest::get("/app/")).await;

    assert_eq!(response.status(), StatusCode::FOUND);
    assert_eq!(location(&response), LOGIN_FOR_ROOT);
    assert!(set_cookies(&response).is_empty());
    assert_eq!(h.handler_calls(), 0);
}

#[tokio::test]
async fn test_login_service_keeps_deep_link_query() {
    let mut h = Harness::new();

    let response = h.send(TestRequest::get("/app/list?page=2")).await;

    assert_eq!(
        location(&response),
        "https://cas.example.edu/cas/logon?service=https%3A%2F%2Fgate.example.edu%2Fapp%2Flist%3Fpage%3D2"
    );
}

#[tokio::test]
async fn test_valid_ticket_sets_cookie_and_lands_on_root() {
    let mut h = Harness::new();
    h.validator.accept("ABC123", "jdoe");

    let response = h.send(TestRequest::get("/app/reports?ticket=ABC123")).await;

    assert_eq!(response.status(), StatusCode::FOUND);
    assert_eq!(location(&response), "/app/");
    assert_eq!(
        set_cookies(&response),
        vec![format!("{}=ABC123; Path=/app/; Secure; HttpOnly", COOKIE)]
    );
    assert_eq!(h.validator.services(), vec!["https://gate.example.edu/app/reports"]);
    assert_eq!(h.dispatcher.cas().sessions().identity("ABC123"), Some("jdoe"));
    assert_eq!(h.handler_calls(), 0);
}

#[tokio::test]
async fn test_second_login_reuses_first_ticket() {
    let mut h = Harness::new();
    let first = h.login("ST-1", "jdoe").await;
    let second = h.login("ST-2", "jdoe").await;

    assert_eq!(first, "ST-1");
    assert_eq!(second, "ST-1");
    assert_eq!(h.dispatcher.cas().sessions().len(), 1);
    assert_eq!(h.dispatcher.cas().sessions().identity("ST-2"), None);
}

#[tokio::test]
async fn test_rejected_ticket_falls_back_to_login() {
    let mut h = Harness::new();

    let response = h.send(TestRequest::get("/app/?ticket=FORGED")).await;

    assert_eq!(response.status(), StatusCode::FOUND);
    assert_eq!(location(&response), LOGIN_FOR_ROOT);
    assert_eq!(h.validator.calls(), 1);
    assert!(h.dispatcher.cas().sessions().is_empty());
}

#[tokio::test]
async fn test_session_cookie_skips_validation() {
    let mut h = Harness::new();
    let cookie = h.login("ST-1", "jdoe").await;
    assert_eq!(h.validator.calls(), 1);

    let response = h.send(TestRequest::get("/app/hello").cookie(&cookie)).await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_string(response).await, "hello jdoe");
    assert_eq!(h.validator.calls(), 1);
    assert_eq!(h.handler_calls(), 1);
}

#[tokio::test]
async fn test_cookie_among_several_headers_is_found() {
    let mut h = Harness::new();
    let cookie = h.login("ST-1", "jdoe").await;

    let response = h
        .send(
            TestRequest::get("/app/hello")
                .header(header::COOKIE, "theme=dark")
                .header(header::COOKIE, &format!("{}=stale; {}={}", COOKIE, COOKIE, cookie)),
        )
        .await;

    assert_eq!(response.status(), StatusCode::OK);
    assert!(set_cookies(&response).is_empty());
}

#[tokio::test]
async fn test_unknown_cookie_is_deleted() {
    let mut h = Harness::new();

    let response = h.send(TestRequest::get("/app/").cookie("ST-GONE")).await;

    assert_eq!(response.status(), StatusCode::FOUND);
    assert_eq!(location(&response), LOGIN_FOR_ROOT);
    let cookies = set_cookies(&response);
    assert_eq!(cookies.len(), 1);
    assert!(cookies[0].starts_with(&format!("{}=;", COOKIE)));
    assert!(cookies[0].contains("Max-Age=0"));
    assert!(cookies[0].contains("Path=/app/"));
    assert_eq!(session_cookie(&response), None);
}

#[tokio::test]
async fn test_stale_cookie_with_valid_ticket_replaces_cookie() {
    let mut h = Harness::new();
    h.validator.accept("ST-5", "jdoe");

    let response = h
        .send(TestRequest::get("/app/?ticket=ST-5").cookie("ST-GONE"))
        .await;

    assert_eq!(response.status(), StatusCode::FOUND);
    assert_eq!(location(&response), "/app/");
    let cookies = set_cookies(&response);
    assert_eq!(cookies.len(), 2);
    assert!(cookies[0].starts_with(&format!("{}=;", COOKIE)));
    assert!(cookies[0].contains("Max-Age=0"));
    assert_eq!(
        cookies[1],
        format!("{}=ST-5; Path=/app/; Secure; HttpOnly", COOKIE)
    );
    assert_eq!(session_cookie(&response).as_deref(), Some("ST-5"));
}

#[tokio::test]
async fn test_ticket_on_live_session_returns_to_root() {
    let mut h = Harness::new();
    let cookie = h.login("ST-1", "jdoe").await;
    h.validator.accept("ST-2", "jdoe");

    let response = h
        .send(TestRequest::get("/app/?ticket=ST-2").cookie(&cookie))
        .await;

    assert_eq!(response.status(), StatusCode::FOUND);
    assert_eq!(location(&response), "/app/");
    assert!(set_cookies(&response).is_empty());
    assert_eq!(h.validator.calls(), 1);
    assert_eq!(h.handler_calls(), 0);

    let next = h.send(TestRequest::get("/app/").cookie(&cookie)).await;
    assert_eq!(next.status(), StatusCode::OK);
    assert_eq!(body_string(next).await, "hello jdoe");
}

#[tokio::test]
async fn test_day_rollover_forces_reauthentication() {
    let mut h = Harness::new();
    let cookie = h.login("ST-1", "jdoe").await;

    h.clock.advance_day();
    let response = h.send(TestRequest::get("/app/hello").cookie(&cookie)).await;

    assert_eq!(response.status(), StatusCode::FOUND);
    assert_eq!(location(&response), LOGIN_FOR_ROOT);
    assert!(set_cookies(&response)[0].contains("Max-Age=0"));
    assert!(h.dispatcher.cas().sessions().is_empty());
    assert_eq!(h.handler_calls(), 0);
}

#[tokio::test]
async fn test_anonymous_post_is_not_replayable() {
    let mut h = Harness::new();

    let response = h
        .send(TestRequest::post_form("/app/save", "name=x"))
        .await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(
        body_string(response).await,
        "Session required: reload the page to sign in again"
    );
    assert_eq!(h.handler_calls(), 0);
}

#[tokio::test]
async fn test_app_without_slash_redirects_to_root() {
    let mut h = Harness::new();
    let cookie = h.login("ST-1", "jdoe").await;

    let response = h
        .send(
            TestRequest::get("/app")
                .cookie(&cookie)
                .header(header::ORIGIN, "https://evil.example.com"),
        )
        .await;

    assert_eq!(response.status(), StatusCode::FOUND);
    assert_eq!(location(&response), "/app/");
}

#[tokio::test]
async fn test_foreign_origin_is_rejected() {
    let mut h = Harness::new();
    let cookie = h.login("ST-1", "jdoe").await;

    let get = h
        .send(
            TestRequest::get("/app/hello")
                .cookie(&cookie)
                .header(header::ORIGIN, "https://evil.example.com"),
        )
        .await;
    assert_eq!(get.status(), StatusCode::BAD_REQUEST);

    let post = h
        .send(
            TestRequest::post_form("/app/save", &format!("csrf_token={}", cookie))
                .cookie(&cookie)
                .header(header::ORIGIN, "https://evil.example.com"),
        )
        .await;
    assert_eq!(post.status(), StatusCode::BAD_REQUEST);
    assert_eq!(h.handler_calls(), 0);
}

#[tokio::test]
async fn test_own_origin_is_accepted() {
    let mut h = Harness::new();
    let cookie = h.login("ST-1", "jdoe").await;

    let response = h
        .send(
            TestRequest::get("/app/hello")
                .cookie(&cookie)
                .header(header::ORIGIN, "HTTPS://Gate.Example.Edu/")
                .header(header::REFERER, "https://gate.example.edu/app/"),
        )
        .await;

    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_foreign_referer_is_rejected() {
    let mut h = Harness::new();
    let cookie = h.login("ST-1", "jdoe").await;

    let response = h
        .send(
            TestRequest::get("/app/hello")
                .cookie(&cookie)
                .header(header::REFERER, "https://evil.example.com/app/"),
        )
        .await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(h.handler_calls(), 0);
}

#[tokio::test]
async fn test_post_without_csrf_token_is_rejected() {
    let mut h = Harness::new();
    let cookie = h.login("ST-1", "jdoe").await;

    let response = h
        .send(TestRequest::post_form("/app/save", "name=x").cookie(&cookie))
        .await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(h.handler_calls(), 0);
}

#[tokio::test]
async fn test_query_with_wrong_csrf_token_is_rejected() {
    let mut h = Harness::new();
    let cookie = h.login("ST-1", "jdoe").await;

    let response = h
        .send(TestRequest::get("/app/search?q=x&csrf_token=ST-2").cookie(&cookie))
        .await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(h.handler_calls(), 0);
}

#[tokio::test]
async fn test_post_with_csrf_token_reaches_handler() {
    let mut h = Harness::new();
    let cookie = h.login("ST-1", "jdoe").await;

    let response = h
        .send(
            TestRequest::post_form("/app/save", &format!("name=x+y&csrf_token={}", cookie))
                .cookie(&cookie)
                .header(header::ORIGIN, "https://gate.example.edu"),
        )
        .await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(h.handler_calls(), 1);
    assert_eq!(
        *h.last_params.lock().unwrap(),
        vec![("name".to_string(), "x y".to_string())]
    );
}

#[tokio::test]
async fn test_static_page_is_served_with_substitutions() {
    let mut h = Harness::new();
    h.write_asset(
        "html/page.html",
        b"<p>{{identity}}</p><input name=\"csrf_token\" value=\"{{csrf_token}}\">",
    );
    let cookie = h.login("ST-1", "jdoe").await;

    let response = h.send(TestRequest::get("/app/page.html").cookie(&cookie)).await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()[header::CONTENT_TYPE],
        "text/html; charset=utf-8"
    );
    assert_eq!(
        body_string(response).await,
        "<p>jdoe</p><input name=\"csrf_token\" value=\"ST-1\">"
    );
    assert_eq!(h.handler_calls(), 0);
}

#[tokio::test]
async fn test_home_page_serves_root() {
    let mut h = Harness::new();
    h.write_asset("app/index.html", b"<h1>{{app}}</h1>");
    let cookie = h.login("ST-1", "jdoe").await;

    let response = h.send(TestRequest::get("/app/").cookie(&cookie)).await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_string(response).await, "<h1>app</h1>");
}

#[tokio::test]
async fn test_binary_asset_is_served_raw() {
    let mut h = Harness::new();
    let png = [0x89, b'P', b'N', b'G', 0xff, 0x00];
    h.write_asset("html/logo.png", &png);
    let cookie = h.login("ST-1", "jdoe").await;

    let response = h.send(TestRequest::get("/app/logo.png").cookie(&cookie)).await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_TYPE], "image/png");
    assert_eq!(&body_bytes(response).await[..], &png[..]);
}

#[tokio::test]
async fn test_missing_static_file_is_404() {
    let mut h = Harness::new();
    let cookie = h.login("ST-1", "jdoe").await;

    let response = h.send(TestRequest::get("/app/missing.html").cookie(&cookie)).await;

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(h.handler_calls(), 0);
}

#[tokio::test]
async fn test_static_file_rejects_post() {
    let mut h = Harness::new();
    h.write_asset("html/page.html", b"hi");
    let cookie = h.login("ST-1", "jdoe").await;

    let response = h
        .send(
            TestRequest::post_form("/app/page.html", &format!("csrf_token={}", cookie))
                .cookie(&cookie),
        )
        .await;

    assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
}

#[tokio::test]
async fn test_path_outside_application_is_404() {
    let mut h = Harness::new();
    let cookie = h.login("ST-1", "jdoe").await;

    let response = h.send(TestRequest::get("/other/").cookie(&cookie)).await;

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(h.handler_calls(), 0);
}

#[tokio::test]
async fn test_handler_content_kinds() {
    let mut h = Harness::new();
    let cookie = h.login("ST-1", "jdoe").await;

    let json = h.send(TestRequest::get("/app/json").cookie(&cookie)).await;
    assert_eq!(json.headers()[header::CONTENT_TYPE], "application/json");
    assert_eq!(body_string(json).await, r#"{"user":"jdoe"}"#);

    let bytes = h.send(TestRequest::get("/app/bytes").cookie(&cookie)).await;
    assert_eq!(
        bytes.headers()[header::CONTENT_TYPE],
        "application/octet-stream"
    );
    assert_eq!(&body_bytes(bytes).await[..], &[0u8, 159, 146, 150][..]);

    let raw = h.send(TestRequest::get("/app/raw").cookie(&cookie)).await;
    assert_eq!(raw.status(), StatusCode::ACCEPTED);
    assert_eq!(body_string(raw).await, "written by handler");
}

#[tokio::test]
async fn test_handler_errors_map_to_responses() {
    let mut h = Harness::new();
    let cookie = h.login("ST-1", "jdoe").await;

    let typed = h.send(TestRequest::get("/app/teapot").cookie(&cookie)).await;
    assert_eq!(typed.status(), StatusCode::IM_A_TEAPOT);
    assert_eq!(body_string(typed).await, "Short and stout");

    let fault = h.send(TestRequest::get("/app/io").cookie(&cookie)).await;
    assert_eq!(fault.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body = body_string(fault).await;
    assert_eq!(body, "Internal Server Error");
    assert!(!body.contains("/var/db"));
}

#[tokio::test]
async fn test_handler_panic_is_contained() {
    let mut h = Harness::new();
    let cookie = h.login("ST-1", "jdoe").await;

    let response = h.send(TestRequest::get("/app/boom").cookie(&cookie)).await;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

    let next = h.send(TestRequest::get("/app/hello").cookie(&cookie)).await;
    assert_eq!(next.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_vanished_client_does_not_stop_dispatch() {
    let mut h = Harness::new();
    let cookie = h.login("ST-1", "jdoe").await;

    let (ctx, rx) = TestRequest::get("/app/hello").cookie(&cookie).into_context();
    drop(rx);
    h.dispatcher.dispatch(ctx).await;

    let next = h.send(TestRequest::get("/app/hello").cookie(&cookie)).await;
    assert_eq!(next.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_run_loop_serves_queue_until_shutdown() {
    let h = Harness::new();
    h.validator.accept("ST-1", "jdoe");
    let shutdown = Shutdown::new();
    let (tx, rx) = mpsc::channel(4);
    let task = tokio::spawn(h.dispatcher.run(rx, shutdown.clone()));

    let (ctx, reply) = TestRequest::get("/app/?ticket=ST-1").into_context();
    tx.send(ctx).await.unwrap();
    let response = reply.await.unwrap();
    assert_eq!(session_cookie(&response).as_deref(), Some("ST-1"));

    let (ctx, reply) = TestRequest::get("/app/hello").cookie("ST-1").into_context();
    tx.send(ctx).await.unwrap();
    assert_eq!(body_string(reply.await.unwrap()).await, "hello jdoe");

    shutdown.trigger();
    tokio::time::timeout(std::time::Duration::from_secs(5), task)
        .await
        .expect("dispatcher did not stop")
        .unwrap();
}
