//! Dispatcher behavior over a counting transport.
//!
//! These tests drive complete requests through resolution, de-duplication,
//! caching and retry without touching the network.

use super::{dispatcher, dispatcher_with, init_test_env, CountingTransport};
use api_workbench::cache::CacheStrategy;
use api_workbench::executor::{TransportError, TransportResponse};
use api_workbench::retry::{NetworkMonitor, RetryConfig, RetryPolicy};
use api_workbench::{
    AuthSpec, DispatchError, DispatchEvent, Dispatcher, ErrorKind, ExecuteOptions, HttpMethod,
    KeyValueStorage, MemoryStorage, RequestSpec, SharedStorage,
};
use std::sync::Arc;
use std::time::Duration;

#[tokio::test]
async fn test_execution_and_display_urls() {
    init_test_env();
    let transport = CountingTransport::new(vec![]);
    let dispatcher = dispatcher(transport.clone());
    dispatcher
        .variable_store()
        .set("baseUrl", "https://x.test")
        .unwrap();
    dispatcher.variable_store().set("userId", "42").unwrap();
    let mut events = dispatcher.subscribe();

    let spec = RequestSpec::get("{{baseUrl}}/u/{{userId}}");
    dispatcher
        .execute(&spec, ExecuteOptions::default())
        .await
        .unwrap();

    assert_eq!(transport.last_request().unwrap().url, "https://x.test/u/42");
    assert_eq!(
        dispatcher.display_request(&spec).url,
        "{{baseUrl}}/u/{{userId}}"
    );

    match events.recv().await.unwrap() {
        DispatchEvent::RequestStarted { url, .. } => {
            assert_eq!(url, "{{baseUrl}}/u/{{userId}}")
        }
        other => panic!("unexpected event {:?}", other),
    }
}

#[tokio::test]
async fn test_query_params_are_encoded() {
    let transport = CountingTransport::new(vec![]);
    let dispatcher = dispatcher(transport.clone());
    dispatcher.variable_store().set("term", "a&b").unwrap();

    let spec = RequestSpec::get("https://x.test/search")
        .with_param("q", "{{term}}")
        .with_param("lang", "en us");
    dispatcher
        .execute(&spec, ExecuteOptions::default())
        .await
        .unwrap();

    assert_eq!(
        transport.last_request().unwrap().url,
        "https://x.test/search?q=a%26b&lang=en%20us"
    );
}

#[tokio::test]
async fn test_basic_auth_header() {
    let transport = CountingTransport::new(vec![]);
    let dispatcher = dispatcher(transport.clone());

    let spec = RequestSpec::get("https://x.test/me").with_auth(AuthSpec::Basic {
        username: "a".to_string(),
        password: "b".to_string(),
    });
    dispatcher
        .execute(&spec, ExecuteOptions::default())
        .await
        .unwrap();

    let request = transport.last_request().unwrap();
    assert_eq!(
        request.headers.get("Authorization"),
        Some(&"Basic YTpi".to_string())
    );
    assert!(!dispatcher
        .display_request(&spec)
        .headers
        .contains_key("Authorization"));
}

#[tokio::test]
async fn test_concurrent_duplicates_send_once() {
    let transport = CountingTransport::with_delay(vec![], Duration::from_millis(50));
    let dispatcher = dispatcher(transport.clone());
    let mut events = dispatcher.subscribe();
    let spec = RequestSpec::get("https://x.test/slow");
    let options = ExecuteOptions::default().with_cache_strategy(CacheStrategy::NoCache);

    let (first, second) = tokio::join!(
        dispatcher.execute(&spec, options.clone()),
        dispatcher.execute(&spec, options.clone())
    );

    assert_eq!(transport.calls(), 1);
    let outcomes = [first, second];
    assert_eq!(outcomes.iter().filter(|outcome| outcome.is_ok()).count(), 1);
    assert!(outcomes
        .iter()
        .any(|outcome| matches!(outcome, Err(err) if err.is_duplicate())));

    let mut saw_duplicate = false;
    while let Ok(event) = events.try_recv() {
        if let DispatchEvent::DuplicateCancelled { url, .. } = event {
            assert_eq!(url, "https://x.test/slow");
            saw_duplicate = true;
        }
    }
    assert!(saw_duplicate);

    // The slot is released once the first request settles.
    dispatcher.execute(&spec, options).await.unwrap();
    assert_eq!(transport.calls(), 2);
}

#[tokio::test]
async fn test_cache_first_hits_cache() {
    let transport = CountingTransport::new(vec![Ok(TransportResponse::new(200, r#"{"n":1}"#))]);
    let dispatcher = dispatcher(transport.clone());
    let spec = RequestSpec::get("https://x.test/list");

    let first = dispatcher
        .execute(&spec, ExecuteOptions::default())
        .await
        .unwrap();
    let second = dispatcher
        .execute(&spec, ExecuteOptions::default())
        .await
        .unwrap();

    assert_eq!(transport.calls(), 1);
    assert!(!first.cached);
    assert!(second.cached);
    assert_eq!(second.data, first.data);
    assert_ne!(second.request_id, first.request_id);

    let stats = dispatcher.cache_stats();
    assert_eq!(stats.total_items, 1);
    assert_eq!(stats.hits, 1);
}

#[tokio::test(start_paused = true)]
async fn test_cache_entry_expires() {
    let transport = CountingTransport::new(vec![]);
    let dispatcher = dispatcher(transport.clone());
    let spec = RequestSpec::get("https://x.test/short");
    let options = ExecuteOptions {
        cache_ttl: Some(Duration::from_millis(100)),
        ..ExecuteOptions::default()
    };

    dispatcher.execute(&spec, options.clone()).await.unwrap();
    assert!(dispatcher.execute(&spec, options.clone()).await.unwrap().cached);
    assert_eq!(transport.calls(), 1);

    tokio::time::advance(Duration::from_millis(150)).await;
    assert!(!dispatcher.execute(&spec, options).await.unwrap().cached);
    assert_eq!(transport.calls(), 2);
}

#[tokio::test]
async fn test_retry_until_success() {
    let transport = CountingTransport::new(vec![
        Ok(TransportResponse::new(500, "")),
        Ok(TransportResponse::new(500, "")),
        Ok(TransportResponse::new(200, r#"{"ok":true}"#)),
    ]);
    let dispatcher = dispatcher(transport.clone());

    let response = dispatcher
        .execute(
            &RequestSpec::get("https://x.test/flaky"),
            ExecuteOptions::default().with_max_retries(3),
        )
        .await
        .unwrap();

    assert_eq!(response.status, 200);
    assert_eq!(transport.calls(), 3);

    let stats = dispatcher.error_stats();
    assert_eq!(stats.errors[&ErrorKind::Server].count, 2);
    assert_eq!(stats.retry_successes.count, 1);
    assert_eq!(stats.retry_successes.total_retries, 2);
}

#[tokio::test]
async fn test_client_error_is_not_retried() {
    let transport = CountingTransport::new(vec![Ok(TransportResponse::new(
        404,
        r#"{"message":"no such user"}"#,
    ))]);
    let dispatcher = dispatcher(transport.clone());

    let err = dispatcher
        .execute(
            &RequestSpec::get("https://x.test/users/9"),
            ExecuteOptions::default().with_max_retries(3),
        )
        .await
        .unwrap_err();

    assert_eq!(transport.calls(), 1);
    let failure = err.failure().unwrap();
    assert_eq!(failure.kind, ErrorKind::Client);
    assert_eq!(failure.status(), Some(404));
    assert_eq!(failure.user_message, "no such user");
    assert_eq!(failure.attempts, 1);
}

#[tokio::test]
async fn test_retries_are_exhausted() {
    let transport = CountingTransport::new(vec![
        Err(TransportError::network("connection reset")),
        Err(TransportError::network("connection reset")),
        Err(TransportError::network("connection reset")),
    ]);
    let dispatcher = dispatcher(transport.clone());

    let err = dispatcher
        .execute(
            &RequestSpec::get("https://x.test/down"),
            ExecuteOptions::default().with_max_retries(2),
        )
        .await
        .unwrap_err();

    assert_eq!(transport.calls(), 3);
    assert_eq!(err.kind(), Some(ErrorKind::Network));
    assert_eq!(err.failure().unwrap().attempts, 3);
    assert_eq!(dispatcher.error_stats().retry_failures.count, 1);
}

#[tokio::test]
async fn test_rate_limit_event_carries_retry_after() {
    let transport = CountingTransport::new(vec![Ok(
        TransportResponse::new(429, "").with_header("Retry-After", "30")
    )]);
    let dispatcher = dispatcher(transport.clone());
    let mut events = dispatcher.subscribe();

    let err = dispatcher
        .execute(
            &RequestSpec::get("https://x.test/busy"),
            ExecuteOptions::default().with_max_retries(0),
        )
        .await
        .unwrap_err();

    assert_eq!(err.kind(), Some(ErrorKind::RateLimit));
    let mut retry_after = None;
    while let Ok(event) = events.try_recv() {
        if let DispatchEvent::RateLimited { retry_after: value, .. } = event {
            retry_after = value;
        }
    }
    assert_eq!(retry_after, Some("30".to_string()));
}

#[tokio::test]
async fn test_unauthorized_clears_configured_credentials() {
    let transport = CountingTransport::new(vec![Ok(TransportResponse::new(401, ""))]);
    let storage: SharedStorage = Arc::new(MemoryStorage::with_items([
        ("auth_token", "t1"),
        ("refresh_token", "t2"),
    ]));
    let dispatcher = dispatcher_with(transport, storage.clone());

    let err = dispatcher
        .execute(
            &RequestSpec::new(HttpMethod::POST, "https://x.test/orders"),
            ExecuteOptions::default(),
        )
        .await
        .unwrap_err();

    assert_eq!(err.kind(), Some(ErrorKind::Authentication));
    assert!(storage.keys().unwrap().is_empty());
}

#[tokio::test]
async fn test_cancel_in_flight_request() {
    let transport = CountingTransport::with_delay(vec![], Duration::from_secs(10));
    let dispatcher = dispatcher(transport.clone());
    let spec = RequestSpec::get("https://x.test/forever");

    let handle = {
        let dispatcher = dispatcher.clone();
        let spec = spec.clone();
        tokio::spawn(async move {
            dispatcher
                .execute(&spec, ExecuteOptions::default().with_request_id("long"))
                .await
        })
    };

    while dispatcher.active_request_ids().is_empty() {
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert_eq!(dispatcher.active_request_ids(), vec!["long".to_string()]);
    dispatcher.cancel_request("long").unwrap();

    let err = tokio::time::timeout(Duration::from_secs(2), handle)
        .await
        .expect("cancelled request should settle promptly")
        .unwrap()
        .unwrap_err();

    assert_eq!(err.kind(), Some(ErrorKind::Cancelled));
    assert_eq!(transport.calls(), 1);
    assert!(dispatcher.active_request_ids().is_empty());
}

#[tokio::test]
async fn test_cache_only_without_entry() {
    let transport = CountingTransport::new(vec![]);
    let dispatcher = dispatcher(transport.clone());

    let err = dispatcher
        .execute(
            &RequestSpec::get("https://x.test/offline-data"),
            ExecuteOptions::default().with_cache_strategy(CacheStrategy::CacheOnly),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, DispatchError::CacheMiss { .. }));
    assert_eq!(transport.calls(), 0);
}

#[tokio::test]
async fn test_network_only_bypasses_cache() {
    let transport = CountingTransport::new(vec![]);
    let dispatcher = dispatcher(transport.clone());
    let spec = RequestSpec::get("https://x.test/live");
    let options = ExecuteOptions::default().with_cache_strategy(CacheStrategy::NetworkOnly);

    dispatcher.execute(&spec, options.clone()).await.unwrap();
    dispatcher.execute(&spec, options).await.unwrap();

    assert_eq!(transport.calls(), 2);
    assert_eq!(dispatcher.cache_stats().total_items, 0);
}

#[tokio::test]
async fn test_cancel_during_backoff_settles_promptly() {
    let transport = CountingTransport::new(vec![
        Ok(TransportResponse::new(500, "")),
        Ok(TransportResponse::new(500, "")),
    ]);
    let dispatcher = Dispatcher::builder()
        .transport(transport.clone())
        .retry_policy(RetryPolicy::new(
            RetryConfig {
                base_delay: Duration::from_secs(3),
                max_delay: Duration::from_secs(3),
                ..RetryConfig::default()
            },
            NetworkMonitor::default(),
        ))
        .build()
        .unwrap();
    let spec = RequestSpec::get("https://x.test/always-failing");

    let handle = {
        let dispatcher = dispatcher.clone();
        tokio::spawn(async move {
            dispatcher
                .execute(&spec, ExecuteOptions::default().with_request_id("backoff"))
                .await
        })
    };

    while transport.calls() == 0 {
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    tokio::time::sleep(Duration::from_millis(50)).await;
    let cancelled_at = std::time::Instant::now();
    dispatcher.cancel_request("backoff").unwrap();

    let err = handle.await.unwrap().unwrap_err();
    assert!(cancelled_at.elapsed() < Duration::from_millis(500));
    assert_eq!(err.kind(), Some(ErrorKind::Cancelled));
    assert_eq!(transport.calls(), 1);
    assert!(dispatcher.active_request_ids().is_empty());
}

#[tokio::test]
async fn test_invalid_request_fails_once_without_network_event() {
    let transport = CountingTransport::new(vec![Err(TransportError::invalid(
        "builder error: relative URL without a base",
    ))]);
    let dispatcher = dispatcher(transport.clone());
    let mut events = dispatcher.subscribe();

    let err = dispatcher
        .execute(
            &RequestSpec::get("{{host}}/users"),
            ExecuteOptions::default().with_max_retries(3),
        )
        .await
        .unwrap_err();

    assert_eq!(transport.calls(), 1);
    let failure = err.failure().unwrap();
    assert_eq!(failure.kind, ErrorKind::Unknown);
    assert_eq!(failure.attempts, 1);
    assert_ne!(failure.user_message, ErrorKind::Network.user_message());
    while let Ok(event) = events.try_recv() {
        assert!(!matches!(event, DispatchEvent::NetworkError { .. }));
    }
}

#[tokio::test]
async fn test_unbounded_cache_ttl_is_accepted() {
    let transport = CountingTransport::new(vec![]);
    let dispatcher = dispatcher(transport.clone());
    let spec = RequestSpec::get("https://x.test/forever-cached");
    let options = ExecuteOptions {
        cache_ttl: Some(Duration::MAX),
        ..ExecuteOptions::default()
    };

    dispatcher.execute(&spec, options.clone()).await.unwrap();
    assert!(dispatcher.execute(&spec, options).await.unwrap().cached);
    assert_eq!(transport.calls(), 1);
}

#[tokio::test]
async fn test_stored_token_is_attached_without_authorization() {
    let transport = CountingTransport::new(vec![]);
    let storage: SharedStorage = Arc::new(MemoryStorage::with_items([("access_token", "tok-1")]));
    let dispatcher = dispatcher_with(transport.clone(), storage);
    let options = ExecuteOptions::default().with_cache_strategy(CacheStrategy::NoCache);

    let spec = RequestSpec::get("https://x.test/profile");
    dispatcher.execute(&spec, options.clone()).await.unwrap();
    let request = transport.last_request().unwrap();
    assert_eq!(request.headers.get("zy_token"), Some(&"tok-1".to_string()));
    assert_eq!(request.headers.get("access-token"), Some(&"tok-1".to_string()));
    assert!(!dispatcher
        .display_request(&spec)
        .headers
        .contains_key("access-token"));

    let with_auth = RequestSpec::get("https://x.test/profile").with_auth(AuthSpec::Bearer {
        token: "explicit".to_string(),
    });
    dispatcher.execute(&with_auth, options).await.unwrap();
    let request = transport.last_request().unwrap();
    assert!(!request.headers.contains_key("zy_token"));
    assert!(!request.headers.contains_key("access-token"));
}

#[tokio::test]
async fn test_batch_respects_concurrency_and_order() {
    let transport = CountingTransport::with_delay(vec![], Duration::from_millis(20));
    let dispatcher = dispatcher(transport.clone());
    let specs: Vec<RequestSpec> = (0..6)
        .map(|n| RequestSpec::get(format!("https://x.test/items/{}", n)))
        .collect();
    let options = ExecuteOptions::default().with_request_id("ignored-for-batches");

    let responses = dispatcher.execute_all(&specs, options, 2).await.unwrap();

    assert_eq!(responses.len(), 6);
    assert_eq!(transport.calls(), 6);
    assert!(transport.max_in_flight() <= 2);
    let ids: std::collections::HashSet<_> =
        responses.iter().map(|response| response.request_id.clone()).collect();
    assert_eq!(ids.len(), 6);
}

#[tokio::test]
async fn test_batch_settled_keeps_every_outcome() {
    let transport = CountingTransport::new(vec![
        Ok(TransportResponse::new(200, "{}")),
        Ok(TransportResponse::new(404, "")),
        Ok(TransportResponse::new(200, "{}")),
    ]);
    let dispatcher = dispatcher(transport.clone());
    let specs = vec![
        RequestSpec::get("https://x.test/a"),
        RequestSpec::get("https://x.test/b"),
        RequestSpec::get("https://x.test/c"),
    ];

    let outcomes = dispatcher
        .execute_settled(&specs, ExecuteOptions::default(), 1)
        .await;

    assert_eq!(outcomes.len(), 3);
    assert!(outcomes[0].is_ok());
    assert_eq!(outcomes[1].as_ref().unwrap_err().kind(), Some(ErrorKind::Client));
    assert!(outcomes[2].is_ok());

    let transport = CountingTransport::new(vec![Ok(TransportResponse::new(404, ""))]);
    let dispatcher = super::dispatcher(transport);
    let err = dispatcher
        .execute_all(&specs, ExecuteOptions::default(), 1)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), Some(ErrorKind::Client));
}

#[tokio::test]
async fn test_environment_changes_reach_dispatcher_subscribers() {
    let dispatcher = dispatcher(CountingTransport::new(vec![]));
    let mut events = dispatcher.subscribe();

    dispatcher.variable_store().set("region", "eu").unwrap();

    match events.recv().await.unwrap() {
        DispatchEvent::EnvironmentChanged {
            environment,
            variables,
        } => {
            assert_eq!(environment, "default");
            assert!(variables.contains(&"region".to_string()));
        }
        other => panic!("unexpected event {:?}", other),
    }
}
