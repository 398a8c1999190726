//! Property tests for token resolution and fingerprinting.

use api_workbench::executor::fingerprint;
use api_workbench::variables::TemplateResolver;
use api_workbench::HttpMethod;
use proptest::prelude::*;
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashMap};

fn resolver() -> TemplateResolver {
    TemplateResolver::from_variables(HashMap::from([
        ("baseUrl".to_string(), "https://x.test".to_string()),
        ("userId".to_string(), "42".to_string()),
    ]))
}

proptest! {
    #[test]
    fn text_without_tokens_is_unchanged(text in "[^{}]*") {
        prop_assert_eq!(resolver().resolve(&text), text);
    }

    #[test]
    fn present_names_resolve_and_absent_names_stay(name in "[a-z][a-zA-Z0-9_]{0,12}") {
        let template = format!("{{{{userId}}}}/{{{{{}}}}}", name);
        let resolved = resolver().resolve(&template);

        if name == "userId" {
            prop_assert_eq!(resolved, "42/42");
        } else {
            prop_assert_eq!(resolved, format!("42/{{{{{}}}}}", name));
        }
    }

    #[test]
    fn fingerprint_ignores_key_order(
        entries in proptest::collection::btree_map("[a-z]{1,6}", "[a-z0-9]{0,6}", 1..8)
    ) {
        let forward: Map<String, Value> = entries
            .iter()
            .map(|(k, v)| (k.clone(), Value::String(v.clone())))
            .collect();
        let reversed: Map<String, Value> = entries
            .iter()
            .rev()
            .map(|(k, v)| (k.clone(), Value::String(v.clone())))
            .collect();
        let params = BTreeMap::new();

        prop_assert_eq!(
            fingerprint(HttpMethod::POST, "https://x.test", &params, &Value::Object(forward)),
            fingerprint(HttpMethod::POST, "https://x.test", &params, &Value::Object(reversed))
        );
    }

    #[test]
    fn fingerprint_depends_on_url(a in "[a-z]{1,8}", b in "[a-z]{1,8}") {
        prop_assume!(a != b);
        let params = BTreeMap::new();
        prop_assert_ne!(
            fingerprint(HttpMethod::GET, &format!("https://x.test/{}", a), &params, &Value::Null),
            fingerprint(HttpMethod::GET, &format!("https://x.test/{}", b), &params, &Value::Null)
        );
    }
}

#[test]
fn fingerprint_depends_on_method_and_values() {
    let params = BTreeMap::from([("page".to_string(), "1".to_string())]);
    let body = serde_json::json!({"a": 1});

    let post = fingerprint(HttpMethod::POST, "https://x.test", &params, &body);
    let put = fingerprint(HttpMethod::PUT, "https://x.test", &params, &body);
    let other_body = fingerprint(
        HttpMethod::POST,
        "https://x.test",
        &params,
        &serde_json::json!({"a": 2}),
    );

    assert!(post.starts_with("req_"));
    assert_ne!(post, put);
    assert_ne!(post, other_body);
}
