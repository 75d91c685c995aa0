use fetch_shield_core::*;
use pretty_assertions::{assert_eq, assert_ne};
use rstest::rstest;
use serde_json::json;

// ===== Equivalent requests =====

#[rstest]
#[case("/messages?x=1&y=2", "/messages?y=2&x=1")]
#[case("http://127.0.0.1:3068/messages", "HTTP://127.0.0.1:3068/messages")]
#[case("https://api.example.com:443/items", "https://API.example.com/items")]
#[case("https://api.example.com/items#section", "https://api.example.com/items")]
#[case("  /messages ", "/messages")]
#[case("/messages?a=1&a=2", "/messages?a=2&a=1")]
fn test_equivalent_urls_share_signature(#[case] left: &str, #[case] right: &str) {
    let left = Request::get(left).build();
    let right = Request::get(right).build();
    assert_eq!(signature(&left), signature(&right));
}

#[test]
fn test_query_from_builder_merges_with_url_query() {
    let inline = Request::get("/messages?x=1&y=2").build();
    let split = Request::get("/messages?y=2").query("x", "1").build();
    assert_eq!(signature(&inline), signature(&split));
}

#[test]
fn test_body_key_order_is_irrelevant() {
    let a = Request::post("/items")
        .json(json!({"name": "demo", "tags": ["a", "b"], "meta": {"x": 1, "y": 2}}))
        .build();
    let b = Request::post("/items")
        .json(json!({"meta": {"y": 2, "x": 1}, "tags": ["a", "b"], "name": "demo"}))
        .build();
    assert_eq!(signature(&a), signature(&b));
}

#[test]
fn test_options_do_not_affect_signature() {
    let plain = Request::get("/messages").build();
    let tuned = Request::get("/messages")
        .max_attempts(9)
        .dedupe(false)
        .cache(false)
        .option("label", json!("x"))
        .build();
    assert_eq!(signature(&plain), signature(&tuned));
}

// ===== Distinct requests =====

#[rstest]
#[case(Request::get("/messages").build(), Request::post("/messages").build())]
#[case(Request::get("/messages").build(), Request::get("/message").build())]
#[case(Request::get("/messages?x=1").build(), Request::get("/messages?x=2").build())]
#[case(Request::get("/messages?x=1").build(), Request::get("/messages").build())]
#[case(
    Request::get("/messages").build(),
    Request::get("http://127.0.0.1:3068/messages").build()
)]
#[case(
    Request::post("/items").json(json!({"a": 1})).build(),
    Request::post("/items").json(json!({"a": "1"})).build()
)]
#[case(
    Request::post("/items").json(json!([1, 2])).build(),
    Request::post("/items").json(json!([2, 1])).build()
)]
fn test_distinct_requests_have_distinct_signatures(#[case] left: Request, #[case] right: Request) {
    assert_ne!(signature(&left), signature(&right));
}

#[test]
fn test_field_boundaries_do_not_collide() {
    let a = Request::get("/a").query("bc", "").build();
    let b = Request::get("/a").query("b", "c").build();
    assert_ne!(signature(&a), signature(&b));
}

// ===== Determinism =====

#[test]
fn test_signature_is_deterministic() {
    let request = Request::get("https://api.example.com/messages")
        .query("page", "1")
        .build();
    let first = RequestSignature::compute(&request);
    for _ in 0..10 {
        assert_eq!(RequestSignature::compute(&request.clone()), first);
    }
}

#[test]
fn test_canonical_form_of_bare_path() {
    let request = Request::get("/messages").build();
    let canonical = CanonicalRequest::from_request(&request);
    assert_eq!(canonical.method, "GET");
    assert_eq!(canonical.url, "/messages");
    assert!(canonical.query.is_empty());
    assert_eq!(canonical.body, None);
    assert_eq!(signature(&request).to_hex().len(), 64);
    assert_eq!(signature(&request), canonical.digest());
}
