//! Check the token parser and URL builder against JSON vectors in
//! `test-vectors/`.
//!
//! Expected values are compared as parsed JSON so key order in the files
//! does not matter. Only the fields listed in each case are checked.

use serde_json::Value;
use wasteplus_core::request::get_url;
use wasteplus_core::{parse_token, ApiConfig, ApiRequestOptions, HttpMethod, Jwt};

fn cases(raw: &str) -> Vec<Value> {
    let vectors: Value = serde_json::from_str(raw).unwrap();
    vectors["cases"].as_array().unwrap().clone()
}

#[test]
fn token_vectors() {
    for case in cases(include_str!("../../test-vectors/tokens.json")) {
        let name = case["name"].as_str().unwrap();
        let jwt = Jwt::from_claims(case["claims"].as_object().unwrap().clone());

        let user = parse_token(Some(&jwt)).unwrap();
        let actual = serde_json::to_value(&user).unwrap();

        for (field, expected) in case["expected"].as_object().unwrap() {
            assert_eq!(&actual[field], expected, "{name}: {field}");
        }
    }
}

#[test]
fn url_vectors() {
    for case in cases(include_str!("../../test-vectors/urls.json")) {
        let name = case["name"].as_str().unwrap();
        let config = ApiConfig::new(case["base"].as_str().unwrap())
            .with_version(case["version"].as_str().unwrap());

        let mut options = ApiRequestOptions::new(HttpMethod::Get, case["url"].as_str().unwrap());
        options.path = case["path"].as_object().unwrap().clone();
        options.query = case["query"].as_object().unwrap().clone();

        assert_eq!(get_url(&config, &options), case["expected"].as_str().unwrap(), "{name}");
    }
}
