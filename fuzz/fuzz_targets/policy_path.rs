#![no_main]

use gatepost_authz::{ApiScope, AuthzError, HttpVerb, PolicyBuilder};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(s) = std::str::from_utf8(data) else {
        return;
    };
    let (verb, path) = s.split_once(' ').unwrap_or(("GET", s));
    let Ok(verb) = verb.parse::<HttpVerb>() else {
        return;
    };

    let mut builder = PolicyBuilder::new("fuzz", ApiScope::default());
    match builder.allow(verb, path) {
        Ok(_) => {
            let policy = builder.build().expect("one entry builds");
            let resource = &policy.policy_document.statement[0].resource[0];
            assert!(!resource.contains(char::is_whitespace));
            let _ = serde_json::to_string(&policy);
        }
        Err(AuthzError::InvalidResourcePath { .. }) => {
            assert!(matches!(builder.build(), Err(AuthzError::EmptyPolicy)));
        }
        Err(e) => panic!("unexpected error: {e}"),
    }
});
