#![no_main]

use gatepost_authz::{decode_unverified, KeySet, MethodArn};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(s) = std::str::from_utf8(data) {
        if let Ok(token) = decode_unverified(s) {
            let _ = token.issuer().map(|issuer| issuer.jwks_url());
            let _ = token.kid();
        }
        let _ = MethodArn::parse(s);
        let _ = KeySet::from_json(s);
    }
});
