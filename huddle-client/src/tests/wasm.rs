//! Smoke tests that run under the wasm test runner; everything
//! browser-free so they pass in Node as well.

use crate::audio::{chain_params, SuppressionMode};
use crate::peer::TieBreaker;
use huddle_types::{MediaPurpose, SignalEnvelope, SignalKind};
use wasm_bindgen_test::wasm_bindgen_test;

#[wasm_bindgen_test]
fn envelopes_round_trip_on_wasm() {
    let envelope = SignalEnvelope {
        kind: SignalKind::Offer,
        from: "a1".to_string(),
        to: "b2".to_string(),
        purpose: MediaPurpose::Voice,
        payload: serde_json::json!({"sdp": "v=0"}),
    };
    let text = serde_json::to_string(&envelope).unwrap();
    assert_eq!(envelope, serde_json::from_str(&text).unwrap());
}

#[wasm_bindgen_test]
fn tie_break_agrees_on_both_sides() {
    let rule = TieBreaker::identity_order();
    assert!(rule.is_offerer("a1", "b2") != rule.is_offerer("b2", "a1"));
}

#[wasm_bindgen_test]
fn both_suppression_modes_have_parameters() {
    for mode in [SuppressionMode::Standard, SuppressionMode::Aggressive] {
        assert!(chain_params(mode).highpass_hz > 0.0);
    }
}
