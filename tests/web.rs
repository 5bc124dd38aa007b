#![cfg(target_arch = "wasm32")]

use rhizo_layout_wasm::RhizoWasm;
use rhizo_layout_wasm::render::RenderBatch;
use rhizo_layout_wasm::state::{Facet, VisualizationState};
use serde::Serialize;
use serde_json::{Value, json};
use std::collections::BTreeMap;
use wasm_bindgen::JsValue;
use wasm_bindgen_test::wasm_bindgen_test;

fn js(value: &Value) -> JsValue {
    value
        .serialize(&serde_wasm_bindgen::Serializer::json_compatible())
        .unwrap()
}

fn loaded() -> RhizoWasm {
    let mut rhizo = RhizoWasm::new(JsValue::UNDEFINED, false).unwrap();
    let meta = json!({
        "size": {"label": "Size", "kind": {"type": "number"}},
        "parent": {"label": "Parent", "kind": {"type": "string"}, "isParent": true}
    });
    let models = json!([
        {"id": "a", "size": 5},
        {"id": "b", "size": 5, "parent": "a"},
        {"id": "c", "size": 7, "parent": "a"}
    ]);
    let restored = rhizo
        .load_project(
            "viz".into(),
            400.0,
            300.0,
            js(&meta),
            js(&models),
            js_sys::Object::new().into(),
            JsValue::UNDEFINED,
        )
        .unwrap();
    assert!(!restored);
    rhizo
}

fn state(rhizo: &RhizoWasm) -> VisualizationState {
    serde_wasm_bindgen::from_value(rhizo.state().unwrap()).unwrap()
}

#[wasm_bindgen_test]
fn test_layout_records_state() {
    let mut rhizo = loaded();
    let batch = rhizo.layout("viz", js(&json!({"engine": "tree"}))).unwrap();
    let batch: RenderBatch = serde_wasm_bindgen::from_value(batch).unwrap();
    assert_eq!(batch.commands.len(), 3);
    assert!(!batch.artifacts.is_empty());

    let state = state(&rhizo);
    let layout = state.facet_state("viz", &Facet::Layout).unwrap();
    assert_eq!(layout["engine"], "tree");
    assert_eq!(rhizo.current_engine("viz").unwrap().as_deref(), Some("tree"));
}

#[wasm_bindgen_test]
fn test_unknown_engine_is_an_error() {
    let mut rhizo = loaded();
    assert!(rhizo.layout("viz", js(&json!({"engine": "radial"}))).is_err());
    assert!(state(&rhizo).uuids.is_empty());
}

#[wasm_bindgen_test]
fn test_filter_and_focus() {
    let mut rhizo = loaded();
    rhizo.layout("viz", JsValue::UNDEFINED).unwrap();

    rhizo.filter("viz", "size", JsValue::from_f64(5.0)).unwrap();
    let state = state(&rhizo);
    assert_eq!(
        state
            .facet_state("viz", &Facet::Filter("size".into()))
            .and_then(Value::as_f64),
        Some(5.0)
    );

    rhizo.focus("viz", vec!["b".into()]).unwrap();
    let state = self::state(&rhizo);
    assert_eq!(
        state.facet_state("viz", &Facet::SelectionFilter),
        Some(&json!(["a", "c"]))
    );

    rhizo.reset_focus("viz").unwrap();
    assert_eq!(self::state(&rhizo).facet_state("viz", &Facet::SelectionFilter), None);
}

#[wasm_bindgen_test]
fn test_extend_selection_follows_tree() {
    let mut rhizo = loaded();
    rhizo.layout("viz", js(&json!({"engine": "tree"}))).unwrap();
    let mut ids = rhizo.extend_selection("viz", "a").unwrap();
    ids.sort();
    assert_eq!(ids, vec!["a", "b", "c"]);
}

#[wasm_bindgen_test]
fn test_pop_state_without_history_is_noop() {
    let mut rhizo = loaded();
    let batches = rhizo.pop_state(JsValue::NULL).unwrap();
    let batches: BTreeMap<String, RenderBatch> = serde_wasm_bindgen::from_value(batches).unwrap();
    assert!(batches.is_empty());
}

#[wasm_bindgen_test]
fn test_unknown_project() {
    let mut rhizo = loaded();
    assert!(rhizo.layout("other", JsValue::UNDEFINED).is_err());
}

#[wasm_bindgen_test]
fn test_repeated_focus_records_once() {
    let mut rhizo = loaded();
    rhizo.layout("viz", JsValue::UNDEFINED).unwrap();

    rhizo.focus("viz", vec!["a".into(), "b".into(), "c".into()]).unwrap();
    assert_eq!(state(&rhizo).facet_state("viz", &Facet::SelectionFilter), None);

    rhizo.focus("viz", vec!["b".into()]).unwrap();
    let recorded = state(&rhizo).delta.unwrap();
    assert_eq!(recorded.facet, Facet::SelectionFilter);

    rhizo.focus("viz", vec!["b".into()]).unwrap();
    assert_eq!(state(&rhizo).delta.unwrap().ts, recorded.ts);
}
