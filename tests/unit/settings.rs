use super::*;

#[test]
fn empty_object_gives_defaults() {
    let s = DisplaySettings::from_json_str("{}").unwrap();
    assert_eq!(s, DisplaySettings::default());
    assert_eq!(s.node_context.vertex_cache_bytes, 262_144);
    assert_eq!(s.effect_backend, EffectBackendKind::Modern);
}

#[test]
fn partial_sections_keep_other_defaults() {
    let s = DisplaySettings::from_json_str(
        r#"{
            "node_context": { "prefer_linear": true },
            "bloom_v2": { "limit_x": 3.0 },
            "custom_effect": "crt/effect.cgp",
            "effect_backend": "legacy"
        }"#,
    )
    .unwrap();
    assert!(s.node_context.prefer_linear);
    assert_eq!(s.node_context.index_cache_indices, 16_384);
    assert_eq!(s.bloom_v2.limit_x, 3.0);
    assert_eq!(s.bloom_v2.shoulder_x, BloomV2Settings::default().shoulder_x);
    assert_eq!(s.custom_effect.as_deref(), Some(Path::new("crt/effect.cgp")));
    assert_eq!(s.effect_backend, EffectBackendKind::Legacy);
}

#[test]
fn malformed_json_is_a_validation_error() {
    let err = DisplaySettings::from_json_str("{ \"bloom_v2\": 4 }").unwrap_err();
    assert!(matches!(err, ScanoutError::Validation(_)));
}

#[test]
fn missing_file_is_reported() {
    let path = std::env::temp_dir().join("scanout-settings-does-not-exist.json");
    let err = DisplaySettings::from_path(&path).unwrap_err();
    assert!(err.to_string().contains("open display settings"));
}
