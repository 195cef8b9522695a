use super::*;

#[test]
fn display_prefixes_are_stable() {
    assert!(
        ScanoutError::device("x")
            .to_string()
            .contains("device error:")
    );
    assert!(ScanoutError::asset("x").to_string().contains("asset error:"));
    assert!(
        ScanoutError::validation("x")
            .to_string()
            .contains("validation error:")
    );
    assert_eq!(
        ScanoutError::parse(7, "unterminated quote").to_string(),
        "parse error (line 7): unterminated quote"
    );
    assert_eq!(ScanoutError::DeviceLost.to_string(), "device lost");
}

#[test]
fn other_preserves_source() {
    let base = std::io::Error::other("boom");
    let err = ScanoutError::Other(anyhow::Error::new(base));
    assert!(err.to_string().contains("boom"));
}

#[test]
fn device_failures_are_classified() {
    assert!(ScanoutError::device("oom").is_device_failure());
    assert!(ScanoutError::DeviceLost.is_device_failure());
    assert!(!ScanoutError::asset("missing.png").is_device_failure());
}
