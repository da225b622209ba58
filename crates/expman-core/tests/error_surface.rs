use expman_core::errors::{ErrorInfo, ExpError};

fn sample_info(code: &str, message: &str) -> ErrorInfo {
    ErrorInfo::new(code, message)
        .with_context("operation", "register")
        .with_context("path", "/tmp/exp_0001/id_card.json")
}

#[test]
fn not_found_surface() {
    let err = ExpError::NotFound(sample_info("record.missing", "id card not found"));
    assert_eq!(err.code(), "record.missing");
    assert!(err.info().context.contains_key("path"));
}

#[test]
fn invalid_configuration_surface() {
    let err = ExpError::InvalidConfiguration(
        sample_info("policy.id_mode", "unknown id_mode").with_hint("use hash"),
    );
    assert_eq!(err.info().hint.as_deref(), Some("use hash"));
}

#[test]
fn display_names_path_and_operation() {
    let err = ExpError::Conflict(sample_info("naming.exists", "directory exists"));
    let text = err.to_string();
    assert!(text.starts_with("conflict: directory exists (code: naming.exists)"));
    assert!(text.contains("operation=register"));
    assert!(text.contains("path=/tmp/exp_0001/id_card.json"));
}

#[test]
fn error_serializes_with_family_tag() {
    let err = ExpError::Io(ErrorInfo::new("record.write", "disk full"));
    let json = serde_json::to_value(&err).expect("serialize");
    assert_eq!(json["family"], "Io");
    assert_eq!(json["detail"]["code"], "record.write");
    let back: ExpError = serde_json::from_value(json).expect("deserialize");
    assert_eq!(back, err);
}
