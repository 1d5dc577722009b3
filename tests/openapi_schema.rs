use serde_json::Value;

fn document() -> anyhow::Result<Value> {
    let doc = transparency_portal::docs::build_openapi(8000)?;
    Ok(serde_json::to_value(&doc)?)
}

#[test]
fn openapi_documents_public_and_admin_paths() -> anyhow::Result<()> {
    let v = document()?;
    let paths = v
        .get("paths")
        .and_then(Value::as_object)
        .expect("paths must exist");

    for path in [
        "/api/auth/login",
        "/api/complaints",
        "/api/complaints/export/csv",
        "/api/requests/{uuid}/status",
        "/api/resources/{uuid}/download",
        "/api/notifications/{uuid}/read",
        "/api/dashboard",
        "/api/contact-us",
        "/api/settings/json",
        "/api/media",
    ] {
        assert!(paths.contains_key(path), "OpenAPI missing path '{}'", path);
    }

    let scheme = v
        .pointer("/components/securitySchemes/bearerAuth/scheme")
        .and_then(Value::as_str);
    assert_eq!(scheme, Some("bearer"));
    Ok(())
}

#[test]
fn openapi_complaint_payload_fields() -> anyhow::Result<()> {
    let v = document()?;
    let props = v
        .pointer("/components/schemas/ComplaintPayload/properties")
        .and_then(Value::as_object)
        .expect("components.schemas.ComplaintPayload.properties must exist");

    for k in ["type", "date_of_incident", "description", "full_name", "email", "priority"] {
        assert!(props.contains_key(k), "ComplaintPayload schema missing '{}'", k);
    }

    let servers = v.get("servers").and_then(Value::as_array).expect("servers must exist");
    assert!(servers.iter().any(|s| s["url"] == "http://localhost:8000"));
    Ok(())
}
