fn main() {
    println!("Run `cargo test -p wire-compat` to execute wire compatibility tests.");
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::path::PathBuf;

    use filestream_protocol::{
        ErrorResponse, FileInfo, RawErrorResponse, RawUploadResponse, UploadMetadata,
        UploadResponse,
    };

    /// Returns the path to the fixtures directory.
    fn fixtures_dir() -> PathBuf {
        PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("fixtures")
    }

    /// Loads a fixture JSON file and returns it as a `serde_json::Value`.
    fn load_fixture(name: &str) -> serde_json::Value {
        let path = fixtures_dir().join(name);
        let data = fs::read_to_string(&path)
            .unwrap_or_else(|e| panic!("failed to read fixture {}: {e}", path.display()));
        serde_json::from_str(&data)
            .unwrap_or_else(|e| panic!("failed to parse fixture {}: {e}", path.display()))
    }

    /// Normalizes JSON values so that integer-valued floats compare equal.
    fn normalize_value(v: &serde_json::Value) -> serde_json::Value {
        match v {
            serde_json::Value::Number(n) => match n.as_f64() {
                Some(f) => serde_json::json!(f),
                None => v.clone(),
            },
            serde_json::Value::Object(map) => serde_json::Value::Object(
                map.iter()
                    .map(|(k, v)| (k.clone(), normalize_value(v)))
                    .collect(),
            ),
            serde_json::Value::Array(arr) => {
                serde_json::Value::Array(arr.iter().map(normalize_value).collect())
            }
            _ => v.clone(),
        }
    }

    /// Deserializes a fixture into a Rust type, re-serializes it, and compares
    /// the JSON values (order-independent, float-normalized comparison).
    fn roundtrip_test<T>(name: &str) -> T
    where
        T: serde::de::DeserializeOwned + serde::Serialize,
    {
        let fixture = load_fixture(name);
        let parsed: T = serde_json::from_value(fixture.clone())
            .unwrap_or_else(|e| panic!("failed to deserialize {name}: {e}"));
        let reserialized = serde_json::to_value(&parsed)
            .unwrap_or_else(|e| panic!("failed to re-serialize {name}: {e}"));

        assert_eq!(
            normalize_value(&fixture),
            normalize_value(&reserialized),
            "roundtrip mismatch for {name}:\n  wire: {fixture}\n  Rust: {reserialized}"
        );
        parsed
    }

    // --- Request bodies ---

    #[test]
    fn fixture_upload_metadata() {
        let meta = roundtrip_test::<UploadMetadata>("upload_metadata.json");
        assert_eq!(meta.uploaded_by.as_deref(), Some("finance-bot"));
        assert_eq!(meta.timestamp.to_string(), "2024-03-09 14:05:07");
        assert!(meta.has_required_fields());
    }

    #[test]
    fn minimal_metadata_gets_defaults() {
        let meta: UploadMetadata =
            serde_json::from_str(r#"{"description":"d","category":"c"}"#).unwrap();
        let value = serde_json::to_value(&meta).unwrap();
        assert_eq!(value["encoding"], "UTF-8");
        assert_eq!(value["compressed"], false);
        assert!(value.get("uploadedBy").is_none());
        assert!(value.get("tags").is_none());
        assert!(value["timestamp"].as_str().unwrap().len() == 19);
    }

    // --- Success bodies ---

    #[test]
    fn fixture_file_info() {
        let info = roundtrip_test::<FileInfo>("file_info.json");
        assert_eq!(info.size, 48213);
    }

    #[test]
    fn fixture_upload_response() {
        let resp = roundtrip_test::<UploadResponse>("upload_response.json");
        assert_eq!(resp.file_count, resp.files.len());
        assert_eq!(resp.total_size, resp.files.iter().map(|f| f.size).sum::<u64>());
        assert_eq!(resp.files[1].content_type, None);
    }

    #[test]
    fn fixture_raw_upload_response() {
        roundtrip_test::<RawUploadResponse>("raw_upload_response.json");
    }

    #[test]
    fn raw_upload_response_without_saved_name() {
        let resp: RawUploadResponse =
            serde_json::from_str(r#"{"message":"File uploaded successfully: a","size":0}"#)
                .unwrap();
        assert_eq!(resp.saved_filename, None);
        let value = serde_json::to_value(&resp).unwrap();
        assert!(value.get("savedFilename").is_none());
    }

    // --- Error bodies ---

    #[test]
    fn fixture_error_response() {
        let err = roundtrip_test::<ErrorResponse>("error_response.json");
        assert_eq!(err.status, 400);
    }

    #[test]
    fn fixture_raw_error_response() {
        roundtrip_test::<RawErrorResponse>("raw_error_response.json");
    }

    #[test]
    fn error_response_timestamp_shape() {
        let err = ErrorResponse::new("No Files", "At least one file must be provided", 400);
        // yyyy-MM-ddTHH:mm:ss.SSS
        assert_eq!(err.timestamp.len(), 23);
        assert_eq!(&err.timestamp[10..11], "T");
    }
}
