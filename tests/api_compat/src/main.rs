fn main() {
    println!("Run `cargo test -p api-compat` to execute API compatibility tests.");
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::path::PathBuf;

    use prismdrive_protocol::{
        ApiErrorBody, FileEntry, LoginResponse, Token, decode_entry, summarize_error,
    };

    /// Returns the path to the fixtures directory.
    fn fixtures_dir() -> PathBuf {
        PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("fixtures")
    }

    /// Loads a recorded response body.
    fn load_fixture(name: &str) -> Vec<u8> {
        let path = fixtures_dir().join(name);
        fs::read(&path).unwrap_or_else(|e| panic!("failed to read fixture {}: {e}", path.display()))
    }

    fn entry_fixture(name: &str) -> FileEntry {
        decode_entry(&load_fixture(name))
            .unwrap_or_else(|e| panic!("failed to decode entry from {name}: {e}"))
    }

    #[test]
    fn fixture_upload_response() {
        let entry = entry_fixture("upload_response.json");
        assert_eq!(entry.id, 10482);
        assert_eq!(entry.name, "holiday-video.mp4");
        assert_eq!(entry.entry_type.as_deref(), Some("video"));
        assert_eq!(entry.file_size, Some(734_003_200));
        assert_eq!(entry.parent_id, Some(5531));
        assert_eq!(entry.mime.as_deref(), Some("video/mp4"));
        assert_eq!(entry.description, None);
        assert_eq!(entry.deleted_at, None);
        assert!(!entry.is_folder());
    }

    #[test]
    fn fixture_folder_response() {
        let entry = entry_fixture("folder_response.json");
        assert_eq!(entry.id, 5531);
        assert_eq!(entry.name, "Videos");
        assert_eq!(entry.parent_id, None);
        assert!(entry.is_folder());
    }

    #[test]
    fn fixture_update_response() {
        let entry = entry_fixture("update_response.json");
        assert_eq!(entry.name, "holiday-2024.mp4");
        assert_eq!(entry.description.as_deref(), Some("Trip to the coast"));
    }

    #[test]
    fn entry_reserializes_without_absent_fields() {
        let entry = entry_fixture("update_response.json");
        let value = serde_json::to_value(&entry).unwrap();
        let object = value.as_object().unwrap();
        assert_eq!(object["type"], "video");
        assert!(!object.contains_key("mime"));
        assert!(!object.contains_key("deleted_at"));
    }

    #[test]
    fn fixture_login_response() {
        let resp: LoginResponse = serde_json::from_slice(&load_fixture("login_response.json"))
            .unwrap_or_else(|e| panic!("failed to parse login response: {e}"));
        let user = resp.user.expect("user object");
        assert_eq!(user.email.as_deref(), Some("owner@example.com"));

        let token = Token::new(user.access_token.expect("access token")).unwrap();
        assert_eq!(token.expose(), "211|k3YwJx0pQm9sVt2LrZ8nHc4bDf6gAe1u");
        assert!(!format!("{token:?}").contains("k3YwJx0p"));
    }

    #[test]
    fn fixture_validation_error() {
        let body = load_fixture("validation_error.json");
        let parsed = ApiErrorBody::parse(&body).expect("structured error body");
        assert_eq!(parsed.message.as_deref(), Some("The given data was invalid."));
        assert_eq!(
            parsed.field_errors(),
            vec![
                "file: The file must not be greater than 2097152 kilobytes.",
                "relativePath: The relative path format is invalid.",
            ]
        );
        assert_eq!(summarize_error(422, &body), "The given data was invalid.");
    }

    #[test]
    fn fixture_unauthenticated() {
        let body = load_fixture("unauthenticated.json");
        assert_eq!(summarize_error(401, &body), "Unauthenticated.");
        assert!(ApiErrorBody::parse(&body).unwrap().field_errors().is_empty());
    }

    #[test]
    fn error_body_is_not_an_entry() {
        assert!(decode_entry(&load_fixture("validation_error.json")).is_err());
    }
}
