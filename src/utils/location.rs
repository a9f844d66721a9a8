use crate::services::gateway::ApiResponse;

/// Final `/`-delimited segment of a `Location` header value.
pub fn id_from_location(location: &str) -> Option<String> {
    location
        .trim()
        .rsplit('/')
        .next()
        .map(str::trim)
        .filter(|segment| !segment.is_empty())
        .map(str::to_string)
}

/// Identifier of the resource created by `response`, if the upstream confirmed one.
pub fn created_resource_id(response: &ApiResponse) -> Option<String> {
    response.header("location").and_then(id_from_location)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{Map, Value};

    #[test]
    fn takes_last_path_segment() {
        assert_eq!(
            id_from_location("https://api.example.test/persons/abc123").as_deref(),
            Some("abc123")
        );
        assert_eq!(id_from_location("/abc123").as_deref(), Some("abc123"));
        assert_eq!(id_from_location("abc123").as_deref(), Some("abc123"));
    }

    #[test]
    fn trailing_slash_or_blank_yields_nothing() {
        assert_eq!(id_from_location("https://api.example.test/persons/"), None);
        assert_eq!(id_from_location("   "), None);
    }

    #[test]
    fn reads_header_regardless_of_case() {
        let mut headers = Map::new();
        headers.insert(
            "Location".to_string(),
            Value::String("https://api.example.test/appointments/a-7".to_string()),
        );
        let response = ApiResponse {
            body: Value::Null,
            headers,
            status_code: 201,
        };
        assert_eq!(created_resource_id(&response).as_deref(), Some("a-7"));
    }
}
