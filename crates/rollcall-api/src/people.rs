use reqwest::Method;
use rollcall_core::{FaceImage, Person, PersonId, PersonInput, TagId};
use serde::Deserialize;

use crate::{ApiClient, ApiError};

/// A person together with their registered face images.
#[derive(Debug, Clone, Deserialize)]
pub struct PersonFaces {
    pub user: Person,
    #[serde(default)]
    pub images: Vec<FaceImage>,
}

pub(crate) fn search_query(search: Option<&str>) -> Vec<(&'static str, String)> {
    match search.map(str::trim) {
        Some(q) if !q.is_empty() => vec![("search", q.to_string())],
        _ => Vec::new(),
    }
}

impl ApiClient {
    /// List people, optionally filtered by name, email or tag name.
    pub async fn list_people(&self, search: Option<&str>) -> Result<Vec<Person>, ApiError> {
        self.get("/users/", &search_query(search)).await
    }

    pub async fn get_person(&self, id: PersonId) -> Result<Person, ApiError> {
        self.get(&format!("/users/{id}/"), &[]).await
    }

    pub async fn person_face_images(&self, id: PersonId) -> Result<PersonFaces, ApiError> {
        self.get(&format!("/users/{id}/face_images/"), &[]).await
    }

    pub async fn create_person(&self, input: &PersonInput) -> Result<Person, ApiError> {
        self.send(Method::POST, "/users/", Some(input)).await
    }

    pub async fn update_person(&self, id: PersonId, input: &PersonInput) -> Result<Person, ApiError> {
        self.send(Method::PUT, &format!("/users/{id}/"), Some(input)).await
    }

    pub async fn delete_person(&self, id: PersonId) -> Result<(), ApiError> {
        self.delete(&format!("/users/{id}/")).await
    }

    pub async fn people_by_tag(&self, tag_id: TagId) -> Result<Vec<Person>, ApiError> {
        self.get("/users/by_tag/", &[("tag_id", tag_id.to_string())]).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_search_query_skips_blank() {
        assert!(search_query(None).is_empty());
        assert!(search_query(Some("   ")).is_empty());
        assert_eq!(search_query(Some(" ana ")), vec![("search", "ana".to_string())]);
    }

    #[test]
    fn test_person_faces_decodes_without_images() {
        let faces: PersonFaces = serde_json::from_value(serde_json::json!({
            "user": {"id": 4, "name": "Dee", "email": "dee@example.com", "tags": []}
        }))
        .unwrap();
        assert_eq!(faces.user.id, 4);
        assert!(faces.images.is_empty());
    }

    #[test]
    fn test_person_input_shape() {
        let input = PersonInput {
            name: "Eve".into(),
            email: "eve@example.com".into(),
            tag_ids: vec![1, 2],
            tag: None,
        };
        let value = serde_json::to_value(&input).unwrap();
        assert_eq!(value["tag_ids"], serde_json::json!([1, 2]));
        assert!(value.get("tag").is_none());
    }
}
