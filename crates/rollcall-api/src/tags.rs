use reqwest::Method;
use rollcall_core::{Person, Tag, TagId, TagInput};

use crate::people::search_query;
use crate::{ApiClient, ApiError};

impl ApiClient {
    pub async fn list_tags(&self, search: Option<&str>) -> Result<Vec<Tag>, ApiError> {
        self.get("/user-tags/", &search_query(search)).await
    }

    pub async fn get_tag(&self, id: TagId) -> Result<Tag, ApiError> {
        self.get(&format!("/user-tags/{id}/"), &[]).await
    }

    pub async fn create_tag(&self, input: &TagInput) -> Result<Tag, ApiError> {
        self.send(Method::POST, "/user-tags/", Some(input)).await
    }

    pub async fn update_tag(&self, id: TagId, input: &TagInput) -> Result<Tag, ApiError> {
        self.send(Method::PUT, &format!("/user-tags/{id}/"), Some(input)).await
    }

    /// Delete a tag. The backend detaches it from every person.
    pub async fn delete_tag(&self, id: TagId) -> Result<(), ApiError> {
        self.delete(&format!("/user-tags/{id}/")).await
    }

    pub async fn tag_members(&self, id: TagId) -> Result<Vec<Person>, ApiError> {
        self.get(&format!("/user-tags/{id}/users/"), &[]).await
    }
}
