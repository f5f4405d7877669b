use async_trait::async_trait;
use rollcall_api::{
    ApiClient, ApiError, ConnectionTest, FaceSource, FinishResponse, MarkAttendanceResponse,
    RecognitionResponse,
};
use rollcall_core::{PersonId, Session, SessionId, SessionInput};

/// The slice of the backend API the coordination layer depends on.
#[async_trait]
pub trait Backend: Send + Sync {
    async fn get_session(&self, id: SessionId) -> Result<Session, ApiError>;

    async fn create_session(&self, input: &SessionInput) -> Result<Session, ApiError>;

    async fn mark_attendance(
        &self,
        id: SessionId,
        person: PersonId,
        is_present: bool,
    ) -> Result<MarkAttendanceResponse, ApiError>;

    async fn finish_session(&self, id: SessionId) -> Result<FinishResponse, ApiError>;

    async fn recognize_face(
        &self,
        session: SessionId,
        source: &FaceSource,
    ) -> Result<RecognitionResponse, ApiError>;

    async fn test_connection(&self, ip: &str) -> Result<ConnectionTest, ApiError>;
}

#[async_trait]
impl Backend for ApiClient {
    async fn get_session(&self, id: SessionId) -> Result<Session, ApiError> {
        ApiClient::get_session(self, id).await
    }

    async fn create_session(&self, input: &SessionInput) -> Result<Session, ApiError> {
        ApiClient::create_session(self, input).await
    }

    async fn mark_attendance(
        &self,
        id: SessionId,
        person: PersonId,
        is_present: bool,
    ) -> Result<MarkAttendanceResponse, ApiError> {
        ApiClient::mark_attendance(self, id, person, is_present).await
    }

    async fn finish_session(&self, id: SessionId) -> Result<FinishResponse, ApiError> {
        ApiClient::finish_session(self, id).await
    }

    async fn recognize_face(
        &self,
        session: SessionId,
        source: &FaceSource,
    ) -> Result<RecognitionResponse, ApiError> {
        ApiClient::recognize_face(self, session, source).await
    }

    async fn test_connection(&self, ip: &str) -> Result<ConnectionTest, ApiError> {
        ApiClient::test_connection(self, ip).await
    }
}
