pub mod health;

use axum::{
    extract::DefaultBodyLimit,
    routing::{delete, get, post},
    Router,
};

use crate::state::AppState;
use crate::{applications, auth, companies, feedback, resumes, storage};

/// Resume uploads may carry the full allowed file size plus multipart
/// framing and text fields, so the transport limit sits above the
/// per-file cap enforced in storage.
const BODY_LIMIT_BYTES: usize = storage::MAX_FILE_SIZE_BYTES + 2 * 1024 * 1024;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_handler))
        // Auth
        .route("/api/auth/register", post(auth::handlers::handle_register))
        .route("/api/auth/login", post(auth::handlers::handle_login))
        .route("/api/auth/me", get(auth::handlers::handle_me))
        // Companies
        .route(
            "/api/companies",
            get(companies::handlers::handle_list_companies)
                .post(companies::handlers::handle_create_company),
        )
        .route(
            "/api/companies/:id",
            get(companies::handlers::handle_get_company)
                .put(companies::handlers::handle_update_company)
                .delete(companies::handlers::handle_delete_company),
        )
        .route(
            "/api/companies/:id/contacts",
            get(companies::handlers::handle_list_contacts)
                .post(companies::handlers::handle_create_contact),
        )
        .route(
            "/api/companies/:company_id/contacts/:contact_id",
            delete(companies::handlers::handle_delete_contact),
        )
        // Job applications
        .route(
            "/api/applications",
            get(applications::handlers::handle_list_applications)
                .post(applications::handlers::handle_create_application),
        )
        .route(
            "/api/applications/dashboard",
            get(applications::handlers::handle_dashboard),
        )
        .route(
            "/api/applications/:id",
            get(applications::handlers::handle_get_application)
                .put(applications::handlers::handle_update_application)
                .delete(applications::handlers::handle_delete_application),
        )
        // Resumes
        .route(
            "/api/resumes",
            get(resumes::handlers::handle_list_resumes)
                .post(resumes::handlers::handle_create_resume),
        )
        .route(
            "/api/resumes/:id",
            get(resumes::handlers::handle_get_resume)
                .put(resumes::handlers::handle_update_resume)
                .delete(resumes::handlers::handle_delete_resume),
        )
        .route(
            "/api/resumes/:id/download",
            get(resumes::handlers::handle_download_resume),
        )
        .route(
            "/api/resumes/:id/versions",
            get(resumes::handlers::handle_list_versions)
                .post(resumes::handlers::handle_create_version),
        )
        .route(
            "/api/resumes/:resume_id/versions/:version_id/download",
            get(resumes::handlers::handle_download_version),
        )
        // Feedback
        .route(
            "/api/feedback",
            post(feedback::handlers::handle_create_feedback),
        )
        .route(
            "/api/feedback/follow-ups",
            get(feedback::handlers::handle_pending_follow_ups),
        )
        .route(
            "/api/feedback/application/:application_id",
            get(feedback::handlers::handle_list_for_application),
        )
        .route(
            "/api/feedback/:id",
            get(feedback::handlers::handle_get_feedback)
                .put(feedback::handlers::handle_update_feedback)
                .delete(feedback::handlers::handle_delete_feedback),
        )
        .route(
            "/api/feedback/:id/complete-followup",
            post(feedback::handlers::handle_complete_follow_up),
        )
        .layer(DefaultBodyLimit::max(BODY_LIMIT_BYTES))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use axum::body::{to_bytes, Body};
    use axum::http::{header, Request, StatusCode};
    use sqlx::postgres::PgPoolOptions;
    use tower::ServiceExt;
    use uuid::Uuid;

    use super::build_router;
    use crate::auth::token;
    use crate::config::Config;
    use crate::state::AppState;
    use crate::storage::FileStore;

    const SECRET: &str = "test-secret";

    /// Router wired to an unreachable database: requests that get as far as
    /// a query fail with a database error rather than a transport error.
    fn app(upload_root: &std::path::Path) -> axum::Router {
        let db = PgPoolOptions::new()
            .acquire_timeout(std::time::Duration::from_millis(200))
            .connect_lazy("postgres://jobtrack@127.0.0.1:1/unreachable")
            .unwrap();
        let config = Config {
            database_url: String::new(),
            jwt_secret: SECRET.to_string(),
            token_ttl_minutes: 60,
            upload_root: upload_root.display().to_string(),
            port: 0,
            rust_log: "info".to_string(),
        };
        build_router(AppState {
            db,
            config,
            files: FileStore::new(upload_root),
        })
    }

    fn bearer() -> String {
        let token = token::issue(
            Uuid::new_v4(),
            "a@example.com",
            &["user".to_string()],
            SECRET,
            60,
        )
        .unwrap();
        format!("Bearer {token}")
    }

    fn multipart_upload(boundary: &str, file_len: usize) -> Vec<u8> {
        let mut body = Vec::new();
        body.extend_from_slice(
            format!(
                "--{boundary}\r\nContent-Disposition: form-data; name=\"title\"\r\n\r\nBig resume\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(
            format!(
                "--{boundary}\r\nContent-Disposition: form-data; name=\"file\"; \
                 filename=\"big.pdf\"\r\nContent-Type: application/pdf\r\n\r\n"
            )
            .as_bytes(),
        );
        body.extend(std::iter::repeat(b'a').take(file_len));
        body.extend_from_slice(format!("\r\n--{boundary}--\r\n").as_bytes());
        body
    }

    #[tokio::test]
    async fn test_upload_over_two_megabytes_reaches_handler() {
        let dir = tempfile::tempdir().unwrap();
        let app = app(dir.path());

        let boundary = "upload-test-boundary";
        let body = multipart_upload(boundary, 3 * 1024 * 1024);
        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/resumes")
                    .header(header::AUTHORIZATION, bearer())
                    .header(
                        header::CONTENT_TYPE,
                        format!("multipart/form-data; boundary={boundary}"),
                    )
                    .body(Body::from(body))
                    .unwrap(),
            )
            .await
            .unwrap();

        // The full body must make it through the transport limit; the
        // request then dies on the unreachable database, not on parsing.
        assert_ne!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
        assert_ne!(response.status(), StatusCode::BAD_REQUEST);
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(value["error"]["code"], "DATABASE_ERROR");
    }

    #[tokio::test]
    async fn test_me_returns_token_identity() {
        let dir = tempfile::tempdir().unwrap();
        let app = app(dir.path());

        let id = Uuid::new_v4();
        let token = token::issue(id, "me@example.com", &["user".to_string()], SECRET, 60).unwrap();
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/api/auth/me")
                    .header(header::AUTHORIZATION, format!("Bearer {token}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(value["id"], id.to_string());
        assert_eq!(value["email"], "me@example.com");
        assert_eq!(value["roles"], serde_json::json!(["user"]));
    }

    #[tokio::test]
    async fn test_me_requires_token() {
        let dir = tempfile::tempdir().unwrap();
        let app = app(dir.path());

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/api/auth/me")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }
}
