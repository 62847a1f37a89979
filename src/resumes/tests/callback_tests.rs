// src/resumes/tests/callback_tests.rs
//
// Exercises the analysis-callback state machine against an in-memory
// database: pending -> done, pending -> error, duplicate and stale
// deliveries, and callbacks for deleted resumes.

#[cfg(test)]
mod tests {
    use crate::common::migrations::run_migrations;
    use crate::common::ApiError;
    use crate::resumes::callbacks::{
        apply_analysis_callback, verify_callback_token, CallbackOutcome, CALLBACK_TOKEN_HEADER,
    };
    use crate::resumes::models::AnalysisCallback;
    use axum::http::HeaderMap;
    use sqlx::sqlite::SqlitePoolOptions;
    use sqlx::SqlitePool;

    async fn test_pool() -> SqlitePool {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        run_migrations(&pool).await.unwrap();

        sqlx::query("INSERT INTO users (id, email) VALUES ('U_TEST', 'u@test.dev')")
            .execute(&pool)
            .await
            .unwrap();
        pool
    }

    async fn seed_resume(pool: &SqlitePool, id: &str, status: &str, attempt: i64) {
        sqlx::query(
            r#"
            INSERT INTO resumes
                (id, user_id, original_name, storage_key, file_type, status, analysis_attempt, uploaded_at)
            VALUES (?, 'U_TEST', 'cv.pdf', ?, 'pdf', ?, ?, ?)
            "#,
        )
        .bind(id)
        .bind(format!("resumes/U_TEST/{}.pdf", id))
        .bind(status)
        .bind(attempt)
        .bind(chrono::Utc::now().to_rfc3339())
        .execute(pool)
        .await
        .unwrap();
    }

    fn success_payload() -> AnalysisCallback {
        AnalysisCallback {
            ats_score: Some(82.0),
            quality_score: Some(74.0),
            strength: Some("strong".to_string()),
            extracted_skills: vec!["Python".to_string(), "SQL".to_string()],
            raw_result: Some(serde_json::json!({ "text": "resume body" })),
            ..Default::default()
        }
    }

    async fn resume_state(pool: &SqlitePool, id: &str) -> (String, Option<String>) {
        sqlx::query_as("SELECT status, error_message FROM resumes WHERE id = ?")
            .bind(id)
            .fetch_one(pool)
            .await
            .unwrap()
    }

    async fn analysis_count(pool: &SqlitePool, id: &str) -> i64 {
        sqlx::query_scalar("SELECT COUNT(*) FROM analyses WHERE resume_id = ?")
            .bind(id)
            .fetch_one(pool)
            .await
            .unwrap()
    }

    #[test]
    fn test_callback_token_must_match() {
        let mut headers = HeaderMap::new();
        headers.insert(CALLBACK_TOKEN_HEADER, "secret".parse().unwrap());
        assert!(verify_callback_token(&headers, "secret").is_ok());

        let mut wrong = HeaderMap::new();
        wrong.insert(CALLBACK_TOKEN_HEADER, "guess".parse().unwrap());
        assert!(matches!(
            verify_callback_token(&wrong, "secret"),
            Err(ApiError::Unauthorized(_))
        ));

        assert!(matches!(
            verify_callback_token(&HeaderMap::new(), "secret"),
            Err(ApiError::Unauthorized(_))
        ));
    }

    #[tokio::test]
    async fn test_success_callback_transitions_pending_to_done() {
        let pool = test_pool().await;
        seed_resume(&pool, "R_CB1", "pending", 1).await;

        let outcome = apply_analysis_callback(&pool, "R_CB1", Some(1), &success_payload())
            .await
            .unwrap();
        assert_eq!(outcome, CallbackOutcome::Applied);

        let (status, error) = resume_state(&pool, "R_CB1").await;
        assert_eq!(status, "done");
        assert!(error.is_none());
        assert_eq!(analysis_count(&pool, "R_CB1").await, 1);

        let (ats, skills): (Option<f64>, Option<String>) = sqlx::query_as(
            "SELECT ats_score, extracted_skills FROM analyses WHERE resume_id = 'R_CB1'",
        )
        .fetch_one(&pool)
        .await
        .unwrap();
        assert_eq!(ats, Some(82.0));
        assert_eq!(skills.as_deref(), Some(r#"["Python","SQL"]"#));
    }

    #[tokio::test]
    async fn test_processing_resume_accepts_callback() {
        let pool = test_pool().await;
        seed_resume(&pool, "R_CB2", "processing", 1).await;

        let outcome = apply_analysis_callback(&pool, "R_CB2", Some(1), &success_payload())
            .await
            .unwrap();
        assert_eq!(outcome, CallbackOutcome::Applied);
        assert_eq!(resume_state(&pool, "R_CB2").await.0, "done");
    }

    #[tokio::test]
    async fn test_error_callback_sets_terminal_error_without_analysis_row() {
        let pool = test_pool().await;
        seed_resume(&pool, "R_CB3", "pending", 1).await;

        let payload = AnalysisCallback {
            error: Some("Extracted text is empty".to_string()),
            ..Default::default()
        };

        let outcome = apply_analysis_callback(&pool, "R_CB3", Some(1), &payload)
            .await
            .unwrap();
        assert_eq!(outcome, CallbackOutcome::Applied);

        let (status, error) = resume_state(&pool, "R_CB3").await;
        assert_eq!(status, "error");
        assert_eq!(error.as_deref(), Some("Extracted text is empty"));
        assert_eq!(analysis_count(&pool, "R_CB3").await, 0);
    }

    #[tokio::test]
    async fn test_duplicate_delivery_writes_nothing() {
        let pool = test_pool().await;
        seed_resume(&pool, "R_CB4", "pending", 1).await;

        let first = apply_analysis_callback(&pool, "R_CB4", Some(1), &success_payload())
            .await
            .unwrap();
        assert_eq!(first, CallbackOutcome::Applied);

        // Same delivery again: acknowledged, but still exactly one analysis row
        let second = apply_analysis_callback(&pool, "R_CB4", Some(1), &success_payload())
            .await
            .unwrap();
        assert_eq!(second, CallbackOutcome::Duplicate);
        assert_eq!(analysis_count(&pool, "R_CB4").await, 1);
        assert_eq!(resume_state(&pool, "R_CB4").await.0, "done");
    }

    #[tokio::test]
    async fn test_stale_attempt_is_rejected() {
        let pool = test_pool().await;
        // Resume has been re-triggered; current attempt is 2
        seed_resume(&pool, "R_CB5", "pending", 2).await;

        let outcome = apply_analysis_callback(&pool, "R_CB5", Some(1), &success_payload())
            .await
            .unwrap();
        assert_eq!(outcome, CallbackOutcome::Stale);
        assert_eq!(analysis_count(&pool, "R_CB5").await, 0);
        assert_eq!(resume_state(&pool, "R_CB5").await.0, "pending");
    }

    #[tokio::test]
    async fn test_callback_without_attempt_param_still_applies() {
        // Older ML deployments may not echo the query parameter back
        let pool = test_pool().await;
        seed_resume(&pool, "R_CB6", "pending", 1).await;

        let outcome = apply_analysis_callback(&pool, "R_CB6", None, &success_payload())
            .await
            .unwrap();
        assert_eq!(outcome, CallbackOutcome::Applied);
        assert_eq!(resume_state(&pool, "R_CB6").await.0, "done");
    }

    #[tokio::test]
    async fn test_callback_for_unknown_resume_is_not_found() {
        let pool = test_pool().await;

        let result = apply_analysis_callback(&pool, "R_GONE", Some(1), &success_payload()).await;
        assert!(matches!(result, Err(ApiError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_reanalysis_appends_second_row_and_latest_wins() {
        let pool = test_pool().await;
        seed_resume(&pool, "R_CB7", "pending", 1).await;

        apply_analysis_callback(&pool, "R_CB7", Some(1), &success_payload())
            .await
            .unwrap();

        // Re-trigger bumps the attempt and resets the lifecycle
        sqlx::query(
            "UPDATE resumes SET status = 'pending', analysis_attempt = 2 WHERE id = 'R_CB7'",
        )
        .execute(&pool)
        .await
        .unwrap();

        let second = AnalysisCallback {
            ats_score: Some(91.0),
            quality_score: Some(88.0),
            strength: Some("excellent".to_string()),
            ..Default::default()
        };
        // Force distinct created_at ordering for the latest-wins read
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        apply_analysis_callback(&pool, "R_CB7", Some(2), &second)
            .await
            .unwrap();

        assert_eq!(analysis_count(&pool, "R_CB7").await, 2);

        let latest_ats: Option<f64> = sqlx::query_scalar(
            "SELECT ats_score FROM analyses WHERE resume_id = 'R_CB7' ORDER BY created_at DESC LIMIT 1",
        )
        .fetch_one(&pool)
        .await
        .unwrap();
        assert_eq!(latest_ats, Some(91.0));
    }
}
