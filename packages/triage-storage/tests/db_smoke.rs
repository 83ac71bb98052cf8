use time::OffsetDateTime;
use uuid::Uuid;

use triage_config::Postgres;
use triage_storage::{
	db::Db,
	models::AnalysisRun,
	queries::{self, IssueUpsert},
};
use triage_testkit::TestDatabase;

async fn bootstrapped_db(test_db: &TestDatabase) -> Db {
	let cfg = Postgres { dsn: test_db.dsn().to_string(), pool_max_conns: 2 };
	let db = Db::connect(&cfg).await.expect("Failed to connect to Postgres.");

	db.ensure_schema().await.expect("Failed to ensure schema.");

	db
}

fn issue(issue_key: &str, summary: &str, component: Option<&str>) -> IssueUpsert {
	IssueUpsert {
		issue_key: issue_key.to_string(),
		summary: summary.to_string(),
		description: Some("long description".to_string()),
		component: component.map(str::to_string),
		os: None,
		domain: None,
		status: None,
		priority: None,
		labels: None,
	}
}

#[tokio::test]
#[ignore = "Requires external Postgres. Set TRIAGE_PG_DSN to run."]
async fn schema_bootstrap_is_idempotent() {
	let Some(base_dsn) = triage_testkit::env_dsn() else {
		eprintln!("Skipping schema_bootstrap_is_idempotent; set TRIAGE_PG_DSN to run this test.");

		return;
	};
	let test_db = TestDatabase::new(&base_dsn).await.expect("Failed to create test database.");
	let db = bootstrapped_db(&test_db).await;

	// A second bootstrap over the same database must be a no-op.
	db.ensure_schema().await.expect("Second ensure_schema failed.");

	for table in ["issues", "issue_embeddings", "analysis_runs"] {
		let count: i64 = sqlx::query_scalar(
			"SELECT count(*) FROM information_schema.tables WHERE table_name = $1",
		)
		.bind(table)
		.fetch_one(&db.pool)
		.await
		.expect("Failed to query schema tables.");

		assert_eq!(count, 1, "table {table} missing");
	}

	test_db.cleanup().await.expect("Failed to cleanup test database.");
}

#[tokio::test]
#[ignore = "Requires external Postgres. Set TRIAGE_PG_DSN to run."]
async fn issue_upsert_keeps_stored_optionals() {
	let Some(base_dsn) = triage_testkit::env_dsn() else {
		eprintln!("Skipping issue_upsert_keeps_stored_optionals; set TRIAGE_PG_DSN to run this test.");

		return;
	};
	let test_db = TestDatabase::new(&base_dsn).await.expect("Failed to create test database.");
	let db = bootstrapped_db(&test_db).await;
	let now = OffsetDateTime::now_utc();

	queries::upsert_issue(&db, &issue("SYSCROS-1", "first summary", Some("display")), now)
		.await
		.expect("First upsert failed.");

	// Re-intake without a component; the stored component must survive.
	let mut update = issue("SYSCROS-1", "second summary", None);

	update.description = None;

	queries::upsert_issue(&db, &update, now).await.expect("Second upsert failed.");

	let stored = queries::fetch_issue(&db, "SYSCROS-1")
		.await
		.expect("Fetch failed.")
		.expect("Issue missing.");

	assert_eq!(stored.summary, "second summary");
	assert_eq!(stored.component.as_deref(), Some("display"));
	assert_eq!(stored.description.as_deref(), Some("long description"));

	test_db.cleanup().await.expect("Failed to cleanup test database.");
}

#[tokio::test]
#[ignore = "Requires external Postgres. Set TRIAGE_PG_DSN to run."]
async fn embedding_candidates_filter_by_scope_and_version() {
	let Some(base_dsn) = triage_testkit::env_dsn() else {
		eprintln!(
			"Skipping embedding_candidates_filter_by_scope_and_version; set TRIAGE_PG_DSN to run this test."
		);

		return;
	};
	let test_db = TestDatabase::new(&base_dsn).await.expect("Failed to create test database.");
	let db = bootstrapped_db(&test_db).await;
	let now = OffsetDateTime::now_utc();

	for (issue_key, component, version) in [
		("SYSCROS-1", Some("display"), "v1"),
		("SYSCROS-2", Some("display"), "v1"),
		("SYSCROS-3", Some("audio"), "v1"),
		("SYSCROS-4", Some("display"), "v0"),
	] {
		queries::upsert_issue(&db, &issue(issue_key, "summary", component), now)
			.await
			.expect("Seed upsert failed.");
		queries::upsert_embedding(&db, issue_key, &[1., 0., 0.], version, now)
			.await
			.expect("Seed embedding failed.");
	}

	let candidates =
		queries::embedding_candidates(&db, "v1", Some("display"), None, Some("SYSCROS-1"))
			.await
			.expect("Candidate query failed.");
	let keys: Vec<&str> =
		candidates.iter().map(|candidate| candidate.issue_key.as_str()).collect();

	// Same component, current version, excluding the query issue itself.
	assert_eq!(keys, ["SYSCROS-2"]);

	test_db.cleanup().await.expect("Failed to cleanup test database.");
}

#[tokio::test]
#[ignore = "Requires external Postgres. Set TRIAGE_PG_DSN to run."]
async fn latest_completed_run_skips_other_statuses() {
	let Some(base_dsn) = triage_testkit::env_dsn() else {
		eprintln!(
			"Skipping latest_completed_run_skips_other_statuses; set TRIAGE_PG_DSN to run this test."
		);

		return;
	};
	let test_db = TestDatabase::new(&base_dsn).await.expect("Failed to create test database.");
	let db = bootstrapped_db(&test_db).await;
	let now = OffsetDateTime::now_utc();

	queries::upsert_issue(&db, &issue("SYSCROS-1", "summary", None), now)
		.await
		.expect("Seed upsert failed.");

	let mut run = AnalysisRun {
		run_id: Uuid::new_v4(),
		fingerprint: "fp-1".to_string(),
		issue_key: "SYSCROS-1".to_string(),
		domain: None,
		os: None,
		report: "report".to_string(),
		analysis: String::new(),
		status: "SKIPPED".to_string(),
		related_issue_keys: None,
		created_at: now,
	};

	queries::insert_analysis_run(&db, &run).await.expect("Skipped insert failed.");

	assert!(
		queries::latest_completed_run(&db, "fp-1")
			.await
			.expect("Lookup failed.")
			.is_none()
	);

	run.run_id = Uuid::new_v4();
	run.status = "COMPLETED".to_string();
	run.analysis = "root cause".to_string();
	run.related_issue_keys = Some(serde_json::json!(["SYSCROS-2"]));

	queries::insert_analysis_run(&db, &run).await.expect("Completed insert failed.");

	let fetched = queries::latest_completed_run(&db, "fp-1")
		.await
		.expect("Lookup failed.")
		.expect("Completed run missing.");

	assert_eq!(fetched.analysis, "root cause");
	assert_eq!(fetched.related_issue_keys, Some(serde_json::json!(["SYSCROS-2"])));

	test_db.cleanup().await.expect("Failed to cleanup test database.");
}
