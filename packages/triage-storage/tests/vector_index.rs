use triage_config::Qdrant;
use triage_storage::vector::VectorIndex;

fn keys(hits: &[(String, f32)]) -> Vec<&str> {
	hits.iter().map(|(issue_key, _)| issue_key.as_str()).collect()
}

#[tokio::test]
#[ignore = "Requires external Postgres and Qdrant. Set TRIAGE_PG_DSN and TRIAGE_QDRANT_URL to run."]
async fn collection_bootstrap_upsert_and_scoped_queries() {
	let (Some(base_dsn), Some(qdrant_url)) =
		(triage_testkit::env_dsn(), triage_testkit::env_qdrant_url())
	else {
		eprintln!(
			"Skipping collection_bootstrap_upsert_and_scoped_queries; set TRIAGE_PG_DSN and TRIAGE_QDRANT_URL."
		);

		return;
	};

	triage_testkit::with_test_db(&base_dsn, |test_db| {
		let collection = test_db.collection_name("triage_vectors");

		async move {
			let index =
				VectorIndex::new(&Qdrant { url: qdrant_url, collection, vector_dim: 4 })
					.expect("Failed to build the Qdrant client.");

			index.ensure_collection().await.expect("Failed to create the collection.");
			// A second bootstrap over the same collection must be a no-op.
			index.ensure_collection().await.expect("Second ensure_collection failed.");

			index
				.upsert("SYSCROS-1", &[1., 0., 0., 0.], Some("display"), Some("graphics"))
				.await
				.expect("Failed to upsert SYSCROS-1.");
			index
				.upsert("SYSCROS-2", &[0.9, 0.1, 0., 0.], Some("audio"), Some("graphics"))
				.await
				.expect("Failed to upsert SYSCROS-2.");
			index
				.upsert("SYSCROS-3", &[0., 0., 1., 0.], None, Some("network"))
				.await
				.expect("Failed to upsert SYSCROS-3.");

			let all = index
				.query(&[1., 0., 0., 0.], None, None, 10)
				.await
				.expect("Unfiltered query failed.");

			assert_eq!(all.len(), 3);
			assert_eq!(all[0].0, "SYSCROS-1");
			assert_eq!(all[1].0, "SYSCROS-2");
			assert!(all[0].1 > all[1].1);

			let display = index
				.query(&[1., 0., 0., 0.], Some("display"), None, 10)
				.await
				.expect("Component-filtered query failed.");

			assert_eq!(keys(&display), ["SYSCROS-1"]);

			let graphics = index
				.query(&[1., 0., 0., 0.], None, Some("graphics"), 10)
				.await
				.expect("Domain-filtered query failed.");

			assert_eq!(keys(&graphics), ["SYSCROS-1", "SYSCROS-2"]);

			// Re-upserting a key overwrites its point in place.
			index
				.upsert("SYSCROS-1", &[0., 1., 0., 0.], Some("display"), Some("graphics"))
				.await
				.expect("Failed to re-upsert SYSCROS-1.");

			let moved = index
				.query(&[0., 1., 0., 0.], None, None, 10)
				.await
				.expect("Post-upsert query failed.");

			assert_eq!(moved.len(), 3);
			assert_eq!(moved[0].0, "SYSCROS-1");

			Ok(())
		}
	})
	.await
	.expect("Test run failed.");
}
