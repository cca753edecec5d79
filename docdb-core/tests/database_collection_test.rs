// Database and collection lifecycle plus their feeds

mod common;

use common::{
    create_test_client, expect_failure, feed_options, generate_test_id, validation_timeout,
    CleanupTracker, PARTITION_KEY_PATH,
};
use docdb_core::protocol::{Database, DocumentCollection, ResourceLink};
use docdb_core::validation::{
    single, validate_query_success, validate_success, FailureValidator,
    FeedResponseListValidator, ResourceResponseValidator,
};
use docdb_core::RequestOptions;

#[tokio::test]
async fn test_database_lifecycle() {
    let client = create_test_client();
    let id = generate_test_id();
    let link = ResourceLink::database(id.clone());
    let cleanup = CleanupTracker::default();

    validate_success(
        client.create_database(Database::new(id.clone())),
        &ResourceResponseValidator::builder()
            .status_code(201)
            .with_id(id.clone())
            .with_system_properties()
            .build(),
        validation_timeout(),
    )
    .await
    .unwrap();
    cleanup.track(link.clone());

    validate_success(
        client.read_database(&link),
        &ResourceResponseValidator::builder().with_id(id.clone()).build(),
        validation_timeout(),
    )
    .await
    .unwrap();

    expect_failure(
        single(client.create_database(Database::new(id.clone()))),
        &FailureValidator::builder().conflict().build(),
    )
    .await
    .unwrap();

    let deleted = client.delete_database(&link).await.unwrap();
    assert_eq!(deleted.status_code, 204);

    expect_failure(
        single(client.read_database(&link)),
        &FailureValidator::builder().not_found().build(),
    )
    .await
    .unwrap();

    // already gone, the tracker tolerates it
    cleanup.run(client.as_ref()).await.unwrap();
}

#[tokio::test]
async fn test_read_databases_contains_created() {
    let client = create_test_client();
    let cleanup = CleanupTracker::default();
    let ids: Vec<String> = (0..3).map(|_| generate_test_id()).collect();

    for id in &ids {
        client.create_database(Database::new(id.clone())).await.unwrap();
        cleanup.track(ResourceLink::database(id.clone()));
    }

    let expected = ids.clone();
    let validator = FeedResponseListValidator::<Database>::builder()
        .with_check(move |pages| {
            let seen: Vec<&str> = pages
                .iter()
                .flat_map(|p| p.items.iter())
                .map(|d| d.id.as_str())
                .collect();
            match expected.iter().find(|id| !seen.contains(&id.as_str())) {
                None => Ok(()),
                Some(missing) => Err(docdb_core::ValidationFailure::mismatch(
                    "database listed",
                    missing,
                    seen.len(),
                )),
            }
        })
        .build();

    validate_query_success(
        client.read_databases(&feed_options().max_item_count(1)),
        &validator,
        validation_timeout(),
    )
    .await
    .unwrap();

    cleanup.run(client.as_ref()).await.unwrap();
}

#[tokio::test]
async fn test_collection_lifecycle_and_feed() {
    let client = create_test_client();
    let db_id = generate_test_id();
    let database = ResourceLink::database(db_id.clone());
    let cleanup = CleanupTracker::default();

    client.create_database(Database::new(db_id.clone())).await.unwrap();
    cleanup.track(database.clone());

    let plain = generate_test_id();
    let partitioned = generate_test_id();
    client
        .create_collection(
            &database,
            DocumentCollection::new(plain.clone()),
            &RequestOptions::default(),
        )
        .await
        .unwrap();
    let created = validate_success(
        client.create_collection(
            &database,
            DocumentCollection::partitioned(partitioned.clone(), PARTITION_KEY_PATH),
            &RequestOptions::default(),
        ),
        &ResourceResponseValidator::builder()
            .status_code(201)
            .with_id(partitioned.clone())
            .with_system_properties()
            .build(),
        validation_timeout(),
    )
    .await
    .unwrap();
    assert!(created.resource.is_partitioned());

    validate_query_success(
        client.read_collections(&database, &feed_options()),
        &FeedResponseListValidator::builder()
            .contains_exactly([plain.as_str(), partitioned.as_str()])
            .build(),
        validation_timeout(),
    )
    .await
    .unwrap();

    let link = ResourceLink::collection(db_id.clone(), plain.clone());
    let read = client.read_collection(&link).await.unwrap();
    assert!(!read.resource.is_partitioned());

    client.delete_collection(&link).await.unwrap();
    expect_failure(
        single(client.read_collection(&link)),
        &FailureValidator::builder().not_found().build(),
    )
    .await
    .unwrap();

    validate_query_success(
        client.read_collections(&database, &feed_options()),
        &FeedResponseListValidator::builder()
            .contains_exactly([partitioned.as_str()])
            .build(),
        validation_timeout(),
    )
    .await
    .unwrap();

    cleanup.run(client.as_ref()).await.unwrap();
}

#[tokio::test]
async fn test_collection_in_missing_database_is_not_found() {
    let client = create_test_client();
    let missing = ResourceLink::database(generate_test_id());

    expect_failure(
        single(client.create_collection(
            &missing,
            DocumentCollection::new("c"),
            &RequestOptions::default(),
        )),
        &FailureValidator::builder().not_found().build(),
    )
    .await
    .unwrap();

    expect_failure(
        client.read_collections(&missing, &feed_options()),
        &FailureValidator::builder().not_found().build(),
    )
    .await
    .unwrap();
}
