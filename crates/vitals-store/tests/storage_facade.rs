mod common;

use common::{add_user, at, blood_pressure, open_temp, ADMIN};
use std::sync::Arc;
use vitals_store::{DateRange, NewRecord, NewUser, Role, Storage, StoreError};

#[tokio::test]
async fn test_user_lifecycle_with_records() -> vitals_store::Result<()> {
    // 1. Bootstrap created exactly one administrator
    let (_dir, storage) = open_temp().await?;
    assert_eq!(storage.count_admins().await?, 1);
    let admin = storage.get_user_by_username(ADMIN).await?;
    assert_eq!(admin.user.role, Role::Admin);

    // 2. Alice with readings on three different dates
    let alice = add_user(&storage, "alice").await?;
    let early = storage
        .create_record(alice.id, &blood_pressure(118, 76, at(2024, 1, 3, 7)))
        .await?;
    let late = storage
        .create_record(alice.id, &blood_pressure(125, 82, at(2024, 1, 28, 21)))
        .await?;
    storage
        .create_record(alice.id, &blood_pressure(130, 85, at(2024, 2, 14, 9)))
        .await?;

    // 3. January only, newest first
    let january = DateRange::parse(Some("2024-01-01"), Some("2024-01-31"))?;
    let listed = storage.list_records(alice.id, &january).await?;
    let ids: Vec<i64> = listed.iter().map(|r| r.id).collect();
    assert_eq!(ids, vec![late.id, early.id]);

    // 4. Deleting alice removes her and everything she recorded
    storage.delete_user(alice.id).await?;
    assert!(storage
        .list_records(alice.id, &DateRange::all())
        .await?
        .is_empty());
    let usernames: Vec<String> = storage
        .list_users()
        .await?
        .into_iter()
        .map(|u| u.username)
        .collect();
    assert_eq!(usernames, vec![ADMIN.to_string()]);
    Ok(())
}

#[tokio::test]
async fn test_duplicate_username_conflicts() -> vitals_store::Result<()> {
    let (_dir, storage) = open_temp().await?;

    add_user(&storage, "bob").await?;
    let err = add_user(&storage, "bob").await.unwrap_err();
    assert!(err.is_conflict(), "unexpected error: {:?}", err);
    Ok(())
}

#[tokio::test]
async fn test_concurrent_duplicate_username_single_winner() -> vitals_store::Result<()> {
    let (_dir, storage) = open_temp().await?;
    let storage = Arc::new(storage);

    let mut handles = Vec::new();
    for _ in 0..8 {
        let storage = Arc::clone(&storage);
        handles.push(tokio::spawn(async move {
            storage
                .create_user(&NewUser::new("carol", "$argon2id$stub", Role::User))
                .await
        }));
    }

    let mut created = 0;
    let mut conflicts = 0;
    for handle in handles {
        match handle.await.expect("task panicked") {
            Ok(_) => created += 1,
            Err(StoreError::Conflict(_)) => conflicts += 1,
            Err(e) => panic!("unexpected error: {:?}", e),
        }
    }
    assert_eq!(created, 1);
    assert_eq!(conflicts, 7);
    Ok(())
}

#[tokio::test]
async fn test_concurrent_inserts_get_distinct_ids() -> vitals_store::Result<()> {
    let (_dir, storage) = open_temp().await?;
    let storage = Arc::new(storage);
    let dave_id = add_user(&storage, "dave").await?.id;

    let mut handles = Vec::new();
    for i in 0..20 {
        let storage = Arc::clone(&storage);
        handles.push(tokio::spawn(async move {
            storage
                .create_record(dave_id, &blood_pressure(110 + i, 70, at(2024, 3, 1, 8)))
                .await
        }));
    }

    let mut ids = Vec::new();
    for handle in handles {
        ids.push(handle.await.expect("task panicked")?.id);
    }
    ids.sort_unstable();
    ids.dedup();
    assert_eq!(ids.len(), 20);
    Ok(())
}

#[tokio::test]
async fn test_records_are_scoped_to_their_owner() -> vitals_store::Result<()> {
    let (_dir, storage) = open_temp().await?;
    let owner = add_user(&storage, "erin").await?;
    let other = add_user(&storage, "frank").await?;
    let record = storage
        .create_record(owner.id, &blood_pressure(121, 79, at(2024, 5, 5, 6)))
        .await?;

    let err = storage.delete_record(record.id, other.id).await.unwrap_err();
    assert!(err.is_not_found());
    let err = storage.get_record(record.id, other.id).await.unwrap_err();
    assert!(err.is_not_found());

    assert_eq!(storage.get_record(record.id, owner.id).await?, record);
    storage.delete_record(record.id, owner.id).await?;
    assert!(storage.get_record(record.id, owner.id).await.unwrap_err().is_not_found());
    Ok(())
}

#[tokio::test]
async fn test_record_validation_at_the_boundary() -> vitals_store::Result<()> {
    let (_dir, storage) = open_temp().await?;
    let gina = add_user(&storage, "gina").await?;

    let empty = storage.create_record(gina.id, &NewRecord::default()).await;
    assert!(matches!(empty, Err(StoreError::ValidationFailed(_))));

    let body = NewRecord {
        height_cm: Some(168.0),
        weight_kg: Some(61.5),
        notes: "after run".to_string(),
        ..Default::default()
    };
    let stored = storage.create_record(gina.id, &body).await?;
    assert_eq!(stored.weight_kg, Some(61.5));
    assert_eq!(stored.notes, "after run");

    let orphan = storage.create_record(9_999, &body).await.unwrap_err();
    assert!(orphan.is_not_found());
    Ok(())
}

#[tokio::test]
async fn test_last_admin_cannot_be_removed() -> vitals_store::Result<()> {
    let (_dir, storage) = open_temp().await?;
    let root = storage.get_user_by_username(ADMIN).await?.user;

    // 1. Sole admin is protected
    assert!(matches!(
        storage.delete_user(root.id).await,
        Err(StoreError::ValidationFailed(_))
    ));
    assert!(matches!(
        storage.update_user_role(root.id, Role::User).await,
        Err(StoreError::ValidationFailed(_))
    ));

    // 2. With a second admin, the first can step down
    let helen = add_user(&storage, "helen").await?;
    storage.update_user_role(helen.id, Role::Admin).await?;
    storage.update_user_role(root.id, Role::User).await?;
    assert_eq!(storage.count_admins().await?, 1);
    assert_eq!(storage.get_user(root.id).await?.role, Role::User);
    Ok(())
}

#[tokio::test]
async fn test_settings_keys() -> vitals_store::Result<()> {
    let (_dir, storage) = open_temp().await?;

    assert!(storage.get_setting("theme").await.unwrap_err().is_not_found());
    storage.set_setting("theme", "dark").await?;
    storage.set_setting("theme", "light").await?;
    assert_eq!(storage.get_setting("theme").await?, "light");

    assert!(matches!(
        storage.set_setting("seq:users", "1").await,
        Err(StoreError::ValidationFailed(_))
    ));
    assert!(matches!(
        storage.get_setting("").await,
        Err(StoreError::ValidationFailed(_))
    ));
    Ok(())
}

#[tokio::test]
async fn test_data_survives_reopen_without_second_admin() -> vitals_store::Result<()> {
    let dir = tempfile::tempdir()?;

    let first_id = {
        let storage = Storage::open(common::options(&dir)).await?;
        let ivan = add_user(&storage, "ivan").await?;
        storage.close().await?;
        ivan.id
    };

    let storage = Storage::open(common::options(&dir)).await?;
    assert_eq!(storage.count_admins().await?, 1);
    assert_eq!(storage.get_user(first_id).await?.username, "ivan");

    let judy = add_user(&storage, "judy").await?;
    assert!(judy.id > first_id);
    Ok(())
}

#[tokio::test]
async fn test_bootstrap_promotes_existing_account() -> vitals_store::Result<()> {
    use vitals_store::storage::EmbeddedStore;
    use vitals_store::StorageBackend;

    // 1. A store with a plain "root" user and no admins
    let dir = tempfile::tempdir()?;
    let options = common::options(&dir);
    {
        let mut store = EmbeddedStore::open(options.embedded_path()).await?;
        store
            .create_user(&NewUser::new(ADMIN, "$argon2id$stub", Role::User))
            .await?;
        store.close().await?;
    }

    // 2. Opening promotes it instead of failing on the duplicate name
    let storage = Storage::open(options).await?;
    let root = storage.get_user_by_username(ADMIN).await?;
    assert_eq!(root.user.role, Role::Admin);
    assert_eq!(storage.list_users().await?.len(), 1);
    Ok(())
}
