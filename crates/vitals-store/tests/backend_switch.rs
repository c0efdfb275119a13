mod common;

use common::{add_user, open_temp};
use vitals_store::config::BACKEND_CONFIG_FILE_NAME;
use vitals_store::{BackendConfig, BackendKind, RelationalConfig, Storage, StoreError};

fn unreachable_mysql() -> BackendConfig {
    BackendConfig::Relational(RelationalConfig::new(
        "127.0.0.1",
        1,
        "vitals",
        "secret",
        "vitals",
    ))
}

#[tokio::test]
async fn test_failed_switch_keeps_previous_backend() -> vitals_store::Result<()> {
    // 1. Embedded store in use
    let (dir, storage) = open_temp().await?;
    let sam = add_user(&storage, "sam").await?;

    // 2. Switching to a dead server fails
    let err = storage.switch_backend(unreachable_mysql()).await.unwrap_err();
    assert!(
        matches!(err, StoreError::ConnectionFailed(_)),
        "unexpected error: {:?}",
        err
    );

    // 3. Old backend still answers reads and writes
    assert_eq!(storage.backend_kind().await, BackendKind::Embedded);
    assert_eq!(storage.backend_config().await, BackendConfig::Embedded);
    assert_eq!(storage.get_user(sam.id).await?.username, "sam");
    add_user(&storage, "tess").await?;

    // 4. Nothing was persisted
    assert!(!dir.path().join(BACKEND_CONFIG_FILE_NAME).exists());
    Ok(())
}

#[tokio::test]
async fn test_test_connection() -> vitals_store::Result<()> {
    let (_dir, storage) = open_temp().await?;

    storage.test_connection(&BackendConfig::Embedded).await?;
    assert!(matches!(
        storage.test_connection(&unreachable_mysql()).await,
        Err(StoreError::ConnectionFailed(_))
    ));
    Ok(())
}

#[tokio::test]
async fn test_embedded_switch_persists_and_reopens() -> vitals_store::Result<()> {
    let (dir, storage) = open_temp().await?;
    let uma = add_user(&storage, "uma").await?;

    // Also recovers a closed store
    storage.close().await?;
    assert!(storage.list_users().await.is_err());

    storage.switch_backend(BackendConfig::Embedded).await?;
    assert_eq!(storage.get_user(uma.id).await?.username, "uma");

    let saved = std::fs::read_to_string(dir.path().join(BACKEND_CONFIG_FILE_NAME))?;
    assert!(saved.contains("\"embedded\""));
    Ok(())
}

#[tokio::test]
async fn test_embedded_switch_that_cannot_persist_keeps_serving() -> vitals_store::Result<()> {
    // 1. Selection file can't be replaced
    let (dir, storage) = open_temp().await?;
    let vera = add_user(&storage, "vera").await?;
    std::fs::create_dir(dir.path().join(BACKEND_CONFIG_FILE_NAME))?;

    // 2. Switch reports the write failure
    let err = storage
        .switch_backend(BackendConfig::Embedded)
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::Io(_)), "unexpected error: {:?}", err);

    // 3. The reopened store still serves reads and writes
    assert_eq!(storage.backend_kind().await, BackendKind::Embedded);
    assert_eq!(storage.list_users().await?.len(), 2);
    assert_eq!(storage.get_user(vera.id).await?.username, "vera");
    add_user(&storage, "wren").await?;
    Ok(())
}

#[tokio::test]
async fn test_unreachable_configured_backend_falls_back_at_startup() -> vitals_store::Result<()> {
    let dir = tempfile::tempdir()?;
    let config_path = dir.path().join(BACKEND_CONFIG_FILE_NAME);
    std::fs::write(&config_path, serde_json::to_string_pretty(&unreachable_mysql())?)?;

    let storage = Storage::open(common::options(&dir)).await?;
    assert_eq!(storage.backend_kind().await, BackendKind::Embedded);
    assert_eq!(storage.count_admins().await?, 1);

    // Persisted choice is left for the operator to fix
    let saved: BackendConfig = serde_json::from_str(&std::fs::read_to_string(&config_path)?)?;
    assert_eq!(saved.kind(), BackendKind::Relational);
    Ok(())
}
