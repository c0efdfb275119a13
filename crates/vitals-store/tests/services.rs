mod common;

use chrono::{Duration, Utc};
use common::{open_temp, ADMIN, ADMIN_PASSWORD};
use std::sync::Arc;
use vitals_store::{AuthService, IdleTimeout, Role, StoreError};

#[tokio::test]
async fn test_login_and_password_change() -> vitals_store::Result<()> {
    let (_dir, storage) = open_temp().await?;
    let auth = AuthService::new(Arc::new(storage));

    // 1. Bootstrap credentials work
    let root = auth.login(ADMIN, ADMIN_PASSWORD).await?;
    assert!(root.is_admin());

    // 2. Register and log in
    let vera = auth.register("vera", "hunter22", Role::User).await?;
    assert_eq!(auth.login("vera", "hunter22").await?.id, vera.id);

    // 3. Wrong password and unknown user look the same
    assert!(matches!(
        auth.login("vera", "hunter23").await,
        Err(StoreError::AuthenticationFailed)
    ));
    assert!(matches!(
        auth.login("nobody", "hunter22").await,
        Err(StoreError::AuthenticationFailed)
    ));

    // 4. Old password stops working after a change
    auth.change_password(vera.id, "new-secret").await?;
    assert!(auth.login("vera", "hunter22").await.is_err());
    auth.login("vera", "new-secret").await?;

    // 5. Weak passwords rejected before touching storage
    assert!(matches!(
        auth.register("walt", "123", Role::User).await,
        Err(StoreError::ValidationFailed(_))
    ));
    Ok(())
}

#[tokio::test]
async fn test_idle_timeout_setting() -> vitals_store::Result<()> {
    let (_dir, storage) = open_temp().await?;
    let storage = Arc::new(storage);
    let idle = IdleTimeout::new(Arc::clone(&storage));

    // 1. Unset means disabled
    assert_eq!(idle.minutes().await?, 0);
    let long_ago = Utc::now() - Duration::days(30);
    assert!(!idle.is_expired(long_ago, Utc::now()).await?);

    // 2. Negative values rejected, previous value kept
    assert!(matches!(
        idle.set_minutes(-5).await,
        Err(StoreError::ValidationFailed(_))
    ));
    assert_eq!(idle.minutes().await?, 0);

    // 3. Set and enforce
    idle.set_minutes(15).await?;
    assert_eq!(idle.minutes().await?, 15);
    assert_eq!(storage.get_setting("idle_timeout").await?, "15");

    let now = Utc::now();
    assert!(!idle.is_expired(now - Duration::minutes(10), now).await?);
    assert!(idle.is_expired(now - Duration::minutes(20), now).await?);
    Ok(())
}
