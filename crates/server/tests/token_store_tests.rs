//! Authorization code and refresh token store behaviour against SQLite.

mod common;

use oidc_token_service::entity::{auth_code, refresh_token};
use oidc_token_service::error::AuthError;
use oidc_token_service::tokens::{
    AuthorizationCodeStore, PkceBinding, RefreshTokenStore, hash_token,
};
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ConnectionTrait, DbBackend, EntityTrait, PaginatorTrait,
    Statement,
};
use time::{Duration, OffsetDateTime};

// =============================================================================
// Authorization codes
// =============================================================================

#[tokio::test]
async fn test_code_is_32_chars_and_stored_hashed() {
    let db = common::test_db().await;
    let store = AuthorizationCodeStore::new(db.clone());

    let code = store.issue("user-1", None).await.unwrap();
    assert_eq!(code.len(), 32);

    let rows = auth_code::Entity::find().all(db.as_ref()).await.unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].code_hash, hash_token(&code));
    assert_ne!(rows[0].code_hash, code);
    assert_eq!(rows[0].identity_id, "user-1");
    assert_eq!(rows[0].expires_at - rows[0].created_at, Duration::seconds(60));
}

#[tokio::test]
async fn test_code_consumes_exactly_once() {
    let store = AuthorizationCodeStore::new(common::test_db().await);
    let code = store.issue("user-1", None).await.unwrap();

    let first = store.consume(&code).await.unwrap().expect("first consume");
    assert_eq!(first.identity_id, "user-1");
    assert!(first.pkce.is_none());

    assert!(store.consume(&code).await.unwrap().is_none());
}

#[tokio::test]
async fn test_concurrent_consumes_have_one_winner() {
    let store = AuthorizationCodeStore::new(common::test_db().await);
    let code = store.issue("user-1", None).await.unwrap();

    let (a, b) = tokio::join!(store.consume(&code), store.consume(&code));
    let winners = [a.unwrap(), b.unwrap()]
        .into_iter()
        .filter(Option::is_some)
        .count();
    assert_eq!(winners, 1);
}

#[tokio::test]
async fn test_undecodable_code_row_is_internal_error() {
    let db = common::test_db().await;
    db.execute(Statement::from_sql_and_values(
        DbBackend::Sqlite,
        "INSERT INTO auth_code (code_hash, identity_id, expires_at, created_at) VALUES (?, ?, ?, ?)",
        [
            hash_token("corrupt-code").into(),
            "user-1".into(),
            "zzzz".into(),
            "zzzz".into(),
        ],
    ))
    .await
    .unwrap();

    let store = AuthorizationCodeStore::new(db);
    assert!(matches!(
        store.consume("corrupt-code").await,
        Err(AuthError::Internal(_))
    ));
}

#[tokio::test]
async fn test_undecodable_refresh_row_is_internal_error() {
    let db = common::test_db().await;
    db.execute(Statement::from_sql_and_values(
        DbBackend::Sqlite,
        "INSERT INTO refresh_token (token_hash, identity_id, expires_at, created_at) VALUES (?, ?, ?, ?)",
        [
            hash_token("corrupt-token").into(),
            "user-1".into(),
            "zzzz".into(),
            "zzzz".into(),
        ],
    ))
    .await
    .unwrap();

    let store = RefreshTokenStore::new(db);
    assert!(matches!(
        store.validate("corrupt-token").await,
        Err(AuthError::Internal(_))
    ));
    assert!(matches!(
        store.rotate("corrupt-token").await,
        Err(AuthError::Internal(_))
    ));
}

#[tokio::test]
async fn test_unknown_code_is_none_not_error() {
    let store = AuthorizationCodeStore::new(common::test_db().await);
    assert!(store.consume("never-issued").await.unwrap().is_none());
    assert!(store.consume("").await.unwrap().is_none());
}

#[tokio::test]
async fn test_expired_code_is_rejected() {
    let db = common::test_db().await;
    let store = AuthorizationCodeStore::new(db.clone());
    let now = OffsetDateTime::now_utc();

    auth_code::ActiveModel {
        code_hash: Set(hash_token("stale-code")),
        identity_id: Set("user-1".into()),
        code_challenge: Set(None),
        code_challenge_method: Set(None),
        resource: Set(None),
        expires_at: Set(now - Duration::seconds(1)),
        created_at: Set(now - Duration::seconds(61)),
    }
    .insert(db.as_ref())
    .await
    .unwrap();

    assert!(store.consume("stale-code").await.unwrap().is_none());
}

#[tokio::test]
async fn test_code_carries_pkce_binding() {
    let store = AuthorizationCodeStore::new(common::test_db().await);
    let binding = PkceBinding::s256(
        common::PKCE_CHALLENGE,
        Some("https://api.example.com".to_string()),
    );
    let code = store.issue("user-1", Some(binding.clone())).await.unwrap();

    let consumed = store.consume(&code).await.unwrap().unwrap();
    assert_eq!(consumed.pkce, Some(binding));
}

#[tokio::test]
async fn test_code_requires_identity() {
    let store = AuthorizationCodeStore::new(common::test_db().await);
    assert!(matches!(
        store.issue("", None).await,
        Err(AuthError::InvalidInput(_))
    ));
}

// =============================================================================
// Refresh tokens
// =============================================================================

#[tokio::test]
async fn test_refresh_token_is_64_chars() {
    let db = common::test_db().await;
    let store = RefreshTokenStore::new(db.clone());
    let token = store.issue("user-1").await.unwrap();
    assert_eq!(token.len(), 64);

    let row = refresh_token::Entity::find_by_id(hash_token(&token))
        .one(db.as_ref())
        .await
        .unwrap()
        .expect("stored by hash");
    assert_eq!(row.expires_at - row.created_at, Duration::days(90));
}

#[tokio::test]
async fn test_refresh_token_requires_identity() {
    let store = RefreshTokenStore::new(common::test_db().await);
    assert!(matches!(store.issue("").await, Err(AuthError::InvalidInput(_))));
}

#[tokio::test]
async fn test_rotate_then_reuse_fails() {
    let store = RefreshTokenStore::new(common::test_db().await);
    let original = store.issue("user-1").await.unwrap();

    let rotated = store.rotate(&original).await.unwrap().expect("rotation");
    assert_eq!(rotated.identity_id, "user-1");
    assert_ne!(rotated.token, original);
    assert_eq!(rotated.token.len(), 64);

    assert!(store.rotate(&original).await.unwrap().is_none());
    assert!(store.validate(&original).await.unwrap().is_none());
    assert_eq!(
        store.validate(&rotated.token).await.unwrap().as_deref(),
        Some("user-1")
    );
}

#[tokio::test]
async fn test_rotation_keeps_absolute_expiry() {
    let db = common::test_db().await;
    let store = RefreshTokenStore::new(db.clone());
    let original = store.issue("user-1").await.unwrap();
    let before = refresh_token::Entity::find_by_id(hash_token(&original))
        .one(db.as_ref())
        .await
        .unwrap()
        .unwrap();

    let rotated = store.rotate(&original).await.unwrap().unwrap();
    let after = refresh_token::Entity::find_by_id(hash_token(&rotated.token))
        .one(db.as_ref())
        .await
        .unwrap()
        .unwrap();

    assert_eq!(after.expires_at, before.expires_at);
    assert_eq!(after.identity_id, before.identity_id);
    assert_eq!(refresh_token::Entity::find().count(db.as_ref()).await.unwrap(), 1);
}

#[tokio::test]
async fn test_concurrent_rotations_have_one_winner() {
    let db = common::test_db().await;
    let store = RefreshTokenStore::new(db.clone());
    let original = store.issue("user-1").await.unwrap();

    let (a, b) = tokio::join!(store.rotate(&original), store.rotate(&original));
    let results = [a.unwrap(), b.unwrap()];
    assert_eq!(results.iter().filter(|r| r.is_some()).count(), 1);
    assert_eq!(refresh_token::Entity::find().count(db.as_ref()).await.unwrap(), 1);
}

#[tokio::test]
async fn test_expired_refresh_token_is_not_rotated() {
    let db = common::test_db().await;
    let store = RefreshTokenStore::new(db.clone());
    let now = OffsetDateTime::now_utc();

    refresh_token::ActiveModel {
        token_hash: Set(hash_token("stale-token")),
        identity_id: Set("user-1".into()),
        expires_at: Set(now - Duration::seconds(5)),
        created_at: Set(now - Duration::days(90)),
    }
    .insert(db.as_ref())
    .await
    .unwrap();

    assert!(store.validate("stale-token").await.unwrap().is_none());
    assert!(store.rotate("stale-token").await.unwrap().is_none());
    assert_eq!(refresh_token::Entity::find().count(db.as_ref()).await.unwrap(), 0);
}

#[tokio::test]
async fn test_revoke_is_idempotent() {
    let store = RefreshTokenStore::new(common::test_db().await);
    let token = store.issue("user-1").await.unwrap();

    store.revoke(&token).await.unwrap();
    store.revoke(&token).await.unwrap();
    store.revoke("never-issued").await.unwrap();

    assert!(store.validate(&token).await.unwrap().is_none());
    assert!(store.rotate(&token).await.unwrap().is_none());
}

#[tokio::test]
async fn test_custom_ttl_is_applied() {
    let db = common::test_db().await;
    let store = RefreshTokenStore::with_ttl(db.clone(), Duration::hours(2));
    let token = store.issue("user-1").await.unwrap();
    let row = refresh_token::Entity::find_by_id(hash_token(&token))
        .one(db.as_ref())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(row.expires_at - row.created_at, Duration::hours(2));
}
