//! Find-or-create of identities under concurrent first sign-ins.

mod common;

use oidc_token_service::entity::identity;
use oidc_token_service::error::AuthError;
use sea_orm::{ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter};
use wiremock::MockServer;

async fn identities_with_email(
    resources: &oidc_token_service::AppResources,
    email: &str,
) -> u64 {
    identity::Entity::find()
        .filter(identity::Column::Email.eq(email))
        .count(resources.db.as_ref())
        .await
        .unwrap()
}

#[tokio::test]
async fn test_concurrent_registrations_share_one_identity() {
    let resources = common::resources(vec![]).await;
    let endpoint = &resources.token_endpoint;

    let (a, b) = tokio::join!(
        endpoint.authenticate_password("ada@example.com", "pw-one"),
        endpoint.authenticate_password("ada@example.com", "pw-two"),
    );

    assert_eq!(identities_with_email(&resources, "ada@example.com").await, 1);
    let (winner, loser) = match (a, b) {
        (Ok(id), Err(e)) | (Err(e), Ok(id)) => (id, e),
        other => panic!("expected exactly one registration to win, got {other:?}"),
    };
    assert!(matches!(loser, AuthError::InvalidClient(_)));

    let again = [
        endpoint.authenticate_password("ada@example.com", "pw-one").await,
        endpoint.authenticate_password("ada@example.com", "pw-two").await,
    ];
    let accepted: Vec<_> = again.into_iter().filter_map(Result::ok).collect();
    assert_eq!(accepted, vec![winner]);
}

#[tokio::test]
async fn test_concurrent_registrations_with_same_password_both_succeed() {
    let resources = common::resources(vec![]).await;
    let endpoint = &resources.token_endpoint;

    let (a, b) = tokio::join!(
        endpoint.authenticate_password("bob@example.com", "same-pw"),
        endpoint.authenticate_password("bob@example.com", "same-pw"),
    );

    assert_eq!(a.unwrap(), b.unwrap());
    assert_eq!(identities_with_email(&resources, "bob@example.com").await, 1);
}

#[tokio::test]
async fn test_concurrent_id_token_sign_ins_share_one_identity() {
    let provider = MockServer::start().await;
    common::mount_provider(&provider, "k1").await;
    let resources =
        common::resources(vec![common::provider("mock", &provider.uri(), "client-a")]).await;
    let id_token = common::sign_id_token(
        "k1",
        &common::id_token_claims(&provider.uri(), "client-a", "carol"),
    );
    let endpoint = &resources.token_endpoint;

    let (a, b) = tokio::join!(
        endpoint.sign_in_with_id_token(&id_token),
        endpoint.sign_in_with_id_token(&id_token),
    );

    assert_eq!(a.unwrap(), b.unwrap());
    assert_eq!(identities_with_email(&resources, "carol@example.com").await, 1);
}
