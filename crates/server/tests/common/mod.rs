//! Shared fixtures: in-memory database, configuration, and a fake OIDC
//! provider served by wiremock.
#![allow(dead_code)]

use base64::Engine;
use jsonwebtoken::{Algorithm, EncodingKey, Header, encode};
use oidc_token_service::AppResources;
use oidc_token_service::config::{AuthConfig, TrustedProvider};
use rsa::RsaPrivateKey;
use rsa::pkcs8::DecodePrivateKey;
use rsa::traits::PublicKeyParts;
use sea_orm::{ConnectionTrait, Database, DatabaseConnection, DbBackend, Statement};
use serde_json::{Value, json};
use std::sync::Arc;
use time::OffsetDateTime;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const ISSUER: &str = "https://auth.example.com";
pub const REDIRECT_URI: &str = "https://app.example.com/callback";

pub const SIGNING_KEY_PEM: &str = include_str!("../fixtures/signing_key.pem");
pub const PROVIDER_KEY_PEM: &str = include_str!("../fixtures/provider_key.pem");
pub const OTHER_KEY_PKCS1_PEM: &str = include_str!("../fixtures/other_key_pkcs1.pem");

/// RFC 7636 appendix B
pub const PKCE_VERIFIER: &str = "dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk";
pub const PKCE_CHALLENGE: &str = "E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM";

pub async fn test_db() -> Arc<DatabaseConnection> {
    let db = Database::connect("sqlite::memory:").await.expect("connect");

    db.execute(Statement::from_string(
        DbBackend::Sqlite,
        r#"CREATE TABLE auth_code (
            code_hash TEXT PRIMARY KEY,
            identity_id TEXT NOT NULL,
            code_challenge TEXT NULL,
            code_challenge_method TEXT NULL,
            resource TEXT NULL,
            expires_at TEXT NOT NULL,
            created_at TEXT NOT NULL
        );"#,
    ))
    .await
    .expect("create auth_code table");

    db.execute(Statement::from_string(
        DbBackend::Sqlite,
        r#"CREATE TABLE refresh_token (
            token_hash TEXT PRIMARY KEY,
            identity_id TEXT NOT NULL,
            expires_at TEXT NOT NULL,
            created_at TEXT NOT NULL
        );"#,
    ))
    .await
    .expect("create refresh_token table");

    db.execute(Statement::from_string(
        DbBackend::Sqlite,
        r#"CREATE TABLE identity (
            id TEXT PRIMARY KEY,
            email TEXT NULL,
            email_verified INTEGER NOT NULL DEFAULT 0,
            password TEXT NULL,
            external_id TEXT NULL,
            issuer TEXT NULL,
            name TEXT NULL,
            given_name TEXT NULL,
            family_name TEXT NULL,
            picture TEXT NULL,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );"#,
    ))
    .await
    .expect("create identity table");

    for index in [
        "CREATE UNIQUE INDEX idx_identity_external_id_issuer ON identity (external_id, issuer);",
        "CREATE UNIQUE INDEX idx_identity_native_email_issuer ON identity (email, issuer) WHERE password IS NOT NULL;",
    ] {
        db.execute(Statement::from_string(DbBackend::Sqlite, index))
            .await
            .expect("create identity index");
    }

    Arc::new(db)
}

pub fn provider(name: &str, issuer: &str, client_id: &str) -> TrustedProvider {
    TrustedProvider {
        name: name.to_string(),
        issuer_url: issuer.to_string(),
        client_id: client_id.to_string(),
        client_secret: Some(format!("{client_id}-secret")),
    }
}

pub fn auth_config(providers: Vec<TrustedProvider>) -> AuthConfig {
    AuthConfig {
        issuer_url: ISSUER.to_string(),
        private_key_pem: SIGNING_KEY_PEM.to_string(),
        access_token_ttl: 3600,
        refresh_token_ttl: 86400,
        refresh_token_rotation: true,
        password_hash_cost: 4,
        discovery_timeout_secs: 2,
        discovery_cache_ttl_secs: 300,
        allowed_redirect_urls: vec![REDIRECT_URI.to_string()],
        providers,
    }
}

pub async fn resources_with(config: AuthConfig) -> AppResources {
    AppResources::new(test_db().await, config).expect("build resources")
}

pub async fn resources(providers: Vec<TrustedProvider>) -> AppResources {
    resources_with(auth_config(providers)).await
}

fn b64(bytes: &[u8]) -> String {
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes)
}

/// Public half of the provider fixture key as a JWK.
pub fn provider_jwk(kid: &str) -> Value {
    let key = RsaPrivateKey::from_pkcs8_pem(PROVIDER_KEY_PEM).expect("provider key");
    json!({
        "kty": "RSA",
        "kid": kid,
        "use": "sig",
        "alg": "RS256",
        "n": b64(&key.n().to_bytes_be()),
        "e": b64(&key.e().to_bytes_be()),
    })
}

pub fn discovery_document(issuer: &str) -> Value {
    json!({
        "issuer": issuer,
        "authorization_endpoint": format!("{issuer}/authorize"),
        "token_endpoint": format!("{issuer}/token"),
        "jwks_uri": format!("{issuer}/jwks"),
        "userinfo_endpoint": format!("{issuer}/userinfo"),
    })
}

/// Serve a discovery document and a single-key JWKS for `kid`.
pub async fn mount_provider(server: &MockServer, kid: &str) {
    Mock::given(method("GET"))
        .and(path("/.well-known/openid-configuration"))
        .respond_with(ResponseTemplate::new(200).set_body_json(discovery_document(&server.uri())))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/jwks"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "keys": [provider_jwk(kid)] })))
        .mount(server)
        .await;
}

fn sign_with(pem: &[u8], kid: &str, claims: &Value) -> String {
    sign_with_alg(Algorithm::RS256, pem, kid, claims)
}

fn sign_with_alg(alg: Algorithm, pem: &[u8], kid: &str, claims: &Value) -> String {
    let mut header = Header::new(alg);
    header.kid = Some(kid.to_string());
    encode(
        &header,
        claims,
        &EncodingKey::from_rsa_pem(pem).expect("rsa pem"),
    )
    .expect("sign")
}

pub fn id_token_claims(issuer: &str, aud: &str, sub: &str) -> Value {
    let now = OffsetDateTime::now_utc().unix_timestamp();
    json!({
        "iss": issuer,
        "sub": sub,
        "aud": aud,
        "iat": now,
        "exp": now + 600,
        "email": format!("{sub}@example.com"),
        "email_verified": true,
        "name": "Test Person",
    })
}

/// ID token signed by the provider fixture key.
pub fn sign_id_token(kid: &str, claims: &Value) -> String {
    sign_with(PROVIDER_KEY_PEM.as_bytes(), kid, claims)
}

/// ID token signed by the provider fixture key with another algorithm.
pub fn sign_id_token_with_alg(alg: Algorithm, kid: &str, claims: &Value) -> String {
    sign_with_alg(alg, PROVIDER_KEY_PEM.as_bytes(), kid, claims)
}

/// ID token signed by a key the provider never published.
pub fn sign_id_token_with_foreign_key(kid: &str, claims: &Value) -> String {
    sign_with(OTHER_KEY_PKCS1_PEM.as_bytes(), kid, claims)
}

/// Payload of a JWT, without any verification.
pub fn jwt_payload(jwt: &str) -> Value {
    let payload = jwt.split('.').nth(1).expect("jwt payload segment");
    let bytes = base64::engine::general_purpose::URL_SAFE_NO_PAD
        .decode(payload)
        .expect("base64url payload");
    serde_json::from_slice(&bytes).expect("json payload")
}
