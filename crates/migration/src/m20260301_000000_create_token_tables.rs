//! Tables for the token lifecycle.
//!
//! - auth_code: single-use authorization codes, keyed by SHA3-256 hash
//! - refresh_token: refresh tokens, keyed by SHA3-256 hash
//! - identity: native and external identities, unique per (external_id,
//!   issuer) and, for native identities, per (email, issuer)

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Identity::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Identity::Id)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Identity::Email).string().null())
                    .col(
                        ColumnDef::new(Identity::EmailVerified)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(ColumnDef::new(Identity::Password).string().null())
                    .col(ColumnDef::new(Identity::ExternalId).string().null())
                    .col(ColumnDef::new(Identity::Issuer).string().null())
                    .col(ColumnDef::new(Identity::Name).string().null())
                    .col(ColumnDef::new(Identity::GivenName).string().null())
                    .col(ColumnDef::new(Identity::FamilyName).string().null())
                    .col(ColumnDef::new(Identity::Picture).text().null())
                    .col(
                        ColumnDef::new(Identity::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Identity::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(AuthCode::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(AuthCode::CodeHash)
                            .string_len(64)
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(AuthCode::IdentityId).string().not_null())
                    .col(ColumnDef::new(AuthCode::CodeChallenge).string().null())
                    .col(ColumnDef::new(AuthCode::CodeChallengeMethod).string().null())
                    .col(ColumnDef::new(AuthCode::Resource).text().null())
                    .col(
                        ColumnDef::new(AuthCode::ExpiresAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(AuthCode::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(RefreshToken::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(RefreshToken::TokenHash)
                            .string_len(64)
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(RefreshToken::IdentityId).string().not_null())
                    .col(
                        ColumnDef::new(RefreshToken::ExpiresAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(RefreshToken::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_identity_email_issuer")
                    .table(Identity::Table)
                    .col(Identity::Email)
                    .col(Identity::Issuer)
                    .to_owned(),
            )
            .await?;

        // One native (password) identity per email and issuer. Partial, so
        // external identities may still share an email.
        manager
            .get_connection()
            .execute_unprepared(
                "CREATE UNIQUE INDEX IF NOT EXISTS idx_identity_native_email_issuer \
                 ON identity (email, issuer) WHERE password IS NOT NULL",
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_identity_external_id_issuer")
                    .table(Identity::Table)
                    .col(Identity::ExternalId)
                    .col(Identity::Issuer)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_refresh_token_identity_id")
                    .table(RefreshToken::Table)
                    .col(RefreshToken::IdentityId)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(Index::drop().name("idx_refresh_token_identity_id").to_owned())
            .await?;
        manager
            .drop_index(
                Index::drop()
                    .name("idx_identity_external_id_issuer")
                    .to_owned(),
            )
            .await?;
        manager
            .drop_index(
                Index::drop()
                    .name("idx_identity_native_email_issuer")
                    .to_owned(),
            )
            .await?;
        manager
            .drop_index(Index::drop().name("idx_identity_email_issuer").to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(RefreshToken::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(AuthCode::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Identity::Table).to_owned())
            .await?;
        Ok(())
    }
}

#[derive(DeriveIden)]
enum Identity {
    Table,
    Id,
    Email,
    EmailVerified,
    Password,
    ExternalId,
    Issuer,
    Name,
    GivenName,
    FamilyName,
    Picture,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum AuthCode {
    Table,
    CodeHash,
    IdentityId,
    CodeChallenge,
    CodeChallengeMethod,
    Resource,
    ExpiresAt,
    CreatedAt,
}

#[derive(DeriveIden)]
enum RefreshToken {
    Table,
    TokenHash,
    IdentityId,
    ExpiresAt,
    CreatedAt,
}
