//! Authorization code entity - short-lived, single-use codes exchanged for tokens.
//!
//! Only the SHA3-256 hash of the code is stored; consumption deletes the row.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "auth_code")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub code_hash: String,
    pub identity_id: String,
    /// PKCE code challenge (native provider only)
    pub code_challenge: Option<String>,
    /// PKCE code challenge method, always S256 when present
    pub code_challenge_method: Option<String>,
    /// Resource indicator the resulting access token is scoped to
    pub resource: Option<String>,
    pub expires_at: OffsetDateTime,
    pub created_at: OffsetDateTime,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
