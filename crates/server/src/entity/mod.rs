//! SeaORM entities owned by the token service.

pub mod auth_code;
pub mod identity;
pub mod refresh_token;
