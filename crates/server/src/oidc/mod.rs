//! Relying-party side of OpenID Connect: discovery, ID token verification
//! and the browser redirect flow against external providers.

pub mod claims;
pub mod discovery;
pub mod relying_party;
pub mod verifier;

pub use claims::{Audience, IdTokenClaims};
pub use discovery::{Discovery, ProviderMetadata};
pub use relying_party::RelyingParty;
pub use verifier::{IdToken, IdVerifier};
