//! Bearer token authentication backed by an external identity provider.

mod identity;
mod middleware;

pub use identity::{IdentityProvider, StaticIdentityProvider, SupabaseIdentityProvider};
pub use middleware::auth_guard;
