//! Authentication backend state and the trait handler states implement.

use std::sync::Arc;

use crate::csrf::CsrfBinder;
use crate::db::Database;
use crate::jwt::TokenCodec;
use crate::settings::AuthSettings;

/// Trait for state types that provide what authentication needs.
pub trait HasAuthBackend {
    fn codec(&self) -> &TokenCodec;
    fn csrf(&self) -> &CsrfBinder;
    fn db(&self) -> &Database;
    fn settings(&self) -> &AuthSettings;
}

/// State for the auth gate middleware.
#[derive(Clone)]
pub struct AuthState {
    pub db: Database,
    pub codec: Arc<TokenCodec>,
    pub csrf: CsrfBinder,
    pub settings: Arc<AuthSettings>,
}

impl AuthState {
    /// Build the codec and CSRF binder from the signing secret and settings.
    pub fn new(db: Database, secret: &[u8], settings: Arc<AuthSettings>) -> Self {
        let codec = Arc::new(TokenCodec::new(secret, &settings));
        let csrf = CsrfBinder::new(codec.clone());
        Self {
            db,
            codec,
            csrf,
            settings,
        }
    }
}

/// Macro to implement `HasAuthBackend` for state structs with the standard fields.
///
/// The struct must have these fields:
/// - `db: Database`
/// - `codec: Arc<TokenCodec>`
/// - `csrf: CsrfBinder`
/// - `settings: Arc<AuthSettings>`
///
/// # Example
/// ```ignore
/// use crate::impl_has_auth_backend;
///
/// #[derive(Clone)]
/// pub struct MyState {
///     pub db: Database,
///     pub codec: Arc<TokenCodec>,
///     pub csrf: CsrfBinder,
///     pub settings: Arc<AuthSettings>,
/// }
///
/// impl_has_auth_backend!(MyState);
/// ```
#[macro_export]
macro_rules! impl_has_auth_backend {
    ($state_type:ty) => {
        impl $crate::auth::HasAuthBackend for $state_type {
            fn codec(&self) -> &$crate::jwt::TokenCodec {
                &self.codec
            }
            fn csrf(&self) -> &$crate::csrf::CsrfBinder {
                &self.csrf
            }
            fn db(&self) -> &$crate::db::Database {
                &self.db
            }
            fn settings(&self) -> &$crate::settings::AuthSettings {
                &self.settings
            }
        }
    };
}

impl_has_auth_backend!(AuthState);
