use std::sync::Arc;

use tracing::{info, warn};

use crate::api::BackendApi;
use crate::error::ShipperError;
use crate::models::session::{PhoneCredentials, Registration, Session};
use crate::store::LocalStore;
use crate::sync::Synchronizer;

/// Login, registration, restore and logout for the courier account.
pub struct SessionManager {
    store: Arc<LocalStore>,
    sync: Arc<Synchronizer>,
    api: Arc<dyn BackendApi>,
}

impl SessionManager {
    pub fn new(store: Arc<LocalStore>, sync: Arc<Synchronizer>, api: Arc<dyn BackendApi>) -> Self {
        Self { store, sync, api }
    }

    pub fn current(&self) -> Option<Session> {
        self.store.session()
    }

    pub async fn login_phone(
        &self,
        phone: &str,
        password: &str,
    ) -> Result<Session, ShipperError> {
        let credentials = PhoneCredentials {
            phone: normalize_phone(phone)?,
            password: password.to_string(),
        };
        if credentials.password.is_empty() {
            return Err(ShipperError::Validation("Password is required".to_string()));
        }

        let session = self.api.login_phone(&credentials).await?;
        self.establish(session).await
    }

    pub async fn register_phone(
        &self,
        registration: Registration,
    ) -> Result<Session, ShipperError> {
        let registration = Registration {
            phone: normalize_phone(&registration.phone)?,
            ..registration
        };
        if registration.password.len() < 6 {
            return Err(ShipperError::Validation(
                "Password must be at least 6 characters".to_string(),
            ));
        }
        if registration.name.trim().is_empty() {
            return Err(ShipperError::Validation("Name is required".to_string()));
        }

        let session = self.api.register_phone(&registration).await?;
        self.establish(session).await
    }

    /// Re-arms the REST client with a persisted session, if there is one.
    pub fn restore(&self) -> Option<Session> {
        let session = self.store.session()?;
        self.api.set_token(Some(session.token.clone()));
        info!(shipper_id = session.shipper_id(), "session restored");
        Some(session)
    }

    /// Ends the session. The backend call is best effort; local state is
    /// cleared regardless of its outcome.
    pub async fn logout(&self) -> Result<(), ShipperError> {
        if self.store.session().is_some() {
            if let Err(err) = self.api.logout().await {
                warn!(error = %err, "backend logout failed; clearing local session anyway");
            }
        }
        self.clear().await
    }

    /// Drops the session after the backend rejected the token.
    pub async fn expire(&self) -> Result<(), ShipperError> {
        warn!("session expired; clearing local state");
        self.clear().await
    }

    async fn establish(&self, session: Session) -> Result<Session, ShipperError> {
        if session.token.is_empty() {
            return Err(ShipperError::Decode("login response without a token".to_string()));
        }

        self.api.set_token(Some(session.token.clone()));
        self.store.set_session(Some(session.clone())).persisted().await?;
        info!(shipper_id = session.shipper_id(), "logged in");
        Ok(session)
    }

    async fn clear(&self) -> Result<(), ShipperError> {
        self.sync.reset();
        self.api.set_token(None);
        self.store.clear().persisted().await?;
        info!("session cleared");
        Ok(())
    }
}

/// Accepts local (`0xxxxxxxxx`) and international (`+84xxxxxxxxx`) forms and
/// returns the local one.
pub fn normalize_phone(raw: &str) -> Result<String, ShipperError> {
    let compact: String = raw
        .chars()
        .filter(|c| !c.is_whitespace() && !matches!(c, '-' | '.'))
        .collect();
    let local = match compact.strip_prefix("+84") {
        Some(rest) => format!("0{rest}"),
        None => compact,
    };

    let valid = local.len() == 10
        && local.starts_with('0')
        && local.chars().all(|c| c.is_ascii_digit());
    if !valid {
        return Err(ShipperError::Validation(format!(
            "'{}' is not a valid phone number",
            raw.trim()
        )));
    }
    Ok(local)
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;

    use super::{normalize_phone, SessionManager};
    use crate::engine::testing::{harness, Harness, SHIPPER_ID};
    use crate::error::ShipperError;
    use crate::models::order::OrderStatus;
    use crate::models::session::Registration;
    use crate::store::backend::Namespace;
    use crate::sync::ConnectionState;

    fn manager(h: &Harness) -> SessionManager {
        SessionManager::new(h.store.clone(), h.sync.clone(), h.api.clone())
    }

    #[test]
    fn phone_numbers_are_normalized() {
        assert_eq!(normalize_phone("090 123 4567").unwrap(), "0901234567");
        assert_eq!(normalize_phone("+84901234567").unwrap(), "0901234567");
        assert!(normalize_phone("12345").is_err());
    }

    #[tokio::test]
    async fn login_persists_session_and_arms_token() {
        let h = harness().await;
        h.store.set_session(None).persisted().await.unwrap();
        let sessions = manager(&h);

        let session = sessions.login_phone("0901234567", "secret123").await.unwrap();

        assert_eq!(session.shipper_id(), SHIPPER_ID);
        assert_eq!(h.store.token().as_deref(), Some("jwt-shipper-42"));
        assert_eq!(
            h.api.token.lock().unwrap().as_deref(),
            Some("jwt-shipper-42")
        );
        assert!(h.backend.raw(Namespace::Auth).is_some());
    }

    #[tokio::test]
    async fn wrong_password_surfaces_backend_message() {
        let h = harness().await;
        h.store.set_session(None);
        let sessions = manager(&h);

        let err = sessions.login_phone("0901234567", "nope").await.unwrap_err();
        assert_eq!(err.user_message(), "Wrong phone number or password");
        assert!(sessions.current().is_none());
    }

    #[tokio::test]
    async fn registration_is_validated_before_the_network() {
        let h = harness().await;
        let sessions = manager(&h);

        let err = sessions
            .register_phone(Registration {
                phone: "0901234567".to_string(),
                password: "123".to_string(),
                name: "Lan".to_string(),
                email: None,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, ShipperError::Validation(_)));

        let session = sessions
            .register_phone(Registration {
                phone: "+84911222333".to_string(),
                password: "secret123".to_string(),
                name: "Lan".to_string(),
                email: None,
            })
            .await
            .unwrap();
        assert_eq!(session.account.phone, "0911222333");
    }

    #[tokio::test]
    async fn logout_clears_everything_even_when_backend_fails() {
        let h = harness().await;
        h.store.set_current_order(Some(
            crate::engine::testing::assigned_order("ord-1", OrderStatus::PickedUp),
        ));
        let _subscription = h.sync.subscribe("walletBalance", |_| {});
        let sessions = manager(&h);

        sessions.logout().await.unwrap();

        assert_eq!(h.api.logout_calls.load(Ordering::SeqCst), 1);
        assert!(h.store.session().is_none());
        assert!(h.store.current_order().is_none());
        assert!(h.store.all_orders().is_empty());
        assert!(h.backend.raw(Namespace::Auth).is_none());
        assert!(h.backend.raw(Namespace::Orders).is_none());
        assert_eq!(h.sync.subscription_count(), 0);
        assert_eq!(h.sync.state(), ConnectionState::Disconnected);
        assert!(h.api.token.lock().unwrap().is_none());
    }

    #[tokio::test]
    async fn restore_rearms_persisted_token() {
        let h = harness().await;
        let sessions = manager(&h);

        let session = sessions.restore().unwrap();
        assert_eq!(session.shipper_id(), SHIPPER_ID);
        assert_eq!(
            h.api.token.lock().unwrap().as_deref(),
            Some("jwt-shipper-42")
        );
    }
}
