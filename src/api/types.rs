//! Shared types for the HTTP layer.

use std::sync::Arc;

use crate::directory::DirectoryCache;
use crate::session::{Authenticator, Session};
use crate::store::AnyStore;

/// Shared context for all API routes and middleware.
#[derive(Clone)]
pub struct ApiContext {
    /// Unscoped handle; request handlers go through [`ApiContext::store_for`].
    pub store: Arc<AnyStore>,
    /// The single doctor list every picker reads from.
    pub directory: Arc<DirectoryCache>,
    pub auth: Arc<Authenticator>,
}

impl ApiContext {
    pub fn new(store: AnyStore, directory: Arc<DirectoryCache>, auth: Authenticator) -> Self {
        Self {
            store: Arc::new(store),
            directory,
            auth: Arc::new(auth),
        }
    }

    /// Store handle acting as the session's user.
    pub fn store_for(&self, session: &Session) -> AnyStore {
        match &session.access_token {
            Some(token) => self.store.for_user(token.as_str()),
            None => self.store.as_ref().clone(),
        }
    }

    pub fn backend(&self) -> &'static str {
        match self.store.as_ref() {
            AnyStore::Sqlite(_) => "sqlite",
            AnyStore::Rest(_) => "remote",
        }
    }
}
