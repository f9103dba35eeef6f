//! Session holder: the signed-in user id, or none.
//!
//! Whatever authenticates the user pushes sign-in/sign-out here; the
//! dashboard only ever reads it.

use tokio::sync::watch;

#[derive(Debug)]
pub struct Session {
    user: watch::Sender<Option<String>>,
}

impl Default for Session {
    fn default() -> Self {
        Self {
            user: watch::Sender::new(None),
        }
    }
}

impl Session {
    pub fn signed_out() -> Self {
        Self::default()
    }

    pub fn signed_in(user_id: impl Into<String>) -> Self {
        let s = Self::default();
        s.sign_in(user_id);
        s
    }

    pub fn current_user(&self) -> Option<String> {
        self.user.borrow().clone()
    }

    pub fn sign_in(&self, user_id: impl Into<String>) {
        let user_id = user_id.into();
        log::debug!("session: signed in as {user_id}");
        self.user.send_replace(Some(user_id));
    }

    pub fn sign_out(&self) {
        if self.user.send_replace(None).is_some() {
            log::debug!("session: signed out");
        }
    }

    pub fn watch(&self) -> watch::Receiver<Option<String>> {
        self.user.subscribe()
    }
}
