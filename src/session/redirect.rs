//! First-login redirect guard.

use crate::core::ids::IdentityId;
use crate::core::route::Route;

/// Sends a freshly signed-in identity without conversations to the composer.
///
/// Armed only on a signed-out to signed-in transition, evaluated once the
/// first conversation list has loaded, and fires at most once per session.
#[derive(Clone, Debug, Default)]
pub struct FirstLoginRedirect {
    previous: Option<IdentityId>,
    armed: bool,
    fired: bool,
}

impl FirstLoginRedirect {
    /// Record the current identity.
    pub fn observe_identity(&mut self, identity: Option<&IdentityId>) {
        match identity {
            Some(_) if self.previous.is_none() && !self.fired => self.armed = true,
            Some(_) => {}
            None => self.armed = false,
        }
        self.previous = identity.cloned();
    }

    /// Record a loaded conversation count; returns the redirect target when it fires.
    pub fn observe_chats(&mut self, count: usize) -> Option<Route> {
        if !self.armed {
            return None;
        }
        self.armed = false;
        if count > 0 {
            return None;
        }
        self.fired = true;
        Some(Route::Home)
    }

    /// Whether the redirect already happened this session.
    #[must_use]
    pub const fn has_fired(&self) -> bool {
        self.fired
    }
}
