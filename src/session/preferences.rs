//! Color scheme preference.
//!
//! Resolution on sign-in: profile value, then the mirrored cookie, then the
//! default. Every applied value is mirrored into the cookie so that the next
//! page render can use it before the profile loads.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::{debug, warn};

use crate::core::errors::ChatResult;
use crate::core::ids::IdentityId;
use crate::core::model::{ColorScheme, Preferences, Theme};
use crate::session::cookies::{COLOR_SCHEME_COOKIE, COLOR_SCHEME_MAX_AGE, CookieJar, THEME_COOKIE};
use crate::store::DocumentStore;

/// Pick the first known scheme among profile and cookie values.
#[must_use]
pub fn resolve_scheme(profile: Option<ColorScheme>, cookie: Option<&str>) -> ColorScheme {
    profile
        .or_else(|| cookie.and_then(|raw| raw.parse().ok()))
        .unwrap_or_default()
}

/// Palette actually rendered: AMOLED needs the dark theme and renders as blue otherwise.
#[must_use]
pub fn effective_scheme(scheme: ColorScheme, theme: Theme) -> ColorScheme {
    match (scheme, theme) {
        (ColorScheme::Amoled, Theme::Light) => ColorScheme::Blue,
        _ => scheme,
    }
}

/// Scheme and theme derived from cookies alone.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CookiePreferences {
    /// Stored or default scheme.
    pub color_scheme: ColorScheme,
    /// Stored or default theme.
    pub theme: Theme,
    /// What gets rendered for that combination.
    pub effective_scheme: ColorScheme,
}

impl CookiePreferences {
    /// Read both cookies, ignoring unknown values.
    #[must_use]
    pub fn from_jar(jar: &dyn CookieJar) -> Self {
        let color_scheme = resolve_scheme(None, jar.get(COLOR_SCHEME_COOKIE).as_deref());
        let theme = jar
            .get(THEME_COOKIE)
            .and_then(|raw| raw.parse().ok())
            .unwrap_or_default();
        Self {
            color_scheme,
            theme,
            effective_scheme: effective_scheme(color_scheme, theme),
        }
    }
}

/// Loads and saves the signed-in identity's color scheme.
pub struct PreferenceStore {
    store: Arc<dyn DocumentStore>,
    jar: Arc<dyn CookieJar>,
    scheme: watch::Sender<ColorScheme>,
}

impl PreferenceStore {
    /// Start from the cookie value, or the default.
    #[must_use]
    pub fn new(store: Arc<dyn DocumentStore>, jar: Arc<dyn CookieJar>) -> Self {
        let initial = CookiePreferences::from_jar(jar.as_ref()).color_scheme;
        Self {
            store,
            jar,
            scheme: watch::Sender::new(initial),
        }
    }

    /// Receiver notified when the scheme changes.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<ColorScheme> {
        self.scheme.subscribe()
    }

    /// Applied scheme.
    #[must_use]
    pub fn current(&self) -> ColorScheme {
        *self.scheme.borrow()
    }

    /// Resolve and apply the scheme for a freshly signed-in identity.
    ///
    /// A failed profile read falls back to the cookie.
    pub async fn load(&self, identity: &IdentityId) -> ColorScheme {
        let profile = match self.store.get_identity(identity).await {
            Ok(profile) => profile.and_then(|p| p.preferences.color_scheme),
            Err(err) => {
                warn!(identity = %identity, error = %err, "preference load failed");
                None
            }
        };
        let scheme = resolve_scheme(profile, self.jar.get(COLOR_SCHEME_COOKIE).as_deref());
        debug!(identity = %identity, scheme = %scheme, "color scheme loaded");
        self.apply(scheme);
        scheme
    }

    /// Apply a new scheme immediately and merge it into the profile.
    ///
    /// # Errors
    /// Returns an error if the profile write fails; the scheme stays applied.
    pub async fn set(&self, identity: &IdentityId, scheme: ColorScheme) -> ChatResult<()> {
        self.apply(scheme);
        let update = Preferences {
            color_scheme: Some(scheme),
        };
        self.store.merge_preferences(identity, &update).await
    }

    fn apply(&self, scheme: ColorScheme) {
        self.scheme.send_replace(scheme);
        self.jar
            .set(COLOR_SCHEME_COOKIE, scheme.as_str(), COLOR_SCHEME_MAX_AGE);
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::core::model::Identity;
    use crate::session::cookies::MemoryCookieJar;
    use crate::store::{IdentityStore, SqliteDocumentStore};
    use crate::testing::identity;

    #[test]
    fn test_resolution_order() {
        assert_eq!(resolve_scheme(Some(ColorScheme::Dark), Some("blue")), ColorScheme::Dark);
        assert_eq!(resolve_scheme(None, Some("blue")), ColorScheme::Blue);
        assert_eq!(resolve_scheme(None, Some("neon")), ColorScheme::Lilac);
        assert_eq!(resolve_scheme(None, None), ColorScheme::Lilac);
    }

    #[test]
    fn test_amoled_needs_dark_theme() {
        assert_eq!(effective_scheme(ColorScheme::Amoled, Theme::Light), ColorScheme::Blue);
        assert_eq!(effective_scheme(ColorScheme::Amoled, Theme::Dark), ColorScheme::Amoled);

        let jar = MemoryCookieJar::from_header("colorScheme=amoled; theme=light");
        let prefs = CookiePreferences::from_jar(&jar);
        assert_eq!(prefs.color_scheme, ColorScheme::Amoled);
        assert_eq!(prefs.effective_scheme, ColorScheme::Blue);
    }

    #[tokio::test]
    async fn test_set_merges_and_mirrors_cookie() {
        let store = Arc::new(SqliteDocumentStore::open_in_memory().await.unwrap());
        let me = identity("U1");
        store
            .create_identity(&Identity::from_provider(&me, Utc::now()))
            .await
            .unwrap();
        let jar = Arc::new(MemoryCookieJar::new());
        let prefs = PreferenceStore::new(store.clone(), jar.clone());
        assert_eq!(prefs.current(), ColorScheme::Lilac);

        prefs.set(&me.id, ColorScheme::LightBlue).await.unwrap();
        assert_eq!(prefs.current(), ColorScheme::LightBlue);
        assert_eq!(jar.get(COLOR_SCHEME_COOKIE).as_deref(), Some("lightblue"));

        let profile = store.get_identity(&me.id).await.unwrap().unwrap();
        assert_eq!(profile.preferences.color_scheme, Some(ColorScheme::LightBlue));
        assert_eq!(profile.email, me.email);
    }

    #[tokio::test]
    async fn test_load_prefers_profile_over_cookie() {
        let store = Arc::new(SqliteDocumentStore::open_in_memory().await.unwrap());
        let me = identity("U1");
        store
            .create_identity(&Identity::from_provider(&me, Utc::now()))
            .await
            .unwrap();
        let jar = Arc::new(MemoryCookieJar::from_header("colorScheme=blue"));
        let prefs = PreferenceStore::new(store.clone(), jar.clone());
        assert_eq!(prefs.current(), ColorScheme::Blue);

        assert_eq!(prefs.load(&me.id).await, ColorScheme::Blue);

        store
            .merge_preferences(&me.id, &Preferences { color_scheme: Some(ColorScheme::Dark) })
            .await
            .unwrap();
        assert_eq!(prefs.load(&me.id).await, ColorScheme::Dark);
        assert_eq!(jar.get(COLOR_SCHEME_COOKIE).as_deref(), Some("dark"));
    }
}
