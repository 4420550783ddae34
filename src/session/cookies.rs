//! Cookie jar abstraction and the intro animation flag.

use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use dashmap::DashMap;

use crate::core::route::Route;

/// Mirror of the chosen color scheme, read before the profile loads.
pub const COLOR_SCHEME_COOKIE: &str = "colorScheme";
/// Light/dark theme key.
pub const THEME_COOKIE: &str = "theme";
/// Set once the intro animation played.
pub const INTRO_COOKIE: &str = "uncorp_load_shown";

/// Lifetime of the color scheme cookie.
pub const COLOR_SCHEME_MAX_AGE: Duration = Duration::from_secs(365 * 24 * 60 * 60);
/// Lifetime of the intro flag.
pub const INTRO_MAX_AGE: Duration = Duration::from_secs(30 * 60);

/// Name/value cookie storage with expiry.
pub trait CookieJar: Send + Sync {
    /// Value of an unexpired cookie.
    fn get(&self, name: &str) -> Option<String>;

    /// Store a cookie for `max_age`.
    fn set(&self, name: &str, value: &str, max_age: Duration);

    /// Drop a cookie.
    fn remove(&self, name: &str);
}

#[derive(Clone, Debug)]
struct StoredCookie {
    value: String,
    expires_at: Option<DateTime<Utc>>,
}

/// In-process cookie jar.
#[derive(Debug, Default)]
pub struct MemoryCookieJar {
    cookies: DashMap<String, StoredCookie>,
}

impl MemoryCookieJar {
    /// Empty jar.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Jar holding the cookies of a request `Cookie` header, without expiry.
    #[must_use]
    pub fn from_header(header: &str) -> Self {
        let jar = Self::new();
        for (name, value) in parse_cookie_header(header) {
            jar.cookies.insert(
                name,
                StoredCookie {
                    value,
                    expires_at: None,
                },
            );
        }
        jar
    }

    /// [`CookieJar::get`] evaluated at `now`.
    #[must_use]
    pub fn get_at(&self, name: &str, now: DateTime<Utc>) -> Option<String> {
        let cookie = self.cookies.get(name)?;
        match cookie.expires_at {
            Some(expires_at) if expires_at <= now => None,
            _ => Some(cookie.value.clone()),
        }
    }

    /// [`CookieJar::set`] evaluated at `now`.
    pub fn set_at(&self, name: &str, value: &str, max_age: Duration, now: DateTime<Utc>) {
        let expires_at = TimeDelta::from_std(max_age)
            .ok()
            .and_then(|age| now.checked_add_signed(age));
        self.cookies.insert(
            name.to_string(),
            StoredCookie {
                value: value.to_string(),
                expires_at,
            },
        );
    }
}

impl CookieJar for MemoryCookieJar {
    fn get(&self, name: &str) -> Option<String> {
        self.get_at(name, Utc::now())
    }

    fn set(&self, name: &str, value: &str, max_age: Duration) {
        self.set_at(name, value, max_age, Utc::now());
    }

    fn remove(&self, name: &str) {
        self.cookies.remove(name);
    }
}

/// Split a `Cookie` request header into name/value pairs.
#[must_use]
pub fn parse_cookie_header(header: &str) -> Vec<(String, String)> {
    header
        .split(';')
        .filter_map(|pair| {
            let (name, value) = pair.split_once('=')?;
            let name = name.trim();
            if name.is_empty() {
                return None;
            }
            Some((name.to_string(), value.trim().trim_matches('"').to_string()))
        })
        .collect()
}

/// Decides whether the intro animation plays.
pub struct IntroOverlay<'a> {
    jar: &'a dyn CookieJar,
}

impl<'a> IntroOverlay<'a> {
    /// Overlay backed by `jar`.
    #[must_use]
    pub const fn new(jar: &'a dyn CookieJar) -> Self {
        Self { jar }
    }

    /// Show it for a signed-in identity on a chat page when the flag is absent,
    /// and set the flag. Returns whether it should play.
    pub fn take(&self, signed_in: bool, route: &Route) -> bool {
        if !signed_in || !route.is_chat_page() || self.jar.get(INTRO_COOKIE).is_some() {
            return false;
        }
        self.jar.set(INTRO_COOKIE, "1", INTRO_MAX_AGE);
        true
    }
}
