//! Route guard.
//!
//! A pure policy over (where the user is, whether they are signed in):
//!
//! | area        | signed in | redirect        |
//! |-------------|-----------|-----------------|
//! | public      | yes       | landing screen  |
//! | protected   | no        | sign-in screen  |
//! | otherwise   |           | none            |
//!
//! The public area is every route under the `(auth)` group. The guard is
//! edge-triggered: a violation fires once, and re-evaluating the same
//! violation does nothing until the verdict changes.

use serde::Serialize;
use tokio::sync::watch;
use tracing::{debug, info};

use crate::session::Session;

/// First path segment of the public (sign-in / sign-up) screens.
pub const PUBLIC_GROUP: &str = "(auth)";

/// Where the user lands once signed in.
pub const LANDING_PATH: &str = "/(tabs)/home";

/// The sign-in screen.
pub const SIGN_IN_PATH: &str = "/(auth)/login";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Area {
    Public,
    Protected,
}

/// The route currently shown, as path segments.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Location {
    segments: Vec<String>,
}

impl Location {
    /// Parse a route path such as `/(tabs)/feed`.
    #[must_use]
    pub fn from_path(path: &str) -> Self {
        Self {
            segments: path
                .split('/')
                .filter(|segment| !segment.is_empty())
                .map(str::to_string)
                .collect(),
        }
    }

    #[must_use]
    pub fn from_segments<I, S>(segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            segments: segments.into_iter().map(Into::into).collect(),
        }
    }

    #[must_use]
    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    #[must_use]
    pub fn area(&self) -> Area {
        match self.segments.first() {
            Some(first) if first == PUBLIC_GROUP => Area::Public,
            _ => Area::Protected,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Redirect {
    Landing,
    SignIn,
}

impl Redirect {
    #[must_use]
    pub const fn path(self) -> &'static str {
        match self {
            Self::Landing => LANDING_PATH,
            Self::SignIn => SIGN_IN_PATH,
        }
    }
}

/// The policy itself.
#[must_use]
pub const fn decide(area: Area, authenticated: bool) -> Option<Redirect> {
    match (area, authenticated) {
        (Area::Public, true) => Some(Redirect::Landing),
        (Area::Protected, false) => Some(Redirect::SignIn),
        _ => None,
    }
}

/// Performs navigation on behalf of the guard.
pub trait Navigator: Send + Sync {
    /// Replace the current route with `path`.
    fn replace(&self, path: &str);
}

/// Edge-triggered evaluator of [`decide`].
#[derive(Debug, Default)]
pub struct RouteGuard {
    /// Where the previous violation was seen and what it called for.
    last: Option<(Location, Redirect)>,
}

impl RouteGuard {
    #[must_use]
    pub const fn new() -> Self {
        Self { last: None }
    }

    /// Evaluate the policy. Returns a redirect unless the same violation was
    /// already reported for this location.
    pub fn evaluate(&mut self, location: &Location, authenticated: bool) -> Option<Redirect> {
        let verdict = decide(location.area(), authenticated);
        let fire = verdict.filter(|redirect| {
            !matches!(&self.last, Some((seen, last)) if seen == location && last == redirect)
        });
        self.last = verdict.map(|redirect| (location.clone(), redirect));
        fire
    }

    /// React to session and location changes until either source closes.
    ///
    /// Nothing is evaluated while an auth transition is pending.
    pub async fn drive<N: Navigator + ?Sized>(
        &mut self,
        mut session: watch::Receiver<Session>,
        mut location: watch::Receiver<Location>,
        navigator: &N,
    ) {
        loop {
            let current = session.borrow_and_update().clone();
            let here = location.borrow_and_update().clone();

            if current.is_settled() {
                if let Some(redirect) = self.evaluate(&here, current.is_authenticated()) {
                    info!(
                        from = ?here.segments(),
                        to = redirect.path(),
                        "Route guard redirect"
                    );
                    navigator.replace(redirect.path());
                }
            } else {
                debug!(phase = ?current.phase(), "Auth transition pending; guard waiting");
            }

            let changed = tokio::select! {
                changed = session.changed() => changed,
                changed = location.changed() => changed,
            };
            if changed.is_err() {
                debug!("Route guard inputs closed");
                return;
            }
        }
    }
}
