//! Kord registry: ordered collection of apps with identity-collision detection.
//!
//! Storage is an immutable snapshot behind an [`ArcSwap`]. Registration is a
//! read-copy-update append, so readers (dispatch workers calling [`Registry::all`]
//! or [`Registry::find`]) never block and never observe a half-written sequence.

#![forbid(unsafe_code)]

use std::fmt;
use std::sync::Arc;

use arc_swap::ArcSwap;
use kord_core::{App, AppId, Error, Result};
use metrics::{counter, gauge};
use rustc_hash::FxHashMap;
use tracing::{debug, warn};

#[derive(Default)]
struct Snapshot {
    apps: Vec<Arc<dyn App>>,
    index: FxHashMap<AppId, usize>,
}

impl Snapshot {
    fn appended(&self, app: Arc<dyn App>) -> Self {
        let mut apps = Vec::with_capacity(self.apps.len() + 1);
        apps.extend(self.apps.iter().cloned());
        let mut index = self.index.clone();
        index.insert(app.meta().id().clone(), apps.len());
        apps.push(app);
        Self { apps, index }
    }
}

/// Append-only, identity-unique app registry. Iteration order is registration order.
pub struct Registry {
    snap: ArcSwap<Snapshot>,
}

impl Default for Registry {
    fn default() -> Self { Self::new() }
}

impl Registry {
    pub fn new() -> Self {
        Self { snap: ArcSwap::from_pointee(Snapshot::default()) }
    }

    pub fn register<A: App + 'static>(&self, app: A) -> Result<usize> {
        self.register_arc(Arc::new(app))
    }

    /// Append `app` and return its position in registration order, failing
    /// with [`Error::DuplicateIdentity`] if its `(namespace, name)` is already
    /// present. A rejected app is never visible.
    pub fn register_arc(&self, app: Arc<dyn App>) -> Result<usize> {
        let id = app.meta().id().clone();
        let mut position = None;
        // rcu may retry the closure; the last run is the one that is stored
        self.snap.rcu(|cur| {
            if cur.index.contains_key(&id) {
                position = None;
                Arc::clone(cur)
            } else {
                position = Some(cur.apps.len());
                Arc::new(cur.appended(Arc::clone(&app)))
            }
        });
        let Some(position) = position else {
            counter!("registry_duplicate_total", 1u64);
            warn!(app = %id, "duplicate app identity rejected");
            return Err(Error::DuplicateIdentity(id));
        };
        gauge!("registry_apps", (position + 1) as f64);
        debug!(app = %id, position, "app registered");
        Ok(position)
    }

    /// View of every app registered so far, in registration order.
    pub fn all(&self) -> Apps {
        Apps { snap: self.snap.load_full() }
    }

    pub fn get(&self, id: &AppId) -> Option<Arc<dyn App>> {
        let snap = self.snap.load();
        snap.index.get(id).map(|&i| Arc::clone(&snap.apps[i]))
    }

    pub fn find(&self, namespace: &str, name: &str) -> Result<Arc<dyn App>> {
        let id = AppId::new(namespace, name);
        self.get(&id).ok_or(Error::NotFound(id))
    }

    pub fn len(&self) -> usize { self.snap.load().apps.len() }
    pub fn is_empty(&self) -> bool { self.len() == 0 }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry").field("apps", &self.all().ids().collect::<Vec<_>>()).finish()
    }
}

/// Immutable, restartable view over the registry at the time [`Registry::all`] was called.
#[derive(Clone)]
pub struct Apps {
    snap: Arc<Snapshot>,
}

impl Apps {
    pub fn iter(&self) -> std::slice::Iter<'_, Arc<dyn App>> { self.snap.apps.iter() }
    pub fn ids(&self) -> impl Iterator<Item = &AppId> + '_ { self.iter().map(|a| a.meta().id()) }
    pub fn len(&self) -> usize { self.snap.apps.len() }
    pub fn is_empty(&self) -> bool { self.snap.apps.is_empty() }
}

impl<'a> IntoIterator for &'a Apps {
    type Item = &'a Arc<dyn App>;
    type IntoIter = std::slice::Iter<'a, Arc<dyn App>>;
    fn into_iter(self) -> Self::IntoIter { self.iter() }
}
