//! A TTL cache of display names, used only to annotate logs and listings.

use ahash::AHashMap;
use parking_lot::Mutex;
use policy_broker_core::{
    resolve::{IdentifierResolver, Org, Space},
    PolicyTriple,
};
use prometheus_client::{
    encoding::EncodeLabelSet,
    metrics::{counter::Counter, family::Family},
    registry::Registry,
};
use std::sync::Arc;
use tokio::time::{Duration, Instant};
use tracing::debug;

pub const DEFAULT_TTL: Duration = Duration::from_secs(30);

/// Caches application, space and org names.
///
/// Lookups never fail: when the resolver errors, the name is reported as
/// empty and nothing is cached. Entries older than the TTL are treated as
/// absent; [`Names::sweep`] evicts them.
pub struct Names {
    resolver: Arc<dyn IdentifierResolver>,
    ttl: Duration,
    apps: TtlMap<String>,
    spaces: TtlMap<Space>,
    orgs: TtlMap<Org>,
    metrics: NamesMetrics,
}

#[derive(Clone, Debug, Default)]
pub struct NamesMetrics {
    hits: Family<CacheLabels, Counter>,
    misses: Family<CacheLabels, Counter>,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
struct CacheLabels {
    kind: &'static str,
}

#[derive(Debug)]
struct TtlMap<V> {
    kind: &'static str,
    entries: Mutex<AHashMap<String, (V, Instant)>>,
}

// === impl Names ===

impl Names {
    pub fn new(
        resolver: Arc<dyn IdentifierResolver>,
        ttl: Duration,
        metrics: NamesMetrics,
    ) -> Self {
        Self {
            resolver,
            ttl,
            apps: TtlMap::new("app"),
            spaces: TtlMap::new("space"),
            orgs: TtlMap::new("org"),
            metrics,
        }
    }

    /// Returns the application's name, or an empty string if it cannot be
    /// resolved.
    pub async fn app_name(&self, id: &str) -> String {
        if let Some(name) = self.cached(&self.apps, id) {
            return name;
        }
        match self.resolver.get_application_name(id).await {
            Ok(name) => {
                self.apps.insert(id, name.clone());
                name
            }
            Err(error) => {
                debug!(app = %id, %error, "Failed to resolve application name");
                String::new()
            }
        }
    }

    pub async fn space(&self, id: &str) -> Option<Space> {
        if let Some(space) = self.cached(&self.spaces, id) {
            return Some(space);
        }
        match self.resolver.get_space(id).await {
            Ok(space) => {
                self.spaces.insert(id, space.clone());
                Some(space)
            }
            Err(error) => {
                debug!(space = %id, %error, "Failed to resolve space");
                None
            }
        }
    }

    pub async fn org(&self, id: &str) -> Option<Org> {
        if let Some(org) = self.cached(&self.orgs, id) {
            return Some(org);
        }
        match self.resolver.get_org(id).await {
            Ok(org) => {
                self.orgs.insert(id, org.clone());
                Some(org)
            }
            Err(error) => {
                debug!(org = %id, %error, "Failed to resolve org");
                None
            }
        }
    }

    /// Formats a policy with application names in place of ids, where known.
    pub async fn describe(&self, policy: &PolicyTriple) -> String {
        let src = self.app_name(&policy.source).await;
        let dst = self.app_name(&policy.destination).await;
        format!(
            "{} => {}:{}/{}",
            or_id(&src, &policy.source),
            or_id(&dst, &policy.destination),
            policy.port,
            policy.protocol,
        )
    }

    /// Evicts expired entries, returning how many were removed.
    pub fn sweep(&self) -> usize {
        let now = Instant::now();
        self.apps.sweep(now, self.ttl)
            + self.spaces.sweep(now, self.ttl)
            + self.orgs.sweep(now, self.ttl)
    }

    fn cached<V: Clone>(&self, map: &TtlMap<V>, id: &str) -> Option<V> {
        let labels = CacheLabels { kind: map.kind };
        match map.get(id, Instant::now(), self.ttl) {
            Some(v) => {
                self.metrics.hits.get_or_create(&labels).inc();
                Some(v)
            }
            None => {
                self.metrics.misses.get_or_create(&labels).inc();
                None
            }
        }
    }
}

fn or_id<'a>(name: &'a str, id: &'a str) -> &'a str {
    if name.is_empty() {
        id
    } else {
        name
    }
}

// === impl NamesMetrics ===

impl NamesMetrics {
    pub fn register(prom: &mut Registry) -> Self {
        let hits = Family::default();
        prom.register(
            "name_cache_hits",
            "Count of display-name lookups served from the cache",
            hits.clone(),
        );

        let misses = Family::default();
        prom.register(
            "name_cache_misses",
            "Count of display-name lookups sent to the platform",
            misses.clone(),
        );

        Self { hits, misses }
    }

    #[cfg(test)]
    pub(crate) fn hits(&self, kind: &'static str) -> u64 {
        self.hits.get_or_create(&CacheLabels { kind }).get()
    }

    #[cfg(test)]
    pub(crate) fn misses(&self, kind: &'static str) -> u64 {
        self.misses.get_or_create(&CacheLabels { kind }).get()
    }
}

// === impl TtlMap ===

impl<V: Clone> TtlMap<V> {
    fn new(kind: &'static str) -> Self {
        Self {
            kind,
            entries: Mutex::new(AHashMap::new()),
        }
    }

    fn get(&self, id: &str, now: Instant, ttl: Duration) -> Option<V> {
        let entries = self.entries.lock();
        let (value, inserted) = entries.get(id)?;
        if now.saturating_duration_since(*inserted) > ttl {
            return None;
        }
        Some(value.clone())
    }

    fn insert(&self, id: &str, value: V) {
        self.entries
            .lock()
            .insert(id.to_string(), (value, Instant::now()));
    }

    fn sweep(&self, now: Instant, ttl: Duration) -> usize {
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|_, (_, inserted)| now.saturating_duration_since(*inserted) <= ttl);
        before - entries.len()
    }
}
