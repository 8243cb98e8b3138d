//! Cache Entry Notifications
//!
//! Writes report every modification twice: once before the value changes
//! (`pre == true`, carrying the old value) and once after (carrying the new one).
//! Both calls happen synchronously on the writing task, in that order.

use dashmap::DashMap;
use serde::Serialize;
use std::sync::Arc;

use crate::container::CacheValue;
use crate::context::InvocationContext;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CacheEntryModifiedEvent {
    pub key: String,
    pub value: Option<CacheValue>,
    pub pre: bool,
    pub origin_local: bool,
}

/// Receiver of entry-modified notifications.
pub trait CacheNotifier: Send + Sync {
    fn notify_cache_entry_modified(
        &self,
        key: &str,
        value: Option<&CacheValue>,
        pre: bool,
        ctx: &InvocationContext,
    );
}

pub type ListenerFn = Arc<dyn Fn(&CacheEntryModifiedEvent) + Send + Sync>;

/// Named listeners invoked for every modification event.
pub struct ListenerRegistry {
    listeners: DashMap<String, ListenerFn>,
}

impl ListenerRegistry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            listeners: DashMap::new(),
        })
    }

    pub fn register<F>(&self, name: &str, listener: F)
    where
        F: Fn(&CacheEntryModifiedEvent) + Send + Sync + 'static,
    {
        self.listeners.insert(name.to_string(), Arc::new(listener));
        tracing::info!("Registered cache listener: {}", name);
    }

    pub fn unregister(&self, name: &str) -> bool {
        self.listeners.remove(name).is_some()
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }
}

impl CacheNotifier for ListenerRegistry {
    fn notify_cache_entry_modified(
        &self,
        key: &str,
        value: Option<&CacheValue>,
        pre: bool,
        ctx: &InvocationContext,
    ) {
        if self.listeners.is_empty() {
            return;
        }

        let event = CacheEntryModifiedEvent {
            key: key.to_string(),
            value: value.cloned(),
            pre,
            origin_local: ctx.is_origin_local(),
        };

        // Listeners may touch the registry, so they run without holding a shard lock.
        let listeners: Vec<ListenerFn> = self
            .listeners
            .iter()
            .map(|entry| entry.value().clone())
            .collect();

        for listener in listeners {
            listener(&event);
        }
    }
}
