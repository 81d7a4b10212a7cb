// SPDX-License-Identifier: LGPL-2.1-or-later
// Copyright (C) 2025 Shahzad A. Bhatti <bhatti@plexobject.com>
//
// This file is part of KVPool.
//
// KVPool is free software: you can redistribute it and/or modify
// it under the terms of the GNU Lesser General Public License as published by
// the Free Software Foundation, either version 2.1 of the License, or
// (at your option) any later version.
//
// KVPool is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Lesser General Public License for more details.
//
// You should have received a copy of the GNU Lesser General Public License
// along with KVPool. If not, see <https://www.gnu.org/licenses/>.

//! Process lifecycle plumbing.
//!
//! ## Purpose
//! Small host-runtime surface the pool supervisor plugs into:
//! - [`RuntimeEvents`]: process-wide notifier. Listeners subscribe and
//!   unsubscribe explicitly, so a listener can remove itself from inside
//!   its own callback.
//! - [`Component`] and [`StartupSequence`]: components started in ascending
//!   order, where a component may place itself relative to another one.
//! - [`StartContext`]: what a starting component gets to see.
//!
//! ## Shutdown
//! [`RuntimeEvents::listen_for_signals`] turns SIGTERM / Ctrl-C into a
//! [`RuntimeEvent::AboutToStop`] notification.

use crate::pool::lock;
use crate::{BundleResources, ResourceLocator, StoreResult};
use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Startup order of a component that does not ask for one.
pub const DEFAULT_STARTUP_ORDER: i32 = 1000;

/// Runtime phase changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RuntimeEvent {
    /// Components are about to be started
    AboutToStart,
    /// All components started
    Started,
    /// Process is going down; release external resources now
    AboutToStop,
    /// Shutdown finished
    Stopped,
}

/// Subscription id returned by [`RuntimeEvents::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(u64);

/// Receives runtime events.
#[async_trait]
pub trait RuntimeListener: Send + Sync {
    /// Called once per notified event. `id` is this listener's subscription.
    async fn handle_event(&self, events: &RuntimeEvents, id: ListenerId, event: RuntimeEvent);
}

type Subscriptions = Vec<(ListenerId, Arc<dyn RuntimeListener>)>;

/// Process-wide runtime event notifier.
#[derive(Default)]
pub struct RuntimeEvents {
    listeners: Mutex<Subscriptions>,
    next_id: AtomicU64,
}

impl RuntimeEvents {
    /// Notifier with no listeners.
    pub fn new() -> Self {
        Self::default()
    }

    fn listeners(&self) -> MutexGuard<'_, Subscriptions> {
        lock(&self.listeners)
    }

    /// Add a listener.
    pub fn subscribe(&self, listener: Arc<dyn RuntimeListener>) -> ListenerId {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::SeqCst));
        self.listeners().push((id, listener));
        id
    }

    /// Remove a listener. Returns whether it was subscribed.
    pub fn unsubscribe(&self, id: ListenerId) -> bool {
        let mut listeners = self.listeners();
        let before = listeners.len();
        listeners.retain(|(candidate, _)| *candidate != id);
        listeners.len() != before
    }

    /// Number of subscribed listeners.
    pub fn listener_count(&self) -> usize {
        self.listeners().len()
    }

    /// Deliver `event` to every listener subscribed when the call started,
    /// in subscription order.
    pub async fn notify(&self, event: RuntimeEvent) {
        let snapshot: Subscriptions = self.listeners().clone();
        debug!(?event, listeners = snapshot.len(), "Notifying runtime listeners");
        for (id, listener) in snapshot {
            listener.handle_event(self, id, event).await;
        }
    }

    /// Spawn a task that notifies [`RuntimeEvent::AboutToStop`] on SIGTERM
    /// or Ctrl-C.
    pub fn listen_for_signals(self: &Arc<Self>) -> JoinHandle<()> {
        let events = self.clone();
        tokio::spawn(async move {
            wait_for_shutdown_signal().await;
            events.notify(RuntimeEvent::AboutToStop).await;
        })
    }
}

#[cfg(unix)]
async fn wait_for_shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = match signal(SignalKind::terminate()) {
        Ok(sigterm) => sigterm,
        Err(e) => {
            warn!(error = %e, "Cannot install SIGTERM handler, waiting for Ctrl-C only");
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(error = %e, "Cannot listen for Ctrl-C");
            }
            return;
        }
    };

    tokio::select! {
        _ = sigterm.recv() => info!("Received SIGTERM, shutting down"),
        _ = tokio::signal::ctrl_c() => info!("Received Ctrl-C, shutting down"),
    }
}

#[cfg(not(unix))]
async fn wait_for_shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Received Ctrl-C, shutting down"),
        Err(e) => warn!(error = %e, "Cannot listen for Ctrl-C"),
    }
}

/// What a component sees while starting.
#[derive(Clone)]
pub struct StartContext {
    events: Arc<RuntimeEvents>,
    resources: Arc<dyn ResourceLocator>,
}

impl StartContext {
    /// Context with the given notifier and resource locator.
    pub fn new(events: Arc<RuntimeEvents>, resources: Arc<dyn ResourceLocator>) -> Self {
        Self { events, resources }
    }

    /// Context whose resources are the scripts shipped with this crate.
    pub fn with_builtin_scripts(events: Arc<RuntimeEvents>) -> Self {
        Self::new(events, Arc::new(BundleResources::builtin()))
    }

    /// Runtime event notifier.
    pub fn events(&self) -> &Arc<RuntimeEvents> {
        &self.events
    }

    /// Resource locator.
    pub fn resources(&self) -> &Arc<dyn ResourceLocator> {
        &self.resources
    }
}

/// A startable part of the process.
#[async_trait]
pub trait Component: Send + Sync {
    /// Unique component name.
    fn name(&self) -> &str;

    /// Position in the startup sequence, lower starts first.
    fn startup_order(&self, _sequence: &StartupSequence) -> i32 {
        DEFAULT_STARTUP_ORDER
    }

    /// Start the component.
    async fn start_component(self: Arc<Self>, ctx: &StartContext) -> StoreResult<()>;
}

/// Ordered set of components.
#[derive(Default)]
pub struct StartupSequence {
    components: Vec<Arc<dyn Component>>,
}

impl StartupSequence {
    /// Empty sequence.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a component.
    pub fn register(&mut self, component: Arc<dyn Component>) {
        self.components.push(component);
    }

    /// Startup order of the component called `name`, if registered.
    pub fn order_of(&self, name: &str) -> Option<i32> {
        self.components
            .iter()
            .find(|c| c.name() == name)
            .map(|c| c.startup_order(self))
    }

    /// Start every component in ascending order, stopping at the first
    /// failure. Components with equal order start in registration order.
    ///
    /// Returns the names in the order they were started.
    pub async fn start_all(&self, ctx: &StartContext) -> StoreResult<Vec<String>> {
        ctx.events().notify(RuntimeEvent::AboutToStart).await;

        let mut ordered: Vec<(i32, Arc<dyn Component>)> = self
            .components
            .iter()
            .map(|c| (c.startup_order(self), c.clone()))
            .collect();
        ordered.sort_by_key(|(order, _)| *order);

        let mut started = Vec::with_capacity(ordered.len());
        for (order, component) in ordered {
            let name = component.name().to_string();
            debug!(component = %name, order, "Starting component");
            component.start_component(ctx).await?;
            started.push(name);
        }

        ctx.events().notify(RuntimeEvent::Started).await;
        Ok(started)
    }

    /// Run the shutdown notifications.
    pub async fn shutdown(&self, events: &RuntimeEvents) {
        events.notify(RuntimeEvent::AboutToStop).await;
        events.notify(RuntimeEvent::Stopped).await;
    }
}
