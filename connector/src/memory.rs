//! In-memory connections.
//!
//! Accounts are registered under their API endpoint; connecting to an
//! unregistered endpoint yields a connection whose access probe fails. Used
//! by tests and by hosts replaying recorded data.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use pryv_wdc::{AccessInfo, Event, Filter, Stream};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::connection::{Connection, ConnectionFactory, EventDelivery};
use crate::descriptor::ConnectionDescriptor;

/// Data and failure modes of one in-memory account.
#[derive(Debug, Default)]
pub struct MemoryAccount {
    access: Option<AccessInfo>,
    access_error: Option<String>,
    events: Vec<Event>,
    events_error: Option<String>,
    /// Events handed over before `events_error` fires in streamed delivery
    events_before_error: usize,
    streams: Vec<Stream>,
    streams_error: Option<String>,
    delivery: EventDelivery,
    probes: AtomicUsize,
}

impl MemoryAccount {
    pub fn new(access_id: &str) -> Self {
        Self {
            access: Some(AccessInfo {
                id: Some(access_id.to_string()),
                name: None,
                access_type: None,
            }),
            ..Self::default()
        }
    }

    /// Account whose access probe fails with `message`.
    pub fn invalid(message: &str) -> Self {
        Self {
            access_error: Some(message.to_string()),
            ..Self::default()
        }
    }

    pub fn with_access_name(mut self, name: &str) -> Self {
        if let Some(access) = self.access.as_mut() {
            access.name = Some(name.to_string());
        }
        self
    }

    pub fn with_events(mut self, events: Vec<Event>) -> Self {
        self.events = events;
        self
    }

    pub fn with_streams(mut self, streams: Vec<Stream>) -> Self {
        self.streams = streams;
        self
    }

    pub fn with_delivery(mut self, delivery: EventDelivery) -> Self {
        self.delivery = delivery;
        self
    }

    /// Event fetches fail; streamed delivery first hands over `delivered_first` events.
    pub fn failing_events(mut self, message: &str, delivered_first: usize) -> Self {
        self.events_error = Some(message.to_string());
        self.events_before_error = delivered_first;
        self
    }

    pub fn failing_streams(mut self, message: &str) -> Self {
        self.streams_error = Some(message.to_string());
        self
    }

    /// Number of access probes received so far.
    pub fn probes(&self) -> usize {
        self.probes.load(Ordering::SeqCst)
    }

    fn matching_events(&self, filter: &Filter) -> Vec<Event> {
        let from = filter.from_time as f64;
        let to = filter.to_time as f64;
        let matching = self.events.iter().filter(|e| {
            e.time >= from
                && e.time <= to
                && filter
                    .types
                    .as_ref()
                    .map_or(true, |types| types.contains(&e.event_type))
        });
        match filter.limit {
            Some(limit) => matching.take(limit as usize).cloned().collect(),
            None => matching.cloned().collect(),
        }
    }
}

/// Connection to a [`MemoryAccount`].
pub struct MemoryConnection {
    account: Option<Arc<MemoryAccount>>,
}

impl MemoryConnection {
    fn account(&self) -> Result<&MemoryAccount> {
        self.account
            .as_deref()
            .ok_or_else(|| anyhow!("Unknown endpoint"))
    }
}

#[async_trait]
impl Connection for MemoryConnection {
    fn delivery(&self) -> EventDelivery {
        self.account
            .as_ref()
            .map(|a| a.delivery)
            .unwrap_or_default()
    }

    async fn access_info(&self) -> Result<AccessInfo> {
        let account = self.account()?;
        account.probes.fetch_add(1, Ordering::SeqCst);
        if let Some(message) = &account.access_error {
            return Err(anyhow!("{}", message));
        }
        account
            .access
            .clone()
            .ok_or_else(|| anyhow!("No access information"))
    }

    async fn get_events(&self, filter: &Filter) -> Result<Vec<Event>> {
        let account = self.account()?;
        if let Some(message) = &account.events_error {
            return Err(anyhow!("{}", message));
        }
        Ok(account.matching_events(filter))
    }

    async fn stream_events(
        &self,
        filter: &Filter,
        on_event: &mut (dyn FnMut(Event) + Send),
    ) -> Result<usize> {
        let account = self.account()?;
        let events = account.matching_events(filter);
        if let Some(message) = &account.events_error {
            for event in events.into_iter().take(account.events_before_error) {
                on_event(event);
            }
            return Err(anyhow!("{}", message));
        }
        let count = events.len();
        for event in events {
            on_event(event);
        }
        Ok(count)
    }

    async fn get_streams(&self) -> Result<Vec<Stream>> {
        let account = self.account()?;
        if let Some(message) = &account.streams_error {
            return Err(anyhow!("{}", message));
        }
        Ok(account.streams.clone())
    }
}

/// Factory over a fixed set of in-memory accounts.
#[derive(Default)]
pub struct MemoryConnectionFactory {
    accounts: HashMap<String, Arc<MemoryAccount>>,
    connects: AtomicUsize,
}

impl MemoryConnectionFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `account` under `api_endpoint` (normalized like a descriptor).
    pub fn with_account(mut self, api_endpoint: &str, account: MemoryAccount) -> Self {
        let key = ConnectionDescriptor::parse(api_endpoint)
            .map(|d| d.api_endpoint().to_string())
            .unwrap_or_else(|_| api_endpoint.to_string());
        self.accounts.insert(key, Arc::new(account));
        self
    }

    pub fn account(&self, api_endpoint: &str) -> Option<&MemoryAccount> {
        let key = ConnectionDescriptor::parse(api_endpoint)
            .map(|d| d.api_endpoint().to_string())
            .unwrap_or_else(|_| api_endpoint.to_string());
        self.accounts.get(&key).map(Arc::as_ref)
    }

    /// Number of connections built so far.
    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }
}

impl ConnectionFactory for MemoryConnectionFactory {
    fn connect(&self, descriptor: &ConnectionDescriptor) -> Result<Box<dyn Connection>> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MemoryConnection {
            account: self.accounts.get(descriptor.api_endpoint()).cloned(),
        }))
    }
}
