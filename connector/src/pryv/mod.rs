pub mod api;
pub mod auth;
pub mod reader;
pub mod service_info;

use crate::connection::{Connection, ConnectionFactory, EventDelivery};
use crate::descriptor::ConnectionDescriptor;
use anyhow::Result;
use async_trait::async_trait;
use pryv_wdc::{AccessInfo, Event, Filter, Stream};

use self::api::PryvClient;

pub use self::auth::{AccessClient, AccessRequest};
pub use self::service_info::{ServiceInfo, ServiceInfoClient, ServiceInfoSource};

/// Connection to one account of the remote HTTP API.
pub struct PryvConnection {
    client: PryvClient,
    delivery: EventDelivery,
}

impl PryvConnection {
    pub fn new(descriptor: &ConnectionDescriptor, delivery: EventDelivery) -> Result<Self> {
        Ok(Self {
            client: PryvClient::new(descriptor)?,
            delivery,
        })
    }
}

#[async_trait]
impl Connection for PryvConnection {
    fn delivery(&self) -> EventDelivery {
        self.delivery
    }

    async fn access_info(&self) -> Result<AccessInfo> {
        self.client.access_info().await
    }

    async fn get_events(&self, filter: &Filter) -> Result<Vec<Event>> {
        self.client.get_events(filter).await
    }

    async fn stream_events(
        &self,
        filter: &Filter,
        on_event: &mut (dyn FnMut(Event) + Send),
    ) -> Result<usize> {
        self.client.stream_events(filter, on_event).await
    }

    async fn get_streams(&self) -> Result<Vec<Stream>> {
        self.client.get_streams().await
    }
}

/// Builds [`PryvConnection`]s with a fixed delivery shape.
#[derive(Clone, Copy, Debug, Default)]
pub struct PryvConnectionFactory {
    delivery: EventDelivery,
}

impl PryvConnectionFactory {
    pub fn new(delivery: EventDelivery) -> Self {
        Self { delivery }
    }
}

impl ConnectionFactory for PryvConnectionFactory {
    fn connect(&self, descriptor: &ConnectionDescriptor) -> Result<Box<dyn Connection>> {
        Ok(Box::new(PryvConnection::new(descriptor, self.delivery)?))
    }
}
