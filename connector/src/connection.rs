use anyhow::Result;
use async_trait::async_trait;
use pryv_wdc::{AccessInfo, Event, Filter, Stream};

use crate::descriptor::ConnectionDescriptor;

/// How a connection delivers fetched events.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum EventDelivery {
    /// The whole result arrives as one list
    #[default]
    Buffered,
    /// Events are handed over one by one while the response is read
    Streamed,
}

/// Client for one remote account.
///
/// The engine treats implementations as black boxes returning domain
/// records. Connections are owned by the pool and never retained by callers.
///
/// # Lifecycle
/// 1. Built from a [`ConnectionDescriptor`] by a [`ConnectionFactory`]
/// 2. Probed once with `access_info()`
/// 3. Asked for streams/events for each table while the run iterates
#[async_trait]
pub trait Connection: Send + Sync {
    /// Preferred delivery shape for `events`.
    fn delivery(&self) -> EventDelivery {
        EventDelivery::Buffered
    }

    /// Account/access information; fails when the token is invalid or expired.
    async fn access_info(&self) -> Result<AccessInfo>;

    /// Fetches all events matching `filter` at once.
    async fn get_events(&self, filter: &Filter) -> Result<Vec<Event>>;

    /// Fetches events matching `filter`, calling `on_event` for each one as it
    /// arrives. Returns the number of events delivered.
    async fn stream_events(
        &self,
        filter: &Filter,
        on_event: &mut (dyn FnMut(Event) + Send),
    ) -> Result<usize> {
        let events = self.get_events(filter).await?;
        let count = events.len();
        for event in events {
            on_event(event);
        }
        Ok(count)
    }

    /// Fetches the stream forest.
    async fn get_streams(&self) -> Result<Vec<Stream>>;
}

/// Builds connections from descriptors.
pub trait ConnectionFactory: Send + Sync {
    fn connect(&self, descriptor: &ConnectionDescriptor) -> Result<Box<dyn Connection>>;
}
