//! Run orchestration.
//!
//! A [`Session`] owns the connection pool of one connector instance and
//! answers the host lifecycle callbacks (`init`, `get_schema`, `get_data`)
//! as well as the interactive operations that precede data gathering
//! (requesting access, loading, checking and discovering endpoints,
//! submitting the filter).
//!
//! # Run states
//!
//! ```text
//! Idle → ConnectionsResolving → Validating → Iterating → Done
//!              │                    │
//!              └──────→ Failed ←────┘
//! ```
//!
//! `Failed` is reached only on fatal conditions: empty or unparseable input,
//! an invalid filter, or a pool in which no connection is valid. Partial
//! validity keeps the run going with the valid subset.

use anyhow::Result;
use chrono::Utc;
use pryv_wdc::config::WdcConfig;
use pryv_wdc::credentials::CredentialVault;
use pryv_wdc::host::{Host, Phase};
use pryv_wdc::model::POSITION_TYPE;
use pryv_wdc::rows::{flatten_streams, user_row, RowAssembler, TimeFormatter};
use pryv_wdc::schema::{get_schema, TableInfo};
use pryv_wdc::{EventContent, Filter, FilterError, TableId};
use serde_json::Value;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::campaign::{self, CampaignClient, InvitationDirectory};
use crate::connection::ConnectionFactory;
use crate::descriptor::{
    parse_descriptors, split_tokens, ConnectionDescriptor, ConnectionSource, DescriptorError,
};
use crate::iterator::{for_each_connection, IterationSummary};
use crate::pipeline::{fetch_events, is_location, is_numeric, PostFilter};
use crate::pool::{ConnectionPool, PooledConnection};
use crate::pryv::{
    AccessClient, AccessRequest, ServiceInfo, ServiceInfoClient, ServiceInfoSource,
};
use crate::validator::probe_all;


/// Event type of events whose content is an API endpoint.
pub const EXTRA_ENDPOINT_TYPE: &str = "credentials/pryv-api-endpoint";

#[derive(Clone, Debug, PartialEq)]
pub enum RunState {
    Idle,
    ConnectionsResolving,
    Validating,
    Iterating,
    Done,
    Failed(String),
}

/// Fatal run errors. Each one is also sent to the host as an abort message.
#[derive(Debug, Clone, PartialEq)]
pub enum RunError {
    EmptyInput,
    InvalidInput(String),
    NoConnections,
    AllConnectionsInvalid(String),
    InvalidFilter(FilterError),
    Directory(String),
    Access(String),
    Storage(String),
}

impl fmt::Display for RunError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunError::EmptyInput => write!(f, "{}", DescriptorError::Empty),
            RunError::InvalidInput(message) => write!(f, "{}", message),
            RunError::NoConnections => {
                write!(f, "No accepted invitation found for this campaign link.")
            }
            RunError::AllConnectionsInvalid(message) => write!(f, "{}", message),
            RunError::InvalidFilter(e) => write!(f, "{}", e),
            RunError::Directory(message) => {
                write!(f, "Failed to load campaign invitations: {}", message)
            }
            RunError::Access(message) => write!(f, "Access request failed: {}", message),
            RunError::Storage(message) => write!(f, "{}", message),
        }
    }
}

impl std::error::Error for RunError {}

impl From<DescriptorError> for RunError {
    fn from(e: DescriptorError) -> Self {
        match e {
            DescriptorError::Empty => RunError::EmptyInput,
            other => RunError::InvalidInput(other.to_string()),
        }
    }
}

/// Result of one endpoint check.
#[derive(Clone, Debug, PartialEq)]
pub struct EndpointCheck {
    pub username: String,
    pub ok: bool,
    /// Access name or id on success, truncated error otherwise
    pub message: String,
}

impl fmt::Display for EndpointCheck {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mark = if self.ok { "✅" } else { "❌" };
        write!(f, "{} {} {}", mark, self.username, self.message)
    }
}

/// Connection data and name handed to the host on submit.
#[derive(Clone, Debug, PartialEq)]
pub struct Submission {
    pub connection_data: String,
    pub connection_name: String,
}

/// Outcome of one `get_data` call.
#[derive(Clone, Debug, PartialEq)]
pub struct TableOutcome {
    pub table: TableId,
    pub rows: usize,
    pub summary: IterationSummary,
}

enum Loader {
    Users,
    Streams {
        max_depth: usize,
    },
    Events {
        filter: Filter,
        post_filter: Option<PostFilter>,
    },
}

pub struct Session {
    config: WdcConfig,
    pool: ConnectionPool,
    directory: Arc<dyn InvitationDirectory>,
    service_info_source: Arc<dyn ServiceInfoSource>,
    service_info: Option<ServiceInfo>,
    state: RunState,
}

impl Session {
    /// Session using the HTTP invitation directory and service info of `config`.
    pub fn new(
        config: WdcConfig,
        vault: Arc<dyn CredentialVault>,
        factory: Arc<dyn ConnectionFactory>,
    ) -> Self {
        let directory = Arc::new(CampaignClient::new(config.campaign.api_url.clone()));
        let service_info_source =
            Arc::new(ServiceInfoClient::new(config.service.service_info_url.clone()));
        Self {
            config,
            pool: ConnectionPool::new(vault, factory),
            directory,
            service_info_source,
            service_info: None,
            state: RunState::Idle,
        }
    }

    pub fn with_directory(mut self, directory: Arc<dyn InvitationDirectory>) -> Self {
        self.directory = directory;
        self
    }

    pub fn with_service_info_source(mut self, source: Arc<dyn ServiceInfoSource>) -> Self {
        self.service_info_source = source;
        self
    }

    pub fn state(&self) -> &RunState {
        &self.state
    }

    pub fn pool(&self) -> &ConnectionPool {
        &self.pool
    }

    pub fn service_info(&self) -> Option<&ServiceInfo> {
        self.service_info.as_ref()
    }

    /// Prepares the session for `phase`. Always returns, once, when ready.
    ///
    /// Interactive and auth phases load the service info document; a failure
    /// there is logged and leaves the previous document in place.
    pub async fn init(&mut self, phase: Phase) {
        info!(phase = ?phase, "Connector init");
        match phase {
            Phase::Interactive | Phase::Auth => {
                match self.service_info_source.service_info().await {
                    Ok(info) => {
                        info!(service = ?info.name, "Service info loaded");
                        self.service_info = Some(info);
                    }
                    Err(e) => warn!(error = %e, "Failed to load service info"),
                }
            }
            Phase::GatherData => {}
        }
    }

    pub fn get_schema(&self) -> Vec<TableInfo> {
        get_schema()
    }

    /// Parses endpoint input (or expands a campaign link) and persists the
    /// resulting endpoints. Returns the number of connections saved.
    ///
    /// Empty input aborts before the pool or the network is touched.
    pub async fn load_endpoints(&mut self, text: &str, host: &dyn Host) -> Result<usize, RunError> {
        self.state = RunState::ConnectionsResolving;

        let source = match ConnectionSource::from_text(text, &self.config.campaign.link_prefix) {
            Ok(source) => source,
            Err(e) => return Err(self.fail(host, e.into())),
        };

        let endpoints = match source {
            ConnectionSource::Endpoints(endpoints) => endpoints,
            ConnectionSource::Campaign(link) => {
                host.report_progress("Loading campaign invitations");
                let template = self.service_info.as_ref().and_then(ServiceInfo::api_template);
                let expanded = campaign::expand(
                    self.directory.as_ref(),
                    &link,
                    template,
                    &self.config.campaign.domain,
                )
                .await;
                match expanded {
                    Ok(endpoints) if endpoints.is_empty() => {
                        return Err(self.fail(host, RunError::NoConnections))
                    }
                    Ok(endpoints) => endpoints,
                    Err(e) => {
                        return Err(self.fail(host, RunError::Directory(format!("{:#}", e))))
                    }
                }
            }
        };

        let descriptors = match parse_descriptors(&endpoints) {
            Ok(descriptors) => descriptors,
            Err(e) => return Err(self.fail(host, e.into())),
        };
        if let Err(e) = self.pool.save_descriptors(&descriptors) {
            return Err(self.fail(host, RunError::Storage(format!("{:#}", e))));
        }

        self.state = RunState::Idle;
        Ok(descriptors.len())
    }

    /// Requests read access through the service's access URL and saves the
    /// granted endpoint like [`Session::load_endpoints`] does.
    ///
    /// Needs the service info loaded by `init`. `on_auth_url` receives the
    /// URL at which the user signs in.
    pub async fn request_access<F>(
        &mut self,
        host: &dyn Host,
        on_auth_url: F,
    ) -> Result<usize, RunError>
    where
        F: FnMut(&str),
    {
        self.state = RunState::ConnectionsResolving;
        let Some(access_url) = self.service_info.as_ref().and_then(|i| i.access.clone()) else {
            let err = RunError::Access("service info has no access URL".to_string());
            return Err(self.fail(host, err));
        };

        let request = AccessRequest::read_all(&self.config.service.app_id);
        let timeout = Duration::from_secs(self.config.service.access_timeout_secs);
        host.report_progress("Waiting for access approval");
        let granted = AccessClient::new()
            .authorize(&access_url, &request, timeout, on_auth_url)
            .await;
        match granted {
            Ok(api_endpoint) => self.load_endpoints(&api_endpoint, host).await,
            Err(e) => Err(self.fail(host, RunError::Access(format!("{:#}", e)))),
        }
    }

    /// Probes every pooled connection and reports one line per endpoint.
    pub async fn check_endpoints(&mut self) -> Result<Vec<EndpointCheck>> {
        let max_len = self.config.limits.check_message_max_len;
        let handles = self.pool.get()?;
        let results = probe_all(handles).await;

        let checks = handles
            .iter()
            .zip(results)
            .map(|(handle, result)| match result {
                Ok(access) => EndpointCheck {
                    username: handle.username().to_string(),
                    ok: true,
                    message: access.display_name().to_string(),
                },
                Err(e) => {
                    debug!(username = %handle.username(), error = %e, "Endpoint check failed");
                    EndpointCheck {
                        username: handle.username().to_string(),
                        ok: false,
                        message: truncate(&e.to_string(), max_len),
                    }
                }
            })
            .collect();
        Ok(checks)
    }

    /// Collects API endpoints stored as events in the accounts of `text`.
    ///
    /// Accounts that cannot be read are logged and skipped.
    pub async fn discover_extra_endpoints(
        &mut self,
        text: &str,
        host: &dyn Host,
    ) -> Result<Vec<String>, RunError> {
        let tokens = split_tokens(text);
        if tokens.is_empty() {
            return Err(self.fail(host, RunError::EmptyInput));
        }

        let limit = self.config.limits.extra_endpoints_limit;
        let filter = Filter {
            from_time: 0,
            to_time: Utc::now().timestamp(),
            limit: Some(limit),
            types: Some(vec![EXTRA_ENDPOINT_TYPE.to_string()]),
        };

        let mut found = Vec::new();
        for token in &tokens {
            let descriptor = match ConnectionDescriptor::parse(token) {
                Ok(descriptor) => descriptor,
                Err(e) => {
                    warn!(error = %e, "Skipping unparseable endpoint");
                    continue;
                }
            };
            match self.extra_endpoints_of(&descriptor, &filter).await {
                Ok(endpoints) => {
                    info!(
                        username = %descriptor.username(),
                        count = endpoints.len(),
                        "Extra endpoints found"
                    );
                    found.extend(endpoints);
                }
                Err(e) => warn!(
                    username = %descriptor.username(),
                    error = %e,
                    "Failed to load extra endpoints"
                ),
            }
        }
        Ok(found)
    }

    async fn extra_endpoints_of(
        &self,
        descriptor: &ConnectionDescriptor,
        filter: &Filter,
    ) -> Result<Vec<String>> {
        let connection = self.pool.factory().connect(descriptor)?;
        let events = fetch_events(connection.as_ref(), filter, None).await?;
        Ok(events
            .into_iter()
            .filter_map(|event| match event.content {
                EventContent::Scalar(Value::String(endpoint)) => Some(endpoint),
                _ => None,
            })
            .collect())
    }

    /// Validates the filter input and builds the data handed to the
    /// data-gathering phase.
    pub fn submit_filter(
        &mut self,
        from_time: i64,
        to_time: i64,
        limit: Option<i64>,
        host: &dyn Host,
    ) -> Result<Submission, RunError> {
        let filter = match Filter::new(from_time, to_time, limit) {
            Ok(filter) => filter,
            Err(e) => return Err(self.fail(host, RunError::InvalidFilter(e))),
        };
        let username = match self.pool.credentials_username() {
            Ok(username) => username.unwrap_or_default(),
            Err(e) => return Err(self.fail(host, RunError::Storage(format!("{:#}", e)))),
        };

        Ok(Submission {
            connection_data: filter.to_connection_data(),
            connection_name: format!("Pryv WDC {}", username),
        })
    }

    /// Gathers all rows of `table`, appending them to the host connection
    /// by connection in registration order.
    pub async fn get_data(
        &mut self,
        table: TableId,
        connection_data: &str,
        host: &dyn Host,
    ) -> Result<TableOutcome, RunError> {
        let run_id = Uuid::now_v7();
        let span = info_span!("get_data", run_id = %run_id, table = %table);
        self.gather(table, connection_data, host).instrument(span).await
    }

    async fn gather(
        &mut self,
        table: TableId,
        connection_data: &str,
        host: &dyn Host,
    ) -> Result<TableOutcome, RunError> {
        let loader = match self.loader(table, connection_data) {
            Ok(loader) => loader,
            Err(e) => return Err(self.fail(host, RunError::InvalidFilter(e))),
        };

        self.state = RunState::ConnectionsResolving;
        if let Err(e) = self.pool.get() {
            return Err(self.fail(host, RunError::Storage(format!("{:#}", e))));
        }

        self.state = RunState::Validating;
        let validated = self.pool.ensure_validated().await;
        let report = match validated {
            Ok(report) => report,
            Err(e) => return Err(self.fail(host, RunError::Storage(format!("{:#}", e)))),
        };
        if report.all_invalid() {
            let message = report.failure_message().unwrap_or_default();
            return Err(self.fail(host, RunError::AllConnectionsInvalid(message)));
        }
        if let Some(message) = report.failure_message() {
            host.report_progress(&message);
        }

        self.state = RunState::Iterating;
        let username_column = self.pool.multi_connection();
        let time = TimeFormatter::new(self.config.rows.timezone);
        let appended = AtomicUsize::new(0);

        let result = match &loader {
            Loader::Users => {
                host.report_progress("Retrieving users");
                for_each_connection(&mut self.pool, |handle| {
                    load_user(handle, host, &appended)
                })
                .await
            }
            Loader::Streams { max_depth } => {
                let max_depth = *max_depth;
                for_each_connection(&mut self.pool, |handle| {
                    load_streams(handle, host, max_depth, username_column, &appended)
                })
                .await
            }
            Loader::Events {
                filter,
                post_filter,
            } => {
                host.report_progress("Retrieving events");
                let job = EventsJob {
                    table,
                    filter,
                    post_filter: *post_filter,
                    time,
                    username_column,
                };
                for_each_connection(&mut self.pool, |handle| {
                    load_events(handle, host, &job, &appended)
                })
                .await
            }
        };

        let summary = match result {
            Ok(summary) => summary,
            Err(e) => return Err(self.fail(host, RunError::Storage(format!("{:#}", e)))),
        };
        for failure in &summary.failures {
            host.report_progress(&format!(
                "Failed to retrieve {} for {}: {}",
                table, failure.username, failure.error
            ));
        }

        self.state = RunState::Done;
        let rows = appended.load(Ordering::SeqCst);
        info!(rows = rows, "Table complete");
        Ok(TableOutcome {
            table,
            rows,
            summary,
        })
    }

    /// Builds the loader of `table`; event tables need valid connection data.
    fn loader(&self, table: TableId, connection_data: &str) -> Result<Loader, FilterError> {
        Ok(match table {
            TableId::Users => Loader::Users,
            TableId::Streams => Loader::Streams {
                max_depth: self.config.limits.max_stream_depth,
            },
            TableId::NumericEvents => Loader::Events {
                filter: Filter::from_connection_data(connection_data)?,
                post_filter: Some(is_numeric),
            },
            TableId::LocationEvents => Loader::Events {
                filter: Filter::from_connection_data(connection_data)?.with_types([POSITION_TYPE]),
                post_filter: Some(is_location),
            },
        })
    }

    /// Clears persisted credentials and the pool. Idempotent.
    pub fn reset(&mut self) -> Result<()> {
        self.pool.reset()?;
        self.state = RunState::Idle;
        Ok(())
    }

    fn fail(&mut self, host: &dyn Host, err: RunError) -> RunError {
        let message = err.to_string();
        error!(error = %message, "Run aborted");
        host.abort_with_error(&message);
        self.state = RunState::Failed(message);
        err
    }
}

struct EventsJob<'a> {
    table: TableId,
    filter: &'a Filter,
    post_filter: Option<PostFilter>,
    time: TimeFormatter,
    username_column: bool,
}

async fn load_user(
    handle: &PooledConnection,
    host: &dyn Host,
    appended: &AtomicUsize,
) -> Result<()> {
    host.report_progress(&format!("Retrieving users: {}", handle.username()));
    host.append_rows(TableId::Users, vec![user_row(handle.username())]);
    appended.fetch_add(1, Ordering::SeqCst);
    Ok(())
}

async fn load_streams(
    handle: &PooledConnection,
    host: &dyn Host,
    max_depth: usize,
    username_column: bool,
    appended: &AtomicUsize,
) -> Result<()> {
    host.report_progress(&format!("Retrieving streams for {}", handle.username()));
    let streams = handle.connection().get_streams().await?;
    if streams.is_empty() {
        return Ok(());
    }

    let username = username_column.then(|| handle.username());
    let rows = flatten_streams(&streams, username, max_depth)?;
    debug!(username = %handle.username(), count = rows.len(), "Streams flattened");
    appended.fetch_add(rows.len(), Ordering::SeqCst);
    host.append_rows(TableId::Streams, rows);
    Ok(())
}

async fn load_events(
    handle: &PooledConnection,
    host: &dyn Host,
    job: &EventsJob<'_>,
    appended: &AtomicUsize,
) -> Result<()> {
    host.report_progress(&format!("Retrieving events for {}", handle.username()));
    let events = fetch_events(handle.connection(), job.filter, job.post_filter).await?;
    if events.is_empty() {
        return Ok(());
    }

    let username = job.username_column.then(|| handle.username().to_string());
    let rows = RowAssembler::new(username, job.time).event_rows(&events);
    host.report_progress(&format!(
        "Retrieving events for {}: {}",
        handle.username(),
        rows.len()
    ));
    appended.fetch_add(rows.len(), Ordering::SeqCst);
    host.append_rows(job.table, rows);
    Ok(())
}

/// Shortens `message` to `max_len` characters followed by `...`.
fn truncate(message: &str, max_len: usize) -> String {
    if message.chars().count() <= max_len {
        return message.to_string();
    }
    let mut short: String = message.chars().take(max_len).collect();
    short.push_str("...");
    short
}
