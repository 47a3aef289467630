use anyhow::{bail, Context, Result};
use pryv_connector::pryv::PryvConnectionFactory;
use pryv_connector::{EventDelivery, Session};
use pryv_wdc::config::WdcConfig;
use pryv_wdc::credentials::{CredentialStore, ProfileVault};
use pryv_wdc::host::{JsonLinesHost, Phase};
use pryv_wdc::TableId;
use std::sync::Arc;
use tracing::info;

const USAGE: &str = "usage: pryv-connector <command>

commands:
  auth                           request read access in the browser and save the granted endpoint
  login <endpoint|link>...       save API endpoints (or expand a campaign link) and check them
  check                          probe the saved endpoints
  discover <endpoint>...         list API endpoints stored in the given accounts
  filter <from> <to> [limit]     print connection data for a time range (epoch seconds)
  gather <table|all> <data>      write rows as JSON lines to stdout
  reset                          forget the saved endpoints";

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing subscriber
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "pryv_connector=info".into()),
        )
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let Some((command, rest)) = args.split_first() else {
        bail!("{}", USAGE);
    };

    // Read configuration from file or environment
    let config = match std::env::var("PRYV_WDC_CONFIG") {
        Ok(path) => WdcConfig::load(&path)?,
        Err(_) => WdcConfig::from_env(),
    };

    let encryption_key = std::env::var("PRYV_WDC_ENCRYPTION_KEY")
        .context("PRYV_WDC_ENCRYPTION_KEY is required (base64-encoded 32-byte key)")?;

    info!(
        db_path = %config.credentials.db_path,
        profile = %config.credentials.profile,
        "Configuration loaded"
    );

    let store = Arc::new(
        CredentialStore::new(&config.credentials.db_path, &encryption_key)
            .context("Failed to initialize credential store")?,
    );
    let vault = Arc::new(ProfileVault::new(store, config.credentials.profile.clone()));
    let factory = Arc::new(PryvConnectionFactory::new(EventDelivery::Streamed));

    let mut session = Session::new(config, vault, factory);
    let host = JsonLinesHost::new(std::io::stdout());

    match command.as_str() {
        "auth" => {
            session.init(Phase::Auth).await;
            session
                .request_access(&host, |url| println!("Sign in to grant access: {}", url))
                .await?;
            for check in session.check_endpoints().await? {
                println!("{}", check);
            }
        }
        "login" => {
            session.init(Phase::Interactive).await;
            session.load_endpoints(&rest.join("\n"), &host).await?;
            for check in session.check_endpoints().await? {
                println!("{}", check);
            }
        }
        "check" => {
            for check in session.check_endpoints().await? {
                println!("{}", check);
            }
        }
        "discover" => {
            for endpoint in session
                .discover_extra_endpoints(&rest.join("\n"), &host)
                .await?
            {
                println!("{}", endpoint);
            }
        }
        "filter" => {
            let [from, to, limit @ ..] = rest else {
                bail!("{}", USAGE);
            };
            let from = from.parse().context("<from> must be epoch seconds")?;
            let to = to.parse().context("<to> must be epoch seconds")?;
            let limit = match limit.first() {
                Some(l) => Some(l.parse().context("[limit] must be a number")?),
                None => None,
            };
            let submission = session.submit_filter(from, to, limit, &host)?;
            info!(name = %submission.connection_name, "Filter accepted");
            println!("{}", submission.connection_data);
        }
        "gather" => {
            let [table, data] = rest else {
                bail!("{}", USAGE);
            };
            let tables = if table == "all" {
                TableId::ALL.to_vec()
            } else {
                vec![table.parse::<TableId>()?]
            };

            session.init(Phase::GatherData).await;
            for table in tables {
                let outcome = session.get_data(table, data, &host).await?;
                info!(
                    table = %table,
                    rows = outcome.rows,
                    failures = outcome.summary.failures.len(),
                    "Table gathered"
                );
            }
        }
        "reset" => {
            session.reset()?;
            info!("Saved endpoints cleared");
        }
        _ => bail!("{}", USAGE),
    }

    if let Some(message) = host.abort_message() {
        bail!(message);
    }
    Ok(())
}
