//! # healthsync
//!
//! Incremental connector for the Health Planet measurement API.
//!
//! The service has no client-credentials grant, so a run starts by scripting
//! the browser login to harvest an authorization code, then walks the
//! requested period in three-month windows, folds the sparse tagged readings
//! into dense rows and hands back a checkpoint for the next run.
//!
//! ## Modules
//!
//! - [`session`]: scripted login, HTML scraping, cookie-bearing transport
//! - [`sync`]: window planning and the resumable sync loop
//! - [`aggregate`]: tagged readings → dense rows
//! - [`api`]: the measurement query endpoint
//! - [`schema`]: metric families, tag tables, column declarations
//! - [`checkpoint`]: resume bounds and their persistence
//! - [`sink`]: row output
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use healthsync::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let credentials = Credentials {
//!         login_id: "me@example.com".into(),
//!         password: "secret".into(),
//!         client_id: "client".into(),
//!         client_secret: "client-secret".into(),
//!     };
//!     let base_url = "https://www.healthplanet.jp";
//!     let timeout = std::time::Duration::from_secs(30);
//!     let family = MetricFamily::Innerscan;
//!
//!     let login = ReqwestTransport::new(base_url, timeout)?;
//!     let token = Authenticator::new(login, credentials, base_url, family)
//!         .authenticate()
//!         .await?;
//!
//!     let api = HealthPlanetApi::new(ReqwestTransport::new(base_url, timeout)?, token, family);
//!     let mut sink = MemorySink::new();
//!     let now = chrono::Utc::now().naive_utc();
//!     let outcome = SyncEngine::new(api).run(None, now, &mut sink).await?;
//!
//!     println!("{} rows, next checkpoint {:?}", sink.rows.len(), outcome.checkpoint);
//!     Ok(())
//! }
//! ```

pub mod aggregate;
pub mod api;
pub mod checkpoint;
pub mod config;
pub mod error;
pub mod schema;
pub mod session;
pub mod sink;
pub mod sync;

pub use aggregate::{aggregate, AggregatedWindow, Row, TaggedMeasurement, Value};
pub use api::HealthPlanetApi;
pub use checkpoint::{Checkpoint, CheckpointStore};
pub use config::{Config, ConfigError, LoggingConfig};
pub use error::{FieldConversionError, SyncError, SyncResult};
pub use schema::{Column, ColumnType, Language, MetricFamily};
pub use session::{AccessToken, Authenticator, Credentials, ReqwestTransport, SessionTransport};
pub use sink::{CsvSink, JsonLinesSink, MemorySink, RowSink};
pub use sync::{plan_windows, MeasurementSource, SyncEngine, SyncOutcome, TimeWindow};
