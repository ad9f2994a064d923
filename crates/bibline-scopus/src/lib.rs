//! Scopus Search extraction
//!
//! Loads the search configuration, resolves credentials, talks to the Scopus
//! Search API and turns the result set into a raw [`RecordTable`] plus a
//! search manifest.
//!
//! [`RecordTable`]: bibline_core::RecordTable

pub mod api;
pub mod client_config;
pub mod config;
pub mod credentials;
pub mod entry;
pub mod executor;
pub mod http;
pub mod manifest;
pub mod runner;

pub use api::{ApiError, PageRequest, ScopusClient, SearchClient, SearchPage, View};
pub use client_config::{CLIENT_CONFIG_FILE, ClientConfig, RequestSettings};
pub use config::{LoadedSearchConfig, SearchConfig, Strategy};
pub use credentials::{ApiKey, CredentialInputs, Credentials, EnvSnapshot, InstToken};
pub use executor::{ExecuteOptions, ExtractionOutcome, ExtractionPlan, QueryExecutor};
pub use manifest::SearchManifest;
pub use runner::{ExtractOptions, ExtractReport};
