use anyhow::{Context, Result, anyhow};
use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;
use xauth_console::{CertificateCache, HttpJwksFetcher};
use xauth_core::{
    AuthMetrics, AuthOutcome, AuthPayload, AuthenticateRequest, ClientAuthenticationType,
    InMemoryMetrics,
};
use xauth_dispatch::{Dispatcher, ProviderQueueFactory, ProviderResources, XauthConfig};
use xauth_observability_otel::{OtelSetup, OtelSetupBuilder};
use xauth_queue::ReqwestTransport;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum MetricsFormat {
    /// One line per counter
    Text,
    /// Prometheus exposition format
    Prometheus,
}

/// Run one authentication request through the configured providers
#[derive(Debug, Clone, Parser)]
#[command(name = "xauth-probe")]
#[command(about = "Run one authentication request through the configured providers")]
#[command(version)]
pub struct Args {
    /// TOML configuration file (defaults to $XAUTH_CONFIG_FILE or xauth.toml)
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Authentication type, by name or wire code (e.g. Steam or 1)
    #[arg(short, long, value_name = "TYPE")]
    pub auth_type: ClientAuthenticationType,

    /// User id sent by the client
    #[arg(short, long, value_name = "ID", default_value = "probe-user")]
    pub user_id: String,

    /// Client query string, e.g. "ticket=abc&nonce=1"
    #[arg(short, long, value_name = "QUERY")]
    pub params: Option<String>,

    /// Post data; valid JSON is sent as JSON, anything else as text
    #[arg(short, long, value_name = "DATA")]
    pub data: Option<String>,

    /// Override the configured application id
    #[arg(long, value_name = "ID")]
    pub app_id: Option<String>,

    /// Allow anonymous access regardless of configuration
    #[arg(long)]
    pub anonymous: bool,

    #[arg(long, value_enum, default_value_t = MetricsFormat::Text)]
    pub metrics: MetricsFormat,
}

enum MetricsSink {
    Memory(Arc<InMemoryMetrics>),
    Otel(OtelSetup),
}

impl MetricsSink {
    fn auth_metrics(&self) -> Arc<dyn AuthMetrics> {
        match self {
            MetricsSink::Memory(metrics) => metrics.clone(),
            MetricsSink::Otel(setup) => setup.auth_metrics(),
        }
    }

    fn report(&self) -> Result<String> {
        match self {
            MetricsSink::Memory(metrics) => Ok(metrics
                .snapshot()
                .into_iter()
                .map(|(auth_type, counter, count)| {
                    format!("{auth_type} {} {count}", counter.as_str())
                })
                .collect::<Vec<_>>()
                .join("\n")),
            MetricsSink::Otel(setup) => setup.render().context("Failed to render metrics"),
        }
    }
}

impl Args {
    pub fn load_config(&self) -> Result<XauthConfig> {
        let config = match &self.config {
            Some(path) => XauthConfig::load_with(Some(path.as_path()), None),
            None => XauthConfig::load(),
        };
        config.context("Failed to load configuration")
    }

    pub fn request(&self) -> AuthenticateRequest {
        let mut request = AuthenticateRequest::new(self.user_id.clone(), self.auth_type);
        if let Some(params) = &self.params {
            request = request.with_params(params.clone());
        }
        if let Some(data) = &self.data {
            request = request.with_data(parse_data(data));
        }
        request
    }

    pub async fn run(&self, config: &XauthConfig) -> Result<AuthOutcome> {
        let nintendo = config.nintendo_settings();
        let transport = Arc::new(ReqwestTransport::new()?);
        let fetcher = Arc::new(HttpJwksFetcher::new(nintendo.retrieval_timeout)?);
        let resources = ProviderResources::new(
            Arc::new(ProviderQueueFactory::new(config.queue_settings(), transport)),
            CertificateCache::new(fetcher, nintendo.refresh_interval),
            nintendo,
        );

        let sink = match self.metrics {
            MetricsFormat::Text => MetricsSink::Memory(Arc::new(InMemoryMetrics::new())),
            MetricsFormat::Prometheus => MetricsSink::Otel(
                OtelSetupBuilder::new("xauth-probe")
                    .build()
                    .map_err(|e| anyhow!("Failed to set up OpenTelemetry: {e}"))?,
            ),
        };

        let dispatcher = Dispatcher::new(resources, sink.auth_metrics())
            .with_retry_count(config.queue.retry_count);
        dispatcher.rebuild(&config.provider_configs()?)?;

        let mut settings = config.auth_settings();
        if let Some(app_id) = &self.app_id {
            settings.application_id = app_id.clone();
        }
        settings.allow_anonymous |= self.anonymous;

        let request = self.request();
        info!(
            auth_type = %request.client_authentication_type,
            user_id = %request.user_id,
            "Authenticating"
        );
        let outcome = dispatcher.authenticate_client(&request, &settings).await;

        println!("{}", serde_json::to_string_pretty(&outcome)?);
        let report = sink.report()?;
        if !report.is_empty() {
            println!("{report}");
        }

        Ok(outcome)
    }
}

/// JSON when it parses, text otherwise.
pub fn parse_data(raw: &str) -> AuthPayload {
    match serde_json::from_str::<serde_json::Value>(raw) {
        Ok(value) => AuthPayload::from(value),
        Err(_) => AuthPayload::from(raw),
    }
}

pub fn init_tracing(config: &XauthConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(config.log_filter()));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);

    match config.logging.format.to_lowercase().as_str() {
        "json" => builder.json().init(),
        "compact" => builder.compact().init(),
        _ => builder.pretty().init(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_parse_arguments() {
        let args = Args::try_parse_from([
            "xauth-probe",
            "--auth-type",
            "1",
            "--params",
            "ticket=abc",
            "--data",
            r#"{"k":"v"}"#,
            "--anonymous",
        ])
        .unwrap();

        assert_eq!(args.auth_type, ClientAuthenticationType::Steam);
        assert_eq!(args.user_id, "probe-user");
        assert!(args.anonymous);
        assert_eq!(args.metrics, MetricsFormat::Text);

        let request = args.request();
        assert_eq!(request.client_authentication_params.as_deref(), Some("ticket=abc"));
        assert!(request.client_authentication_data.unwrap().as_map().is_some());
    }

    #[test]
    fn test_unknown_auth_type_rejected() {
        assert!(Args::try_parse_from(["xauth-probe", "--auth-type", "Stadia"]).is_err());
        assert!(Args::try_parse_from(["xauth-probe", "--auth-type", "42"]).is_err());
    }

    #[test]
    fn test_parse_data() {
        assert_eq!(parse_data("token-blob"), AuthPayload::Text("token-blob".to_string()));
        assert_eq!(parse_data(r#""quoted""#), AuthPayload::Text("quoted".to_string()));
        assert_eq!(parse_data("42").kind(), "other");
        assert_eq!(parse_data(r#"{"a":1}"#).kind(), "map");
    }

    #[test]
    fn test_load_config_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(
            br#"
[application]
application_id = "probe-app"

[[providers]]
auth_type = "Custom"
base_uri = "https://auth.example.com/login"
"#,
        )
        .unwrap();

        let args = Args::try_parse_from([
            "xauth-probe",
            "--config",
            file.path().to_str().unwrap(),
            "--auth-type",
            "Custom",
        ])
        .unwrap();

        let config = args.load_config().unwrap();
        assert_eq!(config.application.application_id, "probe-app");
        assert_eq!(config.provider_configs().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_anonymous_run_without_providers() {
        let args = Args::try_parse_from([
            "xauth-probe",
            "--auth-type",
            "Custom",
            "--user-id",
            "guest",
            "--anonymous",
        ])
        .unwrap();

        let outcome = args.run(&XauthConfig::default()).await.unwrap();

        assert_eq!(outcome, AuthOutcome::ok("guest"));
    }
}
