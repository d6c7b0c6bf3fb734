use std::{env, sync::LazyLock};

use opentelemetry_sdk::metrics::SdkMeterProvider;
use strum_macros::EnumIter;
use tracing::warn;

static CONNECTION_URI: LazyLock<String> = LazyLock::new(|| {
    let host = env::var("PROMETHEUS_HOST").unwrap_or("localhost".into());
    let port = env::var("PROMETHEUS_PORT").unwrap_or("9090".into());

    format!("http://{host}:{port}/api/v1/otlp/v1/metrics")
});

const SERVICE_NAME: &str = "88trip-images";

#[derive(Debug, EnumIter, Hash, Eq, PartialEq)]
pub enum Metrics {
    /// Counter for image lookups answered from memory
    ImageCacheHit,
    /// Counter for image lookups that had to go to the network
    ImageCacheMiss,
    /// Counter for images downloaded and decoded successfully
    ImageFetched,
    /// Counter for downloads that failed at the transport level
    ImageFetchFailed,
    /// Counter for payloads that were not a decodable image
    ImageDecodeFailed,
    /// Counter for entries pushed out of the memory cache
    ImageCacheEviction,
}

impl Metrics {
    fn to_string(&self) -> String {
        match self {
            Metrics::ImageCacheHit => "IMAGE_CACHE_HIT".to_string(),
            Metrics::ImageCacheMiss => "IMAGE_CACHE_MISS".to_string(),
            Metrics::ImageFetched => "IMAGE_FETCHED".to_string(),
            Metrics::ImageFetchFailed => "IMAGE_FETCH_FAILED".to_string(),
            Metrics::ImageDecodeFailed => "IMAGE_DECODE_FAILED".to_string(),
            Metrics::ImageCacheEviction => "IMAGE_CACHE_EVICTION".to_string(),
        }
    }
}

/// Starts the OTLP exporter. Until this is called, `put_metric!` records nothing,
/// which keeps libraries and tests from spinning up an exporter.
pub fn init() {
    _private::COUNTERS.get_or_init(_private::build_counters);
}

/// Flushes pending measurements, used by short-lived binaries before exiting.
pub fn shutdown() {
    if _private::COUNTERS.get().is_some() {
        flush(&_private::PROVIDER);
    }
}

fn flush(provider: &SdkMeterProvider) -> bool {
    match provider.shutdown() {
        Ok(()) => true,
        Err(err) => {
            warn!("Failed to flush metrics on shutdown: {err}");
            false
        }
    }
}

pub mod _private {
    pub use opentelemetry::KeyValue;

    use std::{
        collections::HashMap,
        sync::{LazyLock, OnceLock},
        time::Duration,
    };

    use opentelemetry::{
        global,
        metrics::{Counter, Meter},
    };
    use opentelemetry_otlp::{MetricExporter, Protocol, WithExportConfig};
    use opentelemetry_sdk::{
        Resource,
        metrics::{PeriodicReader, SdkMeterProvider},
    };
    use strum::IntoEnumIterator;

    use crate::{CONNECTION_URI, Metrics, SERVICE_NAME};

    static OTEL_METER: LazyLock<Meter> = LazyLock::new(|| {
        global::set_meter_provider(PROVIDER.clone());
        global::meter(SERVICE_NAME)
    });

    pub static PROVIDER: LazyLock<SdkMeterProvider> = LazyLock::new(|| {
        let exporter = MetricExporter::builder()
            .with_http()
            .with_protocol(Protocol::HttpBinary)
            .with_endpoint(CONNECTION_URI.to_string())
            .build()
            .expect("Expect Prometheus exporter to build");

        let reader = PeriodicReader::builder(exporter)
            .with_interval(Duration::from_secs(1))
            .build();

        let resource = Resource::builder().with_service_name(SERVICE_NAME).build();

        SdkMeterProvider::builder()
            .with_reader(reader)
            .with_resource(resource)
            .build()
    });

    pub static COUNTERS: OnceLock<HashMap<Metrics, Counter<u64>>> = OnceLock::new();

    pub(crate) fn build_counters() -> HashMap<Metrics, Counter<u64>> {
        let mut mapping: HashMap<Metrics, Counter<u64>> = HashMap::new();

        for metric in crate::Metrics::iter() {
            let metric_meter = OTEL_METER.u64_counter(metric.to_string()).build();

            mapping.insert(metric, metric_meter);
        }

        mapping
    }
}

#[macro_export]
macro_rules! put_metric {
    ($metric_name:expr, $added_value:expr $(, $key:literal => $value:expr)* $(,)?) => {{
        use $crate::_private::{KeyValue, COUNTERS};
        use $crate::Metrics;

        let metric_name: Metrics = $metric_name;
        let added_value: u64 = $added_value;

        if let Some(counter) = COUNTERS.get().and_then(|counters| counters.get(&metric_name)) {
            let attributes: &[KeyValue] = &[
                $(KeyValue::new($key, $value),)*
            ];

            counter.add(added_value, attributes);
        }
    }};
}
