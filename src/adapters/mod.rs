// Spot Source Adapters Module
// One adapter per polled HTTP program feed

pub mod digital;
pub mod pota;
pub mod sota;
pub mod wwbota;
pub mod wwff;

use std::sync::Arc;

use crate::settings::Settings;
use crate::source_adapter::{build_http_client, SourceError};
use crate::spot::SpotSource;
use crate::summit_locator::SummitLocator;
use crate::watch_list::SharedWatchSet;

// Re-export the trait
pub use crate::source_adapter::SpotSourceAdapter;

/// Builds the adapter for one polled source from settings.
pub fn build_adapter(
    source: SpotSource,
    settings: &Settings,
    client: &reqwest::Client,
    locator: &Arc<SummitLocator>,
    watch: &SharedWatchSet,
) -> Result<Option<Arc<dyn SpotSourceAdapter>>, SourceError> {
    let polling = &settings.polling;
    let adapter: Arc<dyn SpotSourceAdapter> = match source {
        SpotSource::Pota => Arc::new(pota::PotaAdapter::new(client.clone(), &polling.pota_url)?),
        SpotSource::Sota => Arc::new(sota::SotaAdapter::new(
            client.clone(),
            &polling.sota_url,
            locator.clone(),
        )?),
        SpotSource::Wwff => Arc::new(wwff::WwffAdapter::new(client.clone(), &polling.wwff_url)?),
        SpotSource::Wwbota => {
            Arc::new(wwbota::WwbotaAdapter::new(client.clone(), &polling.wwbota_url)?)
        }
        SpotSource::Digital => Arc::new(digital::DigitalAdapter::new(
            client.clone(),
            &polling.digital_url,
            watch.clone(),
        )?),
        SpotSource::Cluster | SpotSource::Skimmer => return Ok(None),
    };
    Ok(Some(adapter))
}

/// Shared HTTP client and summit cache for all adapters of one hub.
pub fn build_support(settings: &Settings) -> Result<(reqwest::Client, Arc<SummitLocator>), SourceError> {
    let client = build_http_client(settings.polling.http_timeout())?;
    let locator = Arc::new(SummitLocator::new(
        client.clone(),
        settings.polling.sota_summit_url.clone(),
        settings.polling.summit_lookup_concurrency,
    ));
    Ok((client, locator))
}
