//! Runtime configuration, read from flags with environment-variable fallbacks.
//!
//! | flag | env | default |
//! |---|---|---|
//! | `--geocoder-url` | `GEOCODER_URL` | `https://geocode-maps.yandex.ru/1.x` |
//! | `--geocoder-api-key` | `YANDEX_GEOCODER_API_KEY` | required |
//! | `--geocoder-timeout` | `GEOCODER_TIMEOUT_SECS` | `10` |
//! | `--cache-dir` | `GEOCODE_CACHE_DIR` | none (in-memory) |
//! | `--bind` | `BIND_ADDR` | `127.0.0.1:3000` |
//! | `--catalog` | `CATALOG_PATH` | required for `serve` / `match` |
//! | `--max-concurrent-matches` | `MAX_CONCURRENT_MATCHES` | `8` |

use std::{fmt, net::SocketAddr, path::PathBuf, sync::Arc, time::Duration};

use clap::Args;

use crate::store::{GeocodeCache, GeocodeStore, MemoryCache, StoreResult};

pub const DEFAULT_GEOCODER_URL: &str = "https://geocode-maps.yandex.ru/1.x";

/// External geocoder settings.
///
/// `Debug` is implemented by hand so the API key never ends up in logs.
#[derive(Clone, Args)]
pub struct GeocoderConfig {
    #[arg(long = "geocoder-url", env = "GEOCODER_URL", default_value = DEFAULT_GEOCODER_URL)]
    pub base_url: String,

    #[arg(long = "geocoder-api-key", env = "YANDEX_GEOCODER_API_KEY", hide_env_values = true)]
    pub api_key: String,

    /// Seconds to wait for the geocoder before giving up
    #[arg(long = "geocoder-timeout", env = "GEOCODER_TIMEOUT_SECS", default_value_t = 10)]
    pub timeout_secs: u64,
}

impl GeocoderConfig {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: api_key.into(),
            timeout_secs: 10,
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl fmt::Debug for GeocoderConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GeocoderConfig")
            .field("base_url", &self.base_url)
            .field("api_key", &"[REDACTED]")
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

#[derive(Debug, Clone, Args)]
pub struct CacheConfig {
    /// Directory of the persistent geocode cache; omit to keep it in memory
    #[arg(long = "cache-dir", env = "GEOCODE_CACHE_DIR")]
    pub cache_dir: Option<PathBuf>,
}

impl CacheConfig {
    pub fn open(&self) -> StoreResult<Arc<dyn GeocodeCache>> {
        Ok(match &self.cache_dir {
            Some(dir) => Arc::new(GeocodeStore::open(dir)?),
            None => Arc::new(MemoryCache::new()),
        })
    }
}

#[derive(Debug, Clone, Args)]
pub struct ServeArgs {
    #[arg(long, env = "BIND_ADDR", default_value = "127.0.0.1:3000")]
    pub bind: SocketAddr,

    /// JSON seed with products, restaurants and menu rows
    #[arg(long, env = "CATALOG_PATH")]
    pub catalog: PathBuf,

    /// Upper bound on orders matched at once when listing orders
    #[arg(long, env = "MAX_CONCURRENT_MATCHES", default_value_t = 8)]
    pub max_concurrent_matches: usize,

    #[command(flatten)]
    pub geocoder: GeocoderConfig,

    #[command(flatten)]
    pub cache: CacheConfig,
}
