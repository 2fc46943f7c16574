use anyhow::Context;
use clap::{Parser, Subcommand};
use std::{path::PathBuf, sync::Arc};
use tokio::net::TcpListener;
use tracing::info;

use crate::{
    api::router,
    catalog::Catalog,
    config::{CacheConfig, GeocoderConfig, ServeArgs},
    geo::{Coordinates, distance_km},
    geocoder::{Geocoder, YandexGeocoder},
    matcher::RestaurantMatcher,
    orders::{NewOrder, NewOrderItem, OrderRegistry},
    state::AppState,
    store::GeocodeStore,
    utils::shutdown_token,
};

/// Match food orders to the nearest restaurant that can cook them
#[derive(Parser)]
#[command(name = "foodcart", version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP API
    Serve(ServeArgs),

    /// Resolve an address to "lon lat", through the cache
    Geocode {
        address: String,

        #[command(flatten)]
        geocoder: GeocoderConfig,

        #[command(flatten)]
        cache: CacheConfig,
    },

    /// Great-circle distance in km between two points
    Distance {
        #[arg(allow_negative_numbers = true)]
        from_lon: f64,
        #[arg(allow_negative_numbers = true)]
        from_lat: f64,
        #[arg(allow_negative_numbers = true)]
        to_lon: f64,
        #[arg(allow_negative_numbers = true)]
        to_lat: f64,
    },

    /// Rank restaurants for an ad-hoc order
    Match {
        /// JSON seed with products, restaurants and menu rows
        #[arg(long, env = "CATALOG_PATH")]
        catalog: PathBuf,

        /// Delivery address
        #[arg(long)]
        address: String,

        /// PRODUCT[:QUANTITY], repeatable
        #[arg(long = "item", value_parser = parse_item, required = true)]
        items: Vec<NewOrderItem>,

        #[command(flatten)]
        geocoder: GeocoderConfig,

        #[command(flatten)]
        cache: CacheConfig,
    },

    /// List the persisted geocode cache
    Cache {
        #[arg(long = "cache-dir", env = "GEOCODE_CACHE_DIR")]
        dir: PathBuf,
    },
}

fn parse_item(raw: &str) -> Result<NewOrderItem, String> {
    let (product, quantity) = match raw.split_once(':') {
        Some((p, q)) => (p, q),
        None => (raw, "1"),
    };
    Ok(NewOrderItem {
        product: product
            .trim()
            .parse()
            .map_err(|_| format!("bad product id `{product}`"))?,
        quantity: quantity
            .trim()
            .parse()
            .map_err(|_| format!("bad quantity `{quantity}`"))?,
    })
}

fn build_geocoder(
    geocoder: &GeocoderConfig,
    cache: &CacheConfig,
) -> anyhow::Result<Geocoder<YandexGeocoder>> {
    let cache = cache.open().context("opening geocode cache")?;
    let provider = YandexGeocoder::new(geocoder)?;
    Ok(Geocoder::new(cache, provider))
}

async fn handle_serve(args: ServeArgs) -> anyhow::Result<()> {
    let catalog = Catalog::load(&args.catalog)
        .with_context(|| format!("loading catalog {}", args.catalog.display()))?;
    let matcher = RestaurantMatcher::new(Arc::new(build_geocoder(&args.geocoder, &args.cache)?))
        .with_max_concurrent(args.max_concurrent_matches);
    let state = AppState::new(catalog, matcher);

    let listener = TcpListener::bind(args.bind).await?;
    info!(addr = %args.bind, "listening");

    let token = shutdown_token();
    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move {
            token.cancelled().await;
            info!("👍 received shutdown, draining connections…");
        })
        .await?;
    Ok(())
}

async fn handle_geocode(
    address: String,
    config: GeocoderConfig,
    cache: CacheConfig,
) -> anyhow::Result<()> {
    match build_geocoder(&config, &cache)?.resolve(&address).await? {
        Some(found) => println!("{found}"),
        None => println!("No match for `{address}`"),
    }
    Ok(())
}

async fn handle_match(
    catalog: PathBuf,
    address: String,
    items: Vec<NewOrderItem>,
    config: GeocoderConfig,
    cache: CacheConfig,
) -> anyhow::Result<()> {
    let catalog = Catalog::load(&catalog)
        .with_context(|| format!("loading catalog {}", catalog.display()))?;
    let mut registry = OrderRegistry::new();
    let order = registry.register(
        NewOrder {
            firstname: "cli".into(),
            lastname: "cli".into(),
            phonenumber: "-".into(),
            address,
            comment: String::new(),
            products: items,
        },
        &catalog,
    )?;

    let matcher = RestaurantMatcher::new(Arc::new(build_geocoder(&config, &cache)?));
    let ranked = matcher
        .match_order(order, &catalog, &catalog.menu_index())
        .await?;
    if ranked.is_empty() {
        println!("No restaurant can fulfil this order");
    } else {
        println!("Restaurants (nearest first):");
        for r in ranked {
            println!("{:>8.2} km  {}", r.distance_km, r.name);
        }
    }
    Ok(())
}

fn print_cache(dir: PathBuf) -> anyhow::Result<()> {
    let store = GeocodeStore::open(&dir)
        .with_context(|| format!("opening geocode cache {}", dir.display()))?;
    let entries = store.entries()?;
    println!("------ Geocode cache ({} entries) ------", entries.len());
    for (address, entry) in entries {
        println!("{}  ->  {}", address, entry.coordinates);
    }
    Ok(())
}

pub async fn run_cli() -> anyhow::Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Commands::Serve(args) => handle_serve(args).await,
        Commands::Geocode {
            address,
            geocoder,
            cache,
        } => handle_geocode(address, geocoder, cache).await,
        Commands::Distance {
            from_lon,
            from_lat,
            to_lon,
            to_lat,
        } => {
            let km = distance_km(
                Coordinates::new(from_lon, from_lat),
                Coordinates::new(to_lon, to_lat),
            );
            println!("{km:.3} km");
            Ok(())
        }
        Commands::Match {
            catalog,
            address,
            items,
            geocoder,
            cache,
        } => handle_match(catalog, address, items, geocoder, cache).await,
        Commands::Cache { dir } => print_cache(dir),
    }
}
