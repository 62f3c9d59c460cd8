// Copyright 2025 Chris Custine
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

mod config;

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use config::AppConfig;
use log::{error, info, warn};
use radar_core::{
    FixedLocation, ImageFetcher, IpLocationProvider, LocationProvider, NominatimGeocoder, OverlayCompositor,
    RadarSnapshotService, RedirectStationLookup, StationCode, StationResolver,
};

/// Composite NWS radar snapshot for the nearest radar station.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// Station code to render (skips location resolution)
    #[arg(short, long)]
    station: Option<String>,

    /// Center zoom factor
    #[arg(long)]
    scale: Option<f32>,

    /// Write the composite to this PNG file
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Latitude to resolve the station from
    #[arg(long, requires = "lon", allow_negative_numbers = true)]
    lat: Option<f64>,

    /// Longitude to resolve the station from
    #[arg(long, requires = "lat", allow_negative_numbers = true)]
    lon: Option<f64>,

    /// Always use the configured default station
    #[arg(long)]
    no_resolve: bool,

    /// Print the config file location and exit
    #[arg(long)]
    print_config: bool,
}

fn load_config() -> AppConfig {
    match AppConfig::load() {
        Ok(config) => config,
        Err(e) => {
            warn!("Failed to load config, using defaults: {}", e);
            AppConfig::default()
        }
    }
}

fn build_resolver(config: &AppConfig, args: &Args) -> Result<StationResolver, Box<dyn std::error::Error>> {
    let timeout = config.fetch_timeout();

    let fixed = if args.lat.is_some() {
        FixedLocation::from_override(args.lat, args.lon)
    } else {
        FixedLocation::from_override(config.override_latitude, config.override_longitude)
    };

    let mut locators: Vec<Arc<dyn LocationProvider>> = vec![Arc::new(fixed)];
    if config.use_ip_location {
        locators.push(Arc::new(IpLocationProvider::new(config.ip_location_url.clone(), timeout)?));
    }

    let geocoder = NominatimGeocoder::new(config.geocoder_url.clone(), timeout)?;
    let lookup = RedirectStationLookup::new(config.station_lookup_url.clone(), timeout)?;
    Ok(StationResolver::new(locators, Arc::new(geocoder), Arc::new(lookup)))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();

    if args.print_config {
        println!("{}", AppConfig::get_config_path()?.display());
        return Ok(());
    }

    let mut config = load_config();
    if let Some(scale) = args.scale {
        config.scale = scale;
    }

    let fetcher = ImageFetcher::new(config.fetch_timeout())?;
    let compositor = OverlayCompositor::new(Arc::new(fetcher), config.overlays.clone());
    info!("Compositing {} overlay layers", compositor.overlays().len());

    let mut service = RadarSnapshotService::new(compositor, config.snapshot_config());
    if !args.no_resolve && args.station.is_none() {
        service = service.with_resolver(build_resolver(&config, &args)?);
    }
    let service = Arc::new(service);

    let result = match args.station.as_deref() {
        Some(code) => {
            let station = StationCode::parse(code).ok_or_else(|| format!("invalid station code: {code:?}"))?;
            service.refresh_station(station).await
        }
        None => service.request().await,
    };

    let artifact = match result {
        Ok(artifact) => artifact,
        Err(e) => {
            error!("Snapshot failed: {}", e);
            return Err(e.into());
        }
    };

    let composite = &artifact.snapshot.composite;
    println!(
        "{} {}x{} updated {}",
        artifact.snapshot.station,
        composite.width(),
        composite.height(),
        artifact.timestamp
    );

    if let Some(path) = &args.output {
        composite.save_with_format(path, image::ImageFormat::Png)?;
        info!("Wrote {}", path.display());
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_args_station_override() {
        let args = Args::parse_from(["radar-snapshot", "--station", "LOT", "-o", "out.png"]);
        assert_eq!(args.station.as_deref(), Some("LOT"));
        assert_eq!(args.output, Some(PathBuf::from("out.png")));
        assert!(!args.no_resolve);
    }

    #[test]
    fn test_args_lat_requires_lon() {
        assert!(Args::try_parse_from(["radar-snapshot", "--lat", "42.0"]).is_err());

        let args = Args::try_parse_from(["radar-snapshot", "--lat", "42.0", "--lon", "-83.5"]).unwrap();
        assert_eq!(args.lon, Some(-83.5));
    }

    #[test]
    fn test_resolver_prefers_cli_position() {
        let args = Args::parse_from(["radar-snapshot", "--lat", "41.9", "--lon", "-87.6"]);
        let config = AppConfig {
            use_ip_location: false,
            ..Default::default()
        };
        let resolver = build_resolver(&config, &args).unwrap();
        assert!(format!("{resolver:?}").contains("configured location"));
    }
}
