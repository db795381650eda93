use std::path::PathBuf;
use std::sync::Arc;

use fetchurl::{load_config, FetchConfig, FetchResult, Fetcher};
use log::{debug, error};

fn print_usage() {
    eprintln!("Usage: fetchurl [--config <path>] <url>...");
}

fn main() {
    env_logger::init();

    let mut config_path: Option<PathBuf> = None;
    let mut urls = vec![];
    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        if arg == "--config" || arg == "-c" {
            match args.next() {
                Some(path) => config_path = Some(PathBuf::from(path)),
                None => {
                    print_usage();
                    std::process::exit(1);
                }
            }
        } else if arg == "--help" || arg == "-h" {
            print_usage();
            return;
        } else {
            urls.push(arg);
        }
    }

    if urls.is_empty() {
        print_usage();
        std::process::exit(1);
    }

    let config = match config_path {
        Some(path) => match load_config(&path) {
            Ok(config) => config,
            Err(e) => {
                error!("Failed to load config {}: {}", path.display(), e);
                std::process::exit(1);
            }
        },
        None => FetchConfig::default(),
    };
    debug!("Using config: {:?}", &config);

    let fetcher = match Fetcher::new(&config) {
        Ok(fetcher) => Arc::new(fetcher),
        Err(e) => {
            error!("{}", e);
            std::process::exit(1);
        }
    };
    debug!("Engine: {}", fetcher.engine_version());

    let handles: Vec<_> = urls
        .into_iter()
        .map(|url| {
            let fetcher = fetcher.clone();
            std::thread::spawn(move || fetcher.fetch(&url))
        })
        .collect();

    let mut failed = false;
    for handle in handles {
        let result: FetchResult = match handle.join() {
            Ok(Ok(result)) => result,
            Ok(Err(e)) => {
                error!("{}", e);
                failed = true;
                continue;
            }
            Err(_) => {
                error!("Fetch thread panicked");
                failed = true;
                continue;
            }
        };
        match serde_json::to_string(&result) {
            Ok(json) => println!("{}", json),
            Err(e) => {
                error!("Failed to encode result: {}", e);
                failed = true;
            }
        }
    }

    if failed {
        std::process::exit(1);
    }
}
