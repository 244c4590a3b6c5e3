use std::path::Path;

use survey_store::feed::read_manifest;
use survey_store::loader::progress_channel;
use survey_store::{
    boot, Error, Feed, LabelStore, PageRequest, PointFilter, PointStore, PointType, Result, StoreConfig,
    StoreHandle, SurveyStats, VisitStore,
};

const USAGE: &str = "usage: survey-store <command>
  sync <feed.json> [manifest.json]
  search <text> [type] [prefecture] [page]
  stats
  labels <dir> [key]
  clear-history

Set SURVEY_STORE_CONFIG to a JSON config file, or SURVEY_STORE_DB / SURVEY_STORE_DIR.";

fn load_config() -> Result<StoreConfig> {
    match std::env::var_os("SURVEY_STORE_CONFIG") {
        Some(path) => StoreConfig::load(Path::new(&path)),
        None => Ok(StoreConfig::from_env()),
    }
}

/// `-` or an empty argument leaves that filter unset.
fn optional_arg(args: &[String], idx: usize) -> Option<&str> {
    args.get(idx)
        .map(String::as_str)
        .filter(|s| !s.is_empty() && *s != "-")
}

async fn run_sync(handle: &StoreHandle, args: &[String]) -> Result<()> {
    let feed_path = args
        .get(2)
        .ok_or_else(|| Error::InvalidArgument("sync needs a feed path".into()))?;
    let mut feed = Feed::read(Path::new(feed_path))?;
    if let Some(manifest_path) = args.get(3) {
        feed = feed.with_manifest(read_manifest(Path::new(manifest_path))?);
    }

    let (tx, rx) = progress_channel();
    let reporter = std::thread::spawn(move || {
        for progress in rx {
            match progress.total {
                Some(total) => log::info!("Loaded {}/{total} points", progress.loaded),
                None => log::info!("Loaded {} points", progress.loaded),
            }
        }
    });
    let outcome = boot(handle, feed, Some(tx)).await;
    let _ = reporter.join();

    let outcome = outcome?;
    match outcome.report {
        Some(report) => println!(
            "loaded {} points (dataset {}, batch {})",
            report.count, report.version, report.batch_id
        ),
        None => println!("points dataset already current"),
    }
    Ok(())
}

async fn run_search(handle: &StoreHandle, args: &[String]) -> Result<()> {
    let point_type = optional_arg(args, 3)
        .map(str::parse::<PointType>)
        .transpose()?;
    let page_index = match optional_arg(args, 5) {
        Some(raw) => raw
            .parse::<usize>()
            .map_err(|_| Error::InvalidArgument(format!("bad page number: {raw}")))?,
        None => 0,
    };
    let filter = PointFilter {
        name_contains: optional_arg(args, 2).map(str::to_string),
        kana_contains: None,
        point_type,
        prefecture: optional_arg(args, 4).map(str::to_string),
    };

    let store = PointStore::new(handle.clone());
    let page = store
        .search(filter, PageRequest::new(page_index, handle.config().page_size))
        .await?;
    for point in &page.items {
        println!(
            "{}\t{}\t{}\t{}\t{} {}",
            point.code, point.point_type, point.name, point.kana, point.prefecture, point.city
        );
    }
    println!(
        "page {}/{} ({} matches)",
        page.page_number(),
        page.total_pages().max(1),
        page.total
    );
    Ok(())
}

async fn run_stats(handle: &StoreHandle) -> Result<()> {
    let summary = SurveyStats::new(handle.clone()).summary().await?;
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}

async fn run_labels(handle: &StoreHandle, args: &[String]) -> Result<()> {
    let dir = args
        .get(2)
        .ok_or_else(|| Error::InvalidArgument("labels needs a directory".into()))?;
    let store = LabelStore::new(handle.clone());
    let loaded = store.ensure_loaded(Path::new(dir).to_path_buf()).await?;
    println!("{loaded} label dictionaries loaded");
    if let Some(key) = optional_arg(args, 3) {
        for (id, label) in store.labels(key).await? {
            println!("{id}\t{label}");
        }
    }
    Ok(())
}

async fn run_clear_history(handle: &StoreHandle) -> Result<()> {
    VisitStore::new(handle.clone()).clear_all().await?;
    println!("visit history and photos cleared");
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();

    let args: Vec<String> = std::env::args().collect();
    let handle = StoreHandle::new(load_config()?);

    let result = match args.get(1).map(|s| s.as_str()) {
        Some("sync") => run_sync(&handle, &args).await,
        Some("search") => run_search(&handle, &args).await,
        Some("stats") => run_stats(&handle).await,
        Some("labels") => run_labels(&handle, &args).await,
        Some("clear-history") => run_clear_history(&handle).await,
        _ => {
            eprintln!("{USAGE}");
            Ok(())
        }
    };
    handle.close();
    result
}
