use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use seedscan::config::{BalanceMode, Config};
use seedscan::logging::{init_tracing, LogSettings};
use seedscan::services::{
    BalanceChecker, BalanceSource, HttpBalanceSource, HttpPriceSource, PriceSource,
    ScanOrchestrator, SimulatedBalanceSource, StaticPriceSource, StrategyController,
};
use seedscan::store::SqliteStore;
use seedscan::Wordlist;

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();
    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("invalid configuration: {e}");
            std::process::exit(2);
        }
    };
    let _log_guard = init_tracing(&LogSettings::from_env(&config.log_level));

    let store = match SqliteStore::open(&config.db_path).await {
        Ok(store) => Arc::new(store),
        Err(e) => {
            tracing::error!(
                error = %e,
                path = %config.db_path.display(),
                "cannot open state store"
            );
            std::process::exit(1);
        }
    };

    let checker_config = config.balance_checker_config();
    let ok = match config.balance_mode {
        BalanceMode::Simulated => {
            let checker = BalanceChecker::new(
                SimulatedBalanceSource::new(config.simulated_hit_rate),
                StaticPriceSource::default(),
                checker_config,
            );
            run(&config, store.clone(), checker).await
        }
        BalanceMode::Live => {
            let checker = BalanceChecker::new(
                HttpBalanceSource::new(config.balance_endpoint.clone()),
                HttpPriceSource::new(config.price_endpoint.clone()),
                checker_config,
            );
            run(&config, store.clone(), checker).await
        }
    };

    store.close().await;
    if !ok {
        std::process::exit(1);
    }
}

async fn run<B, P>(config: &Config, store: Arc<SqliteStore>, checker: BalanceChecker<B, P>) -> bool
where
    B: BalanceSource,
    P: PriceSource,
{
    let controller = Arc::new(StrategyController::new(store));
    let orchestrator =
        ScanOrchestrator::new(controller, Arc::new(checker), Arc::new(Wordlist::bip39_english()));

    let cancel = Arc::new(AtomicBool::new(false));
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("interrupt received, stopping after the current phrase");
                cancel.store(true, Ordering::Relaxed);
            }
        });
    }

    let request = config.batch_request();
    let total = request.count.max(1);
    let step = (total / 10).max(1);
    let on_progress = move |p: seedscan::services::BatchProgress| {
        if p.current % step == 0 || p.current == p.total {
            tracing::info!(current = p.current, total = p.total, found = p.found, "progress");
        }
    };

    match orchestrator
        .batch_scan(&request, &cancel, Some(&on_progress))
        .await
    {
        Ok(summary) => {
            for outcome in &summary.found_list {
                tracing::info!(phrase = %outcome.phrase, usd = outcome.total_usd(), "found");
            }
            let report = orchestrator.report().await;
            match serde_json::to_string(&report) {
                Ok(json) => tracing::info!(report = %json, "learning report"),
                Err(e) => tracing::warn!(error = %e, "cannot render learning report"),
            }
            if !report.health.healthy {
                for issue in &report.health.issues {
                    tracing::warn!(%issue, "health");
                }
            }
            summary.persisted
        }
        Err(e) => {
            tracing::error!(error = %e, "batch failed");
            false
        }
    }
}
