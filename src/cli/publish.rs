//! `gridwatt publish` - send stored readings to the dashboard.

use chrono::{Duration, Local, NaiveDate};

use crate::cli::CliContext;
use crate::cli::args::PublishArgs;
use crate::core::utility::Utility;
use crate::error::{GridwattError, Result};
use crate::publish::Publisher;
use crate::storage::config::Config;
use crate::storage::store::UsageStore;

/// # Errors
/// Returns an error when configuration or storage access fails; individual
/// publish failures are reported and skipped.
pub async fn execute(ctx: &CliContext, args: &PublishArgs) -> Result<()> {
    let config = Config::load_from(&ctx.config_path)?;
    let store = UsageStore::open(&ctx.db_path)?;

    let explicit = args.service.is_some();
    let services: Vec<Utility> = match &args.service {
        Some(name) => vec![Utility::from_cli_name(name)?],
        None => Utility::ALL.to_vec(),
    };

    let since = args.since.as_deref().map(parse_date_arg).transpose()?;
    let until = args.until.as_deref().map(parse_date_arg).transpose()?;

    let mut total_published = 0;
    for service in services {
        let Some(dashboard) = config.utility(service).dashboard else {
            if explicit {
                return Err(GridwattError::DashboardNotConfigured {
                    utility: service.cli_name().to_string(),
                });
            }
            continue;
        };
        let publisher = Publisher::new(&dashboard)?;

        let readings = if args.all {
            store.list_by_service(service)?
        } else {
            store.list_unpublished(service)?
        };

        let mut filtered: Vec<_> = readings
            .into_iter()
            .filter(|r| since.is_none_or(|d| r.date >= d))
            .filter(|r| until.is_none_or(|d| r.date <= d))
            .collect();

        if filtered.is_empty() {
            println!("Nothing to publish for {}", service.display_name());
            continue;
        }

        if args.limit > 0 && filtered.len() > args.limit {
            filtered.truncate(args.limit);
            println!("Limiting to {} readings", args.limit);
        }

        println!(
            "Publishing {} readings for {}...",
            filtered.len(),
            service.display_name()
        );

        let mut published = 0;
        for (i, reading) in filtered.iter().enumerate() {
            print!(
                "[{}/{}] {} ({:.2} kWh)... ",
                i + 1,
                filtered.len(),
                reading.date.format("%Y-%m-%d"),
                reading.kwh
            );
            match publisher.publish(reading).await {
                Ok(()) => {
                    store.mark_published(reading.id)?;
                    println!("ok");
                    published += 1;
                }
                Err(e) => {
                    println!("failed: {e}");
                    tracing::warn!(id = reading.id, error = %e, "publish failed");
                }
            }
        }

        println!(
            "Published {published}/{} readings for {}",
            filtered.len(),
            service.display_name()
        );
        total_published += published;
    }

    println!("Total readings published: {total_published}");
    Ok(())
}

/// Accepts `YYYY-MM-DD` or a relative `Nd` (N days ago).
fn parse_date_arg(s: &str) -> Result<NaiveDate> {
    if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return Ok(date);
    }

    if let Some(days) = s.strip_suffix('d').and_then(|n| n.parse::<i64>().ok()) {
        return Ok(Local::now().date_naive() - Duration::days(days));
    }

    Err(GridwattError::Config(format!(
        "invalid date: {s} (use YYYY-MM-DD or Nd for N days ago)"
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absolute_dates_parse() {
        assert_eq!(
            parse_date_arg("2024-03-01").unwrap(),
            NaiveDate::from_ymd_opt(2024, 3, 1).unwrap()
        );
    }

    #[test]
    fn relative_days_parse() {
        let expected = Local::now().date_naive() - Duration::days(7);
        assert_eq!(parse_date_arg("7d").unwrap(), expected);
    }

    #[test]
    fn garbage_is_rejected() {
        assert!(parse_date_arg("yesterday").is_err());
        assert!(parse_date_arg("d").is_err());
    }
}
