//! `gridwatt list` - display stored readings.

use crate::cli::CliContext;
use crate::cli::args::ListArgs;
use crate::core::utility::Utility;
use crate::error::Result;
use crate::storage::store::UsageStore;

/// # Errors
/// Returns an error if the database cannot be read.
pub fn execute(ctx: &CliContext, args: &ListArgs) -> Result<()> {
    let store = UsageStore::open(&ctx.db_path)?;

    let services: Vec<Utility> = match &args.service {
        Some(name) => vec![Utility::from_cli_name(name)?],
        None => Utility::ALL.to_vec(),
    };

    for service in services {
        let readings = store.list_by_service(service)?;
        if readings.is_empty() {
            println!("No data found for {}", service.display_name());
            continue;
        }

        println!();
        println!("{} usage:", service.display_name());
        println!("----------------------------------------------------");
        println!("{:<12}  {:<20}  {:>10}  {:>4}", "Date", "Start", "kWh", "Pub");
        println!("----------------------------------------------------");

        let mut total = 0.0;
        for reading in &readings {
            let start = reading
                .start_time
                .map_or_else(String::new, |t| t.format("%Y-%m-%d %H:%M").to_string());
            println!(
                "{:<12}  {:<20}  {:>10.2}  {:>4}",
                reading.date.format("%Y-%m-%d"),
                start,
                reading.kwh,
                if reading.published { "yes" } else { "no" }
            );
            total += reading.kwh;
        }

        println!("----------------------------------------------------");
        println!("Total: {:.2} kWh ({} readings)", total, readings.len());
    }

    Ok(())
}
