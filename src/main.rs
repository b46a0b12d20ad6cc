mod amount;
mod cli;
mod docx;
mod error;
mod fmt;
mod labels;
mod models;
mod package;
#[cfg(feature = "pdf")]
mod pdf;
mod reports;
mod routing;
mod session;
mod settings;
mod snapshot;
mod xlsx;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use cli::export::Format;
use cli::{Cli, Commands, ExportCommands, InvoiceCommands, KmCommands};

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact()
        .init();
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let result = match cli.command {
        Commands::Init {
            data_dir,
            templates_dir,
            locale,
            force,
        } => cli::init::run(data_dir, templates_dir, locale, force),
        Commands::Identity {
            client,
            activity,
            surname,
            first_name,
            office,
        } => cli::identity::run(cli::identity::IdentityUpdate {
            client,
            activity,
            surname,
            first_name,
            office,
        }),
        Commands::Period {
            start,
            end,
            filename,
            clear,
        } => cli::period::run(start, end, filename, clear),
        Commands::Invoice { command } => match command {
            InvoiceCommands::Add {
                amount,
                date,
                title,
                payment,
                city,
                motive,
                prepaid,
                invoice,
            } => cli::invoice::add(models::InvoiceEntry {
                date: date.unwrap_or_default(),
                title,
                amount,
                payment_method: payment,
                city,
                motive,
                prepaid,
                is_invoice: invoice,
            }),
            InvoiceCommands::Edit {
                index,
                amount,
                date,
                title,
                payment,
                city,
                motive,
                prepaid,
                invoice,
            } => cli::invoice::edit(
                index,
                cli::invoice::InvoicePatch {
                    amount,
                    date,
                    title,
                    payment,
                    city,
                    motive,
                    prepaid,
                    invoice,
                },
            ),
            InvoiceCommands::Delete { index } => cli::invoice::delete(index),
            InvoiceCommands::List => cli::invoice::list(),
        },
        Commands::Km { command } => match command {
            KmCommands::Add {
                km,
                date,
                brand,
                model,
                engine,
                start,
                end,
                waypoints,
                company,
                payment,
            } => cli::km::add(cli::km::TripArgs {
                km: Some(km),
                date,
                brand: Some(brand),
                model: Some(model),
                engine: Some(engine),
                start: Some(start),
                end: Some(end),
                waypoints: Some(waypoints),
                company: Some(company),
                payment: Some(payment),
            }),
            KmCommands::Edit {
                index,
                km,
                date,
                brand,
                model,
                engine,
                start,
                end,
                waypoints,
                company,
                payment,
            } => cli::km::edit(
                index,
                cli::km::TripArgs {
                    km,
                    date,
                    brand,
                    model,
                    engine,
                    start,
                    end,
                    waypoints,
                    company,
                    payment,
                },
            ),
            KmCommands::Toggle { index } => cli::km::toggle(index),
            KmCommands::Delete { index } => cli::km::delete(index),
            KmCommands::List => cli::km::list(),
            KmCommands::Reset => cli::km::reset(),
            KmCommands::Route {
                start,
                end,
                waypoints,
                preference,
                date,
                brand,
                model,
                engine,
                dry_run,
            } => cli::km::route(cli::km::RouteArgs {
                start,
                end,
                waypoints,
                preference,
                date,
                car: routing::CarDetails {
                    brand,
                    model,
                    engine,
                },
                dry_run,
            }),
        },
        Commands::Carpool {
            friends,
            driver,
            pickups,
            to_friend,
            to_address,
            optimize,
            preference,
        } => cli::carpool::run(cli::carpool::CarpoolArgs {
            friends,
            driver,
            pickups,
            to_friend,
            to_address,
            optimize,
            preference,
        }),
        Commands::Summary => cli::summary::run(),
        Commands::Export { command } => match command {
            ExportCommands::Xlsx { output } => cli::export::one(Format::Xlsx, output).map(|_| ()),
            ExportCommands::Docx { output } => cli::export::one(Format::Docx, output).map(|_| ()),
            #[cfg(feature = "pdf")]
            ExportCommands::Pdf { output } => cli::export::one(Format::Pdf, output).map(|_| ()),
            ExportCommands::All { output_dir } => cli::export::all(output_dir).map(|_| ()),
        },
        Commands::Import { file } => cli::import::run(&file),
        Commands::Status => cli::status::run(),
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}
