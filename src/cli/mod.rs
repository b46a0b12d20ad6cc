pub mod carpool;
pub mod export;
pub mod identity;
pub mod import;
pub mod init;
pub mod invoice;
pub mod km;
pub mod period;
pub mod status;
pub mod summary;

use clap::{Parser, Subcommand};
use rust_decimal::Decimal;

use crate::amount::try_parse;
use crate::error::{Result, RimborsoError};
use crate::labels::Locale;
use crate::models::{Motive, PaymentMethod, RoutePreference};
use crate::session::Session;
use crate::settings::Settings;

pub(crate) fn load_session(settings: &Settings) -> Result<Session> {
    Session::load(&settings.session_path(), &settings.rates)
}

pub(crate) fn save_session(settings: &Settings, session: &Session) -> Result<()> {
    session.save(&settings.session_path())
}

/// Strict number parsing for command arguments ("15,50", "€ 12.40", "120").
pub(crate) fn parse_number(raw: &str, what: &str) -> Result<Decimal> {
    try_parse(raw).ok_or_else(|| RimborsoError::InvalidInput(format!("'{raw}' is not a valid {what}")))
}

#[derive(Parser)]
#[command(
    name = "rimborso",
    version,
    about = "Expense reports and kilometric reimbursements as XLSX, DOCX and PDF."
)]
pub struct Cli {
    /// Show debug logging on stderr
    #[arg(long, short, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Write settings and the built-in document templates.
    Init {
        /// Path for session and exports (default: ~/Documents/rimborso)
        #[arg(long = "data-dir")]
        data_dir: Option<String>,
        /// Directory holding Rimborso_Spese.xlsx and Rimborso_Spese.docx
        #[arg(long = "templates-dir")]
        templates_dir: Option<String>,
        /// Label language for generated documents
        #[arg(long, value_enum)]
        locale: Option<Locale>,
        /// Overwrite templates that already exist
        #[arg(long)]
        force: bool,
    },
    /// Show or set who the report is for.
    Identity {
        #[arg(long)]
        client: Option<String>,
        /// Subject of the activity
        #[arg(long)]
        activity: Option<String>,
        #[arg(long)]
        surname: Option<String>,
        #[arg(long = "name")]
        first_name: Option<String>,
        /// Office or site
        #[arg(long)]
        office: Option<String>,
    },
    /// Show or set the report period and output filename.
    Period {
        /// First day: DD/MM/YYYY or YYYY-MM-DD
        #[arg(long)]
        start: Option<String>,
        /// Last day: DD/MM/YYYY or YYYY-MM-DD
        #[arg(long)]
        end: Option<String>,
        /// Base name for exported files, without extension
        #[arg(long)]
        filename: Option<String>,
        /// Go back to the period and filename derived from the entries
        #[arg(long)]
        clear: bool,
    },
    /// Manage expense entries (invoices and receipts).
    Invoice {
        #[command(subcommand)]
        command: InvoiceCommands,
    },
    /// Manage kilometric trips.
    Km {
        #[command(subcommand)]
        command: KmCommands,
    },
    /// Plan a shared ride that picks friends up on the way.
    Carpool {
        /// Friend and address as NAME=ADDRESS (repeatable)
        #[arg(long = "friend", required = true)]
        friends: Vec<String>,
        /// Friend who drives and starts the route
        #[arg(long)]
        driver: String,
        /// Friend to pick up (repeatable)
        #[arg(long = "pickup")]
        pickups: Vec<String>,
        /// Destination friend
        #[arg(long = "to-friend", conflicts_with = "to_address")]
        to_friend: Option<String>,
        /// Destination address
        #[arg(long = "to-address")]
        to_address: Option<String>,
        /// Let the routing service reorder the pickups
        #[arg(long)]
        optimize: bool,
        #[arg(long, value_enum, default_value = "recommended")]
        preference: RoutePreference,
    },
    /// Show totals for the current session.
    Summary,
    /// Render the report documents.
    Export {
        #[command(subcommand)]
        command: ExportCommands,
    },
    /// Replace entries with a session JSON file (web form export).
    Import {
        /// Path to the JSON file
        file: String,
    },
    /// Show settings, template and session status.
    Status,
}

#[derive(Subcommand)]
pub enum InvoiceCommands {
    /// Add an expense entry.
    Add {
        /// Amount, e.g. 15,50 or 1.234,56
        amount: String,
        /// Date: DD/MM/YYYY or YYYY-MM-DD
        #[arg(long)]
        date: Option<String>,
        /// Description
        #[arg(long, default_value = "")]
        title: String,
        #[arg(long, value_enum, default_value = "electronic")]
        payment: PaymentMethod,
        #[arg(long, default_value = "")]
        city: String,
        #[arg(long, value_enum, default_value = "other")]
        motive: Motive,
        /// Already paid by the company
        #[arg(long)]
        prepaid: bool,
        /// Backed by an invoice addressed to the company
        #[arg(long)]
        invoice: bool,
    },
    /// Change fields of an expense entry.
    Edit {
        /// Entry index (shown in `rimborso invoice list`)
        index: usize,
        #[arg(long)]
        amount: Option<String>,
        #[arg(long)]
        date: Option<String>,
        #[arg(long)]
        title: Option<String>,
        #[arg(long, value_enum)]
        payment: Option<PaymentMethod>,
        #[arg(long)]
        city: Option<String>,
        #[arg(long, value_enum)]
        motive: Option<Motive>,
        #[arg(long)]
        prepaid: Option<bool>,
        #[arg(long)]
        invoice: Option<bool>,
    },
    /// Delete an expense entry. Later entries move up by one.
    Delete {
        /// Entry index (shown in `rimborso invoice list`)
        index: usize,
    },
    /// List expense entries.
    List,
}

#[derive(Subcommand)]
pub enum KmCommands {
    /// Add a trip with a known distance.
    Add {
        /// Kilometres driven
        km: String,
        /// Date: DD/MM/YYYY or YYYY-MM-DD
        #[arg(long)]
        date: Option<String>,
        #[arg(long, default_value = "")]
        brand: String,
        #[arg(long, default_value = "")]
        model: String,
        /// Engine displacement in cc
        #[arg(long, default_value = "")]
        engine: String,
        #[arg(long = "from", default_value = "")]
        start: String,
        #[arg(long = "to", default_value = "")]
        end: String,
        /// Intermediate stop (repeatable)
        #[arg(long = "via")]
        waypoints: Vec<String>,
        /// Company car instead of a personal one
        #[arg(long)]
        company: bool,
        #[arg(long, value_enum, default_value = "electronic")]
        payment: PaymentMethod,
    },
    /// Change fields of a trip. The amount follows km and car type.
    Edit {
        /// Trip index (shown in `rimborso km list`)
        index: usize,
        #[arg(long)]
        km: Option<String>,
        #[arg(long)]
        date: Option<String>,
        #[arg(long)]
        brand: Option<String>,
        #[arg(long)]
        model: Option<String>,
        #[arg(long)]
        engine: Option<String>,
        #[arg(long = "from")]
        start: Option<String>,
        #[arg(long = "to")]
        end: Option<String>,
        /// Replace the intermediate stops (repeatable)
        #[arg(long = "via")]
        waypoints: Option<Vec<String>>,
        #[arg(long)]
        company: Option<bool>,
        #[arg(long, value_enum)]
        payment: Option<PaymentMethod>,
    },
    /// Switch a trip between personal and company car.
    Toggle {
        index: usize,
    },
    /// Delete a trip. Later trips move up by one.
    Delete {
        index: usize,
    },
    /// List trips.
    List,
    /// Delete every trip.
    Reset,
    /// Ask the routing service for the distance and record the trip.
    Route {
        /// Start as "City" or "City, street address"
        #[arg(long = "from")]
        start: String,
        /// End as "City" or "City, street address"
        #[arg(long = "to")]
        end: String,
        /// Intermediate stop (repeatable)
        #[arg(long = "via")]
        waypoints: Vec<String>,
        #[arg(long, value_enum, default_value = "recommended")]
        preference: RoutePreference,
        #[arg(long)]
        date: Option<String>,
        #[arg(long, default_value = "")]
        brand: String,
        #[arg(long, default_value = "")]
        model: String,
        #[arg(long, default_value = "")]
        engine: String,
        /// Show the route without recording a trip
        #[arg(long = "dry-run")]
        dry_run: bool,
    },
}

#[derive(Subcommand)]
pub enum ExportCommands {
    /// Fill the spreadsheet template.
    Xlsx {
        /// Output file path
        #[arg(long)]
        output: Option<String>,
    },
    /// Fill the Word template.
    Docx {
        /// Output file path
        #[arg(long)]
        output: Option<String>,
    },
    /// Lay out the PDF report.
    #[cfg(feature = "pdf")]
    Pdf {
        /// Output file path
        #[arg(long)]
        output: Option<String>,
    },
    /// Write every format to a directory.
    All {
        /// Output directory (default: <data_dir>/exports)
        #[arg(long = "output-dir")]
        output_dir: Option<String>,
    },
}
