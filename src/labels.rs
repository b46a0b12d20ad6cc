use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Locale {
    #[default]
    It,
    En,
}

/// Display strings shared by the renderers and the terminal summary.
pub struct Labels {
    pub period: &'static str,
    pub km_section: &'static str,
    pub invoice_section: &'static str,
    pub km_headers: [&'static str; 8],
    pub invoice_headers: [&'static str; 6],
    pub personal_car: &'static str,
    pub company_car: &'static str,
    pub personal_short: &'static str,
    pub company_short: &'static str,
    pub total: &'static str,
    pub grand_total: &'static str,
    pub food: &'static str,
    pub transportation: &'static str,
    pub housing: &'static str,
    pub other: &'static str,
    pub prepaid: &'static str,
    pub reimbursable: &'static str,
    pub yes: &'static str,
    pub no: &'static str,
    pub electronic: &'static str,
    pub cash: &'static str,
    pub unspecified_date: &'static str,
    pub months: [&'static str; 12],
}

const IT: Labels = Labels {
    period: "Periodo",
    km_section: "Riepilogo Rimborsi Chilometrici",
    invoice_section: "Riepilogo Fatture e Scontrini",
    km_headers: [
        "Data",
        "Veicolo",
        "Partenza",
        "Tappe",
        "Arrivo",
        "KM",
        "Tipo Auto",
        "Importo (€)",
    ],
    invoice_headers: ["Data", "Descrizione", "Pagamento", "Città", "Motivo", "Importo (€)"],
    personal_car: "Auto Personale",
    company_car: "Auto Aziendale",
    personal_short: "Personale",
    company_short: "Aziendale",
    total: "TOTALE",
    grand_total: "TOTALE COMPLESSIVO",
    food: "Vitto",
    transportation: "Trasporto",
    housing: "Alloggio",
    other: "Altro",
    prepaid: "Prepagata",
    reimbursable: "Totale (escl. prepagata)",
    yes: "Sì",
    no: "No",
    electronic: "Elettronico",
    cash: "Contanti",
    unspecified_date: "Data non specificata",
    months: [
        "GENNAIO",
        "FEBBRAIO",
        "MARZO",
        "APRILE",
        "MAGGIO",
        "GIUGNO",
        "LUGLIO",
        "AGOSTO",
        "SETTEMBRE",
        "OTTOBRE",
        "NOVEMBRE",
        "DICEMBRE",
    ],
};

const EN: Labels = Labels {
    period: "Period",
    km_section: "Kilometric Reimbursements",
    invoice_section: "Invoices and Receipts",
    km_headers: [
        "Date",
        "Vehicle",
        "Start",
        "Stops",
        "End",
        "KM",
        "Car type",
        "Amount (€)",
    ],
    invoice_headers: ["Date", "Description", "Payment", "City", "Motive", "Amount (€)"],
    personal_car: "Personal car",
    company_car: "Company car",
    personal_short: "Personal",
    company_short: "Company",
    total: "TOTAL",
    grand_total: "GRAND TOTAL",
    food: "Food",
    transportation: "Transportation",
    housing: "Housing",
    other: "Other",
    prepaid: "Prepaid",
    reimbursable: "Total (excl. prepaid)",
    yes: "Yes",
    no: "No",
    electronic: "Electronic",
    cash: "Cash",
    unspecified_date: "Unspecified date",
    months: [
        "JANUARY",
        "FEBRUARY",
        "MARCH",
        "APRIL",
        "MAY",
        "JUNE",
        "JULY",
        "AUGUST",
        "SEPTEMBER",
        "OCTOBER",
        "NOVEMBER",
        "DECEMBER",
    ],
};

impl Locale {
    pub fn labels(self) -> &'static Labels {
        match self {
            Locale::It => &IT,
            Locale::En => &EN,
        }
    }

    /// Month name for a 1-based month number.
    pub fn month_name(self, month: u32) -> &'static str {
        let idx = (month.clamp(1, 12) - 1) as usize;
        self.labels().months[idx]
    }
}
