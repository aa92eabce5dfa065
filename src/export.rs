use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::Local;
use serde::{Deserialize, Serialize};
use tera::{Context, Tera};

use crate::model::Invoice;

// Embed template at compile time to ensure availability
pub const DEFAULT_TEMPLATE: &str = include_str!("../templates/invoice.tera");

/// Letterhead printed at the top of every invoice, loaded from
/// `sender.toml` in the data root.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct SenderConfig {
    pub name: String,
    pub tagline: String,
    pub address1: String,
    pub address2: String,
    pub phone: String,
    pub tax_id: String,
    pub bank_info: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaperSize {
    Letter,
    A4,
}

impl PaperSize {
    fn typst_name(self) -> &'static str {
        match self {
            PaperSize::Letter => "us-letter",
            PaperSize::A4 => "a4",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Orientation {
    Portrait,
    Landscape,
}

/// Options recognized by a document renderer. `filename` must be unique
/// per invocation; the default incorporates a timestamp and a session
/// counter so back-to-back exports never overwrite each other.
#[derive(Debug, Clone)]
pub struct ExportOptions {
    /// Page margin in inches.
    pub margin: f64,
    /// Output name without extension.
    pub filename: String,
    /// Raster image quality, 0.0 to 1.0.
    pub image_quality: f64,
    /// Raster render scale, integer >= 1.
    pub render_scale: u32,
    pub paper: PaperSize,
    pub orientation: Orientation,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            margin: 1.0,
            filename: unique_filename(),
            image_quality: 0.98,
            render_scale: 2,
            paper: PaperSize::Letter,
            orientation: Orientation::Portrait,
        }
    }
}

impl ExportOptions {
    /// Brings out-of-range values back into contract: quality clamped to
    /// 0.0..=1.0, scale at least 1, non-finite margin back to the default.
    pub fn normalized(mut self) -> Self {
        if !self.image_quality.is_finite() {
            self.image_quality = 0.0;
        }
        self.image_quality = self.image_quality.clamp(0.0, 1.0);
        self.render_scale = self.render_scale.max(1);
        if !self.margin.is_finite() {
            self.margin = 1.0;
        }
        self
    }
}

/// Timestamped name plus a session counter, unique per invocation.
pub fn unique_filename() -> String {
    static SEQ: AtomicU64 = AtomicU64::new(1);
    let seq = SEQ.fetch_add(1, Ordering::Relaxed);
    format!("invoice-{}-{:03}", Local::now().format("%Y%m%d-%H%M%S"), seq)
}

/// External collaborator that turns rendered markup into a saved file.
/// The caller issues one request per user action and does not retry;
/// whatever the renderer reports comes back as the `io::Error`.
pub trait DocumentRenderer {
    fn save(&self, markup: &str, opts: &ExportOptions) -> io::Result<PathBuf>;
}

/// Renders by writing a `.typ` file next to the output and shelling out
/// to `typst compile`.
pub struct TypstRenderer {
    output_dir: PathBuf,
}

impl TypstRenderer {
    pub fn new(output_dir: PathBuf) -> Self {
        Self { output_dir }
    }

    pub fn is_available() -> bool {
        Command::new("typst").arg("--version").output().is_ok()
    }
}

impl DocumentRenderer for TypstRenderer {
    fn save(&self, markup: &str, opts: &ExportOptions) -> io::Result<PathBuf> {
        let opts = opts.clone().normalized();
        fs::create_dir_all(&self.output_dir)?;

        let typ_path = self.output_dir.join(format!("{}.typ", opts.filename));
        let pdf_path = self.output_dir.join(format!("{}.pdf", opts.filename));
        fs::write(&typ_path, markup)?;

        // Typst embeds images losslessly, so image_quality has no effect
        // on this backend; render_scale maps onto raster ppi.
        let ppi = 144 * opts.render_scale;
        let status = Command::new("typst")
            .arg("compile")
            .arg("--ppi")
            .arg(ppi.to_string())
            .arg(&typ_path)
            .arg(&pdf_path)
            .status()?;

        if !status.success() {
            return Err(io::Error::other("typst compile failed"));
        }
        Ok(pdf_path)
    }
}

#[derive(Serialize)]
struct ItemRow {
    description: String,
    quantity: String,
    unit_price: String,
    amount: String,
}

/// Everything the template sees. All monetary values arrive as
/// two-decimal strings; formatting never happens in the model.
#[derive(Serialize)]
pub struct InvoiceContext {
    invoice_no: String,
    date: String,
    sender: SenderConfig,
    client_name: String,
    company_name: String,
    address: String,
    notes: String,
    items: Vec<ItemRow>,
    subtotal: String,
    tax_rate: String,
    tax_amount: String,
    adjustment: String,
    total: String,
    paper: String,
    flipped: bool,
    margin_in: f64,
}

impl InvoiceContext {
    pub fn build(invoice: &Invoice, sender: &SenderConfig, opts: &ExportOptions) -> Self {
        let now = Local::now();
        let items = invoice
            .items()
            .iter()
            .map(|item| ItemRow {
                description: item.description.clone(),
                quantity: format!("{}", item.quantity),
                unit_price: format!("{:.2}", item.unit_price),
                amount: format!("{:.2}", item.amount()),
            })
            .collect();

        Self {
            invoice_no: format!("INV-{}", now.format("%Y%m%d")),
            date: now.format("%m/%d/%Y").to_string(),
            sender: sender.clone(),
            client_name: invoice.client_name.clone(),
            company_name: invoice.company_name.clone(),
            address: invoice.address.clone(),
            notes: invoice.notes.clone(),
            items,
            subtotal: format!("{:.2}", invoice.subtotal()),
            tax_rate: format!("{}", invoice.tax_rate()),
            tax_amount: format!("{:.2}", invoice.tax_amount()),
            adjustment: format!("{:.2}", invoice.adjustment()),
            total: format!("{:.2}", invoice.total()),
            paper: opts.paper.typst_name().to_string(),
            flipped: opts.orientation == Orientation::Landscape,
            margin_in: opts.margin,
        }
    }
}

/// Renders the invoice through the template directory, materializing the
/// embedded default template on first run so users can customize it.
pub fn render_invoice(
    template_dir: &Path,
    invoice: &Invoice,
    sender: &SenderConfig,
    opts: &ExportOptions,
) -> io::Result<String> {
    if !template_dir.exists() {
        fs::create_dir_all(template_dir)?;
    }
    let template_path = template_dir.join("invoice.tera");
    if !template_path.exists() {
        fs::write(&template_path, DEFAULT_TEMPLATE)?;
    }

    let glob = template_dir.join("*.tera");
    let tera = Tera::new(&glob.to_string_lossy()).map_err(io::Error::other)?;
    render_with(&tera, invoice, sender, opts)
}

fn render_with(
    tera: &Tera,
    invoice: &Invoice,
    sender: &SenderConfig,
    opts: &ExportOptions,
) -> io::Result<String> {
    let data = InvoiceContext::build(invoice, sender, &opts.clone().normalized());
    let context = Context::from_serialize(&data).map_err(io::Error::other)?;
    tera.render("invoice.tera", &context).map_err(io::Error::other)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ItemField;

    fn test_sender() -> SenderConfig {
        SenderConfig {
            name: "Test Works".into(),
            tagline: "".into(),
            address1: "1 Test Street".into(),
            address2: "Testville".into(),
            phone: "".into(),
            tax_id: "".into(),
            bank_info: "".into(),
        }
    }

    #[test]
    fn default_filenames_are_unique_per_invocation() {
        let a = ExportOptions::default().filename;
        let b = ExportOptions::default().filename;
        let c = unique_filename();
        assert_ne!(a, b);
        assert_ne!(b, c);
        assert_ne!(a, c);
    }

    #[test]
    fn normalized_clamps_out_of_range_options() {
        let opts = ExportOptions {
            image_quality: 3.5,
            render_scale: 0,
            margin: f64::NAN,
            ..ExportOptions::default()
        }
        .normalized();
        assert_eq!(opts.image_quality, 1.0);
        assert_eq!(opts.render_scale, 1);
        assert_eq!(opts.margin, 1.0);

        let opts = ExportOptions {
            image_quality: -0.5,
            ..ExportOptions::default()
        }
        .normalized();
        assert_eq!(opts.image_quality, 0.0);
    }

    #[test]
    fn context_formats_amounts_to_two_decimals() {
        let mut invoice = Invoice::new();
        let id = invoice.add_item();
        invoice.update_item(id, ItemField::Description("Welding".into()));
        invoice.update_item(id, ItemField::Quantity(2.0));
        invoice.update_item(id, ItemField::UnitPrice(49.995));
        invoice.set_tax_rate(10.0);

        let ctx = InvoiceContext::build(&invoice, &test_sender(), &ExportOptions::default());
        assert_eq!(ctx.items[0].unit_price, "50.00");
        assert_eq!(ctx.items[0].amount, "99.99");
        assert_eq!(ctx.subtotal, "99.99");
        assert_eq!(ctx.total, "109.99");
    }

    #[test]
    fn negative_totals_are_shown_as_is() {
        let mut invoice = Invoice::new();
        invoice.set_adjustment(40.0);
        let ctx = InvoiceContext::build(&invoice, &test_sender(), &ExportOptions::default());
        assert_eq!(ctx.subtotal, "0.00");
        assert_eq!(ctx.total, "-40.00");
    }

    #[test]
    fn landscape_sets_the_flipped_flag() {
        let invoice = Invoice::new();
        let opts = ExportOptions {
            orientation: Orientation::Landscape,
            paper: PaperSize::A4,
            ..ExportOptions::default()
        };
        let ctx = InvoiceContext::build(&invoice, &test_sender(), &opts);
        assert!(ctx.flipped);
        assert_eq!(ctx.paper, "a4");
    }

    #[test]
    fn embedded_template_renders() {
        let mut tera = Tera::default();
        tera.add_raw_template("invoice.tera", DEFAULT_TEMPLATE).unwrap();

        let mut invoice = Invoice::new();
        invoice.client_name = "Jordan".into();
        let id = invoice.add_item();
        invoice.update_item(id, ItemField::Description("Machining".into()));
        invoice.update_item(id, ItemField::Quantity(3.0));
        invoice.update_item(id, ItemField::UnitPrice(25.0));
        invoice.set_tax_rate(10.0);
        invoice.set_adjustment(20.0);

        let markup =
            render_with(&tera, &invoice, &test_sender(), &ExportOptions::default()).unwrap();
        assert!(markup.contains("Machining"));
        assert!(markup.contains("75.00"));
        assert!(markup.contains("62.50")); // 75 + 7.5 - 20
        assert!(markup.contains("us-letter"));
    }
}
