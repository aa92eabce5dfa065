mod export;
mod model;

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use clap::{Parser, Subcommand};
use comfy_table::{Cell, CellAlignment, Table};
use directories::{BaseDirs, ProjectDirs};
use inquire::{Select, Text};
use serde::{Deserialize, Serialize};
use slug::slugify;

use crate::export::{DocumentRenderer, ExportOptions, SenderConfig, TypstRenderer};
use crate::model::{Invoice, ItemField};

// Embed the default letterhead at compile time to ensure availability
const DEFAULT_SENDER_TEMPLATE: &str = include_str!("../sender.toml");

#[derive(Debug, Serialize, Deserialize)]
struct AppSettings {
    data_root: String,
}

#[derive(Parser)]
#[command(name = "invoice-editor")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start an invoice editing session
    New,
    /// Configure data directory
    Config,
    /// Open output folder
    Open,
}

fn main() {
    let cli = Cli::parse();

    let settings = load_settings().unwrap_or_else(|| setup_config_wizard());
    let root = PathBuf::from(expand_home_dir(&settings.data_root));
    if let Err(e) = fs::create_dir_all(&root) {
        eprintln!("❌ Error: Failed to create data directory: {}", e);
        return;
    }

    let sender = load_sender_config(&root);

    if cli.command.is_none() {
        use clap::CommandFactory;
        Cli::command().print_help().unwrap();
        return;
    }

    match cli.command.unwrap() {
        Commands::New => run_editor(&root, &sender),
        Commands::Config => {
            setup_config_wizard();
        }
        Commands::Open => open_output_folder(&root),
    }
}

// ==========================================
// 1. Editing Session
// ==========================================

fn run_editor(root: &Path, sender: &SenderConfig) {
    // One invoice per session, in memory only. Closing the session
    // discards it.
    let mut invoice = Invoice::new();
    println!("\n--- New Invoice ---");

    loop {
        print_invoice(&invoice);

        let options = vec![
            "Add Item",
            "Edit Item",
            "Remove Item",
            "Client Details",
            "Tax & Adjustment",
            "Notes",
            "Preview",
            "Export PDF",
            "Quit",
        ];
        let Ok(choice) = Select::new("Action:", options).prompt() else {
            break;
        };

        match choice {
            "Add Item" => {
                invoice.add_item();
            }
            "Edit Item" => edit_item(&mut invoice),
            "Remove Item" => remove_selected_item(&mut invoice),
            "Client Details" => edit_client(&mut invoice),
            "Tax & Adjustment" => edit_tax_and_adjustment(&mut invoice),
            "Notes" => edit_notes(&mut invoice),
            "Preview" => preview(root, &invoice, sender),
            "Export PDF" => export_pdf(root, &invoice, sender),
            _ => break,
        }
    }
}

fn print_invoice(invoice: &Invoice) {
    if !invoice.client_name.is_empty() || !invoice.company_name.is_empty() {
        let mut who = invoice.client_name.clone();
        if !invoice.company_name.is_empty() {
            if !who.is_empty() {
                who.push_str(", ");
            }
            who.push_str(&invoice.company_name);
        }
        println!("\nInvoice For: {}", who);
    }

    let mut table = Table::new();
    table.set_header(vec![
        Cell::new("#"),
        Cell::new("Description"),
        Cell::new("Quantity"),
        Cell::new("Unit Price"),
        Cell::new("Amount"),
    ]);

    for (row_no, item) in invoice.items().iter().enumerate() {
        table.add_row(vec![
            Cell::new(row_no + 1),
            Cell::new(&item.description),
            Cell::new(item.quantity).set_alignment(CellAlignment::Right),
            Cell::new(format!("{:.2}", item.unit_price)).set_alignment(CellAlignment::Right),
            Cell::new(format!("{:.2}", item.amount())).set_alignment(CellAlignment::Right),
        ]);
    }

    println!("{table}");
    println!("  Subtotal:    {:.2}", invoice.subtotal());
    println!(
        "  Tax ({}%):   {:.2}",
        invoice.tax_rate(),
        invoice.tax_amount()
    );
    println!("  Adjustment:  {:.2}", invoice.adjustment());
    println!("  Total:       {:.2}", invoice.total());
}

fn select_item(invoice: &Invoice, verb: &str) -> Option<u64> {
    if invoice.items().is_empty() {
        println!("❌ No items on the invoice yet.");
        return None;
    }

    let options: Vec<String> = invoice
        .items()
        .iter()
        .enumerate()
        .map(|(i, item)| {
            let label = if item.description.is_empty() {
                "(no description)"
            } else {
                item.description.as_str()
            };
            format!(
                "{}. {} ({} x {:.2})",
                i + 1,
                label,
                item.quantity,
                item.unit_price
            )
        })
        .collect();

    let ans = Select::new(&format!("Select item to {}:", verb), options)
        .prompt()
        .ok()?;
    let row: usize = ans.split('.').next()?.parse().ok()?;
    invoice.items().get(row - 1).map(|item| item.id)
}

fn edit_item(invoice: &mut Invoice) {
    let Some(id) = select_item(invoice, "edit") else {
        return;
    };
    let Some(item) = invoice.items().iter().find(|i| i.id == id) else {
        return;
    };
    let current_description = item.description.clone();
    let current_quantity = item.quantity;
    let current_price = item.unit_price;

    let fields = vec!["Description", "Quantity", "Unit Price"];
    let Ok(field) = Select::new("Field to update:", fields).prompt() else {
        return;
    };

    match field {
        "Description" => {
            let Ok(text) = Text::new("Description:")
                .with_initial_value(&current_description)
                .prompt()
            else {
                return;
            };
            invoice.update_item(id, ItemField::Description(text));
        }
        "Quantity" => {
            let Ok(raw) = Text::new("Quantity:")
                .with_default(&format!("{}", current_quantity))
                .prompt()
            else {
                return;
            };
            // Non-numeric entry becomes zero before it reaches the model.
            invoice.update_item(id, ItemField::Quantity(raw.parse().unwrap_or(0.0)));
        }
        _ => {
            let Ok(raw) = Text::new("Unit Price:")
                .with_default(&format!("{}", current_price))
                .prompt()
            else {
                return;
            };
            invoice.update_item(id, ItemField::UnitPrice(raw.parse().unwrap_or(0.0)));
        }
    }
}

fn remove_selected_item(invoice: &mut Invoice) {
    if let Some(id) = select_item(invoice, "remove") {
        invoice.remove_item(id);
    }
}

fn edit_client(invoice: &mut Invoice) {
    if let Ok(name) = Text::new("Client Name:")
        .with_initial_value(&invoice.client_name)
        .prompt()
    {
        invoice.client_name = name;
    }
    if let Ok(company) = Text::new("Company Name:")
        .with_initial_value(&invoice.company_name)
        .prompt()
    {
        invoice.company_name = company;
    }
    if let Ok(address) = Text::new("Address:")
        .with_initial_value(&invoice.address)
        .prompt()
    {
        invoice.address = address;
    }
}

fn edit_notes(invoice: &mut Invoice) {
    if let Ok(notes) = Text::new("Notes / payment terms:")
        .with_initial_value(&invoice.notes)
        .prompt()
    {
        invoice.notes = notes;
    }
}

fn edit_tax_and_adjustment(invoice: &mut Invoice) {
    if let Ok(raw) = Text::new("Tax Rate % (e.g. 8.875):")
        .with_default(&format!("{}", invoice.tax_rate()))
        .prompt()
    {
        invoice.set_tax_rate(raw.parse().unwrap_or(0.0));
    }
    if let Ok(raw) = Text::new("Adjustment (flat amount subtracted from total):")
        .with_default(&format!("{}", invoice.adjustment()))
        .prompt()
    {
        invoice.set_adjustment(raw.parse().unwrap_or(0.0));
    }
}

// ==========================================
// 2. Preview & Export
// ==========================================

fn export_pdf(root: &Path, invoice: &Invoice, sender: &SenderConfig) {
    if !TypstRenderer::is_available() {
        println!("❌ Error: 'typst' is not installed. Please install it (brew install typst).");
        return;
    }

    let mut opts = ExportOptions::default();
    if !invoice.client_name.is_empty() {
        opts.filename = format!("{}_{}", opts.filename, slugify(&invoice.client_name));
    }

    let markup = match export::render_invoice(&root.join("templates"), invoice, sender, &opts) {
        Ok(m) => m,
        Err(e) => {
            println!("❌ Template Error: {}", e);
            return;
        }
    };

    let renderer = TypstRenderer::new(root.join("output"));
    println!("\n🔨 Compiling PDF...");
    match renderer.save(&markup, &opts) {
        Ok(path) => {
            println!("✅ PDF Generated: {:?}", path);
            open_file(&path);
        }
        Err(e) => println!("❌ Export failed: {}", e),
    }
}

fn preview(root: &Path, invoice: &Invoice, sender: &SenderConfig) {
    if !TypstRenderer::is_available() {
        println!("❌ Error: 'typst' is not installed. Please install it (brew install typst).");
        return;
    }

    // The preview file is scratch space; each preview overwrites it.
    let opts = ExportOptions {
        filename: "preview".to_string(),
        ..ExportOptions::default()
    };

    let markup = match export::render_invoice(&root.join("templates"), invoice, sender, &opts) {
        Ok(m) => m,
        Err(e) => {
            println!("❌ Template Error: {}", e);
            return;
        }
    };

    let renderer = TypstRenderer::new(root.join("output"));
    match renderer.save(&markup, &opts) {
        Ok(path) => open_file(&path),
        Err(e) => println!("❌ Preview failed: {}", e),
    }
}

fn open_output_folder(root: &Path) {
    let output_dir = root.join("output");
    if let Err(e) = fs::create_dir_all(&output_dir) {
        println!("❌ Error: Failed to create output directory: {}", e);
        return;
    }
    println!("🚀 Opening: {:?}", output_dir);
    open_file(&output_dir);
}

// Hand a path to the host environment's opener.
fn open_file(path: &Path) {
    #[cfg(target_os = "macos")]
    Command::new("open").arg(path).spawn().ok();

    #[cfg(target_os = "windows")]
    Command::new("explorer").arg(path).spawn().ok();

    #[cfg(target_os = "linux")]
    Command::new("xdg-open").arg(path).spawn().ok();
}

// ==========================================
// 3. Config & Utilities
// ==========================================

fn get_config_path() -> PathBuf {
    if let Some(proj_dirs) = ProjectDirs::from("com", "invoice-editor", "app") {
        let config_dir = proj_dirs.config_dir();
        if !config_dir.exists() {
            fs::create_dir_all(config_dir).ok();
        }
        return config_dir.join("settings.toml");
    }
    PathBuf::from("settings.toml")
}

fn load_settings() -> Option<AppSettings> {
    let path = get_config_path();
    if !path.exists() {
        return None;
    }
    let content = fs::read_to_string(path).ok()?;
    toml::from_str(&content).ok()
}

fn setup_config_wizard() -> AppSettings {
    println!("\n⚙️  --- Configuration Setup ---");
    let default_val = load_settings()
        .map(|s| s.data_root)
        .unwrap_or_else(|| "~/Documents/Invoices".to_string());

    println!("📂 Opening folder picker...");
    let picked = rfd::FileDialog::new()
        .set_title("Select Root Data Directory")
        .pick_folder();

    let data_root = match picked {
        Some(path) => path.to_string_lossy().to_string(),
        None => {
            println!("❌ No folder selected. Falling back to manual input.");
            Text::new("Enter Root Data Directory:")
                .with_default(&default_val)
                .prompt()
                .unwrap_or(default_val)
        }
    };

    let settings = AppSettings { data_root };
    let toml_str = toml::to_string_pretty(&settings).expect("Failed to serialize settings");
    fs::write(get_config_path(), toml_str).expect("Failed to save settings");
    println!("✅ Settings saved.");
    settings
}

fn expand_home_dir(path: &str) -> String {
    if path.starts_with('~') {
        if let Some(base_dirs) = BaseDirs::new() {
            let home = base_dirs.home_dir().to_string_lossy();
            return path.replacen('~', &home, 1);
        }
    }
    path.to_string()
}

fn load_sender_config(root: &Path) -> SenderConfig {
    let path = root.join("sender.toml");
    if path.exists() {
        let content = fs::read_to_string(&path).expect("Failed to read sender.toml");
        toml::from_str(&content).expect("Failed to parse sender.toml")
    } else {
        println!("✨ Initializing default sender configuration...");
        let default_sender: SenderConfig =
            toml::from_str(DEFAULT_SENDER_TEMPLATE).expect("Failed to parse default sender.toml");
        fs::write(&path, DEFAULT_SENDER_TEMPLATE).expect("Failed to write sender.toml");
        default_sender
    }
}
