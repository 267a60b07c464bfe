use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{ArgAction, Args, Parser, Subcommand};
use furniture_erp_api::{
    config::{self, AppConfig},
    db,
    entities::store_inventory,
    events::{process_events, EventSender},
    handlers::AppServices,
    services::{production::ProductionOrderView, transport_jobs::NewVehicle},
};
use serde::Serialize;
use tokio::sync::mpsc;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let context = CliContext::initialize().await?;

    match cli.command {
        Commands::Migrate => {
            db::run_migrations(&context.db)
                .await
                .context("failed to run migrations")?;
            println!("Migrations applied");
        }
        Commands::Inventory(command) => handle_inventory_command(&context, command, cli.json).await?,
        Commands::Vehicles(command) => handle_vehicle_command(&context, command, cli.json).await?,
        Commands::Production(command) => {
            handle_production_command(&context, command, cli.json).await?
        }
    }

    Ok(())
}

#[derive(Parser)]
#[command(name = "erp-cli", about = "Furniture ERP administration", version)]
struct Cli {
    #[arg(
        long,
        global = true,
        action = ArgAction::SetTrue,
        help = "Render command output as pretty JSON"
    )]
    json: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Apply pending database migrations
    Migrate,
    #[command(subcommand)]
    Inventory(InventoryCommands),
    #[command(subcommand)]
    Vehicles(VehicleCommands),
    #[command(subcommand)]
    Production(ProductionCommands),
}

#[derive(Subcommand)]
enum InventoryCommands {
    /// List store stock
    List {
        #[arg(long)]
        category: Option<String>,
    },
    /// Receive stock into the store
    Add(AddStockArgs),
}

#[derive(Args)]
struct AddStockArgs {
    name: String,
    quantity: i32,
    #[arg(long)]
    category: Option<String>,
}

#[derive(Subcommand)]
enum VehicleCommands {
    List,
    Register(RegisterVehicleArgs),
}

#[derive(Args)]
struct RegisterVehicleArgs {
    registration_number: String,
    #[arg(long)]
    driver_name: Option<String>,
    #[arg(long)]
    driver_contact: Option<String>,
}

#[derive(Subcommand)]
enum ProductionCommands {
    /// Show a production order with its derived status
    Show { id: i32 },
    /// List production orders
    List {
        #[arg(long, default_value_t = 1)]
        page: u64,
        #[arg(long, default_value_t = 20)]
        per_page: u64,
    },
}

struct CliContext {
    db: Arc<db::DbPool>,
    services: AppServices,
}

impl CliContext {
    async fn initialize() -> Result<Self> {
        let config: AppConfig =
            config::load_config().context("failed to load application config")?;
        config::init_tracing(config.log_level(), config.log_json);

        let db_pool = db::connect(&config)
            .await
            .context("failed to connect to database")?;
        let db = Arc::new(db_pool);

        let (event_tx, event_rx) = mpsc::channel(32);
        tokio::spawn(process_events(event_rx));
        let services = AppServices::new(db.clone(), Some(EventSender::new(event_tx)), &config);

        Ok(Self { db, services })
    }
}

async fn handle_inventory_command(
    context: &CliContext,
    command: InventoryCommands,
    json: bool,
) -> Result<()> {
    match command {
        InventoryCommands::List { category } => {
            let items = context
                .services
                .inventory
                .list_items(category.as_deref())
                .await
                .context("failed to list inventory")?;
            if json {
                print_json(&items)?;
            } else if items.is_empty() {
                println!("Store is empty");
            } else {
                items.iter().for_each(render_item);
            }
        }
        InventoryCommands::Add(args) => {
            let item = context
                .services
                .inventory
                .add_stock(&args.name, args.quantity, args.category)
                .await
                .context("failed to add stock")?;
            if json {
                print_json(&item)?;
            } else {
                render_item(&item);
            }
        }
    }
    Ok(())
}

async fn handle_vehicle_command(
    context: &CliContext,
    command: VehicleCommands,
    json: bool,
) -> Result<()> {
    match command {
        VehicleCommands::List => {
            let vehicles = context
                .services
                .transport_jobs
                .list_vehicles(None)
                .await
                .context("failed to list vehicles")?;
            if json {
                print_json(&vehicles)?;
            } else {
                for vehicle in &vehicles {
                    println!(
                        "- {} • {:?} • driver {}",
                        vehicle.registration_number,
                        vehicle.status,
                        vehicle.driver_name.as_deref().unwrap_or("-")
                    );
                }
            }
        }
        VehicleCommands::Register(args) => {
            let vehicle = context
                .services
                .transport_jobs
                .register_vehicle(NewVehicle {
                    registration_number: args.registration_number,
                    driver_name: args.driver_name,
                    driver_contact: args.driver_contact,
                })
                .await
                .context("failed to register vehicle")?;
            if json {
                print_json(&vehicle)?;
            } else {
                println!(
                    "Vehicle {} registered (id {})",
                    vehicle.registration_number, vehicle.id
                );
            }
        }
    }
    Ok(())
}

async fn handle_production_command(
    context: &CliContext,
    command: ProductionCommands,
    json: bool,
) -> Result<()> {
    match command {
        ProductionCommands::Show { id } => {
            let view = context
                .services
                .production
                .get(id)
                .await
                .with_context(|| format!("failed to load production order {}", id))?;
            if json {
                print_json(&view)?;
            } else {
                render_production(&view);
            }
        }
        ProductionCommands::List { page, per_page } => {
            let (views, total) = context
                .services
                .production
                .list(page.max(1), per_page.clamp(1, 100))
                .await
                .context("failed to list production orders")?;
            if json {
                print_json(&views)?;
            } else {
                println!("{} production orders", total);
                views.iter().for_each(render_production);
            }
        }
    }
    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn render_item(item: &store_inventory::Model) {
    println!(
        "- {} • qty {} • category {}",
        item.name,
        item.quantity,
        item.category.as_deref().unwrap_or("-")
    );
}

fn render_production(view: &ProductionOrderView) {
    println!(
        "- Production {} • {} x{} • {} [{}] ({}%)",
        view.production_order.id,
        view.production_order.product_name,
        view.production_order.quantity,
        view.derived_status.text,
        view.derived_status.department,
        view.derived_status.progress
    );
}
