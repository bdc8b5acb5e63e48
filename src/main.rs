use anyhow::{Context, Result};
use blob_upload::{
    client::{
        UploadClient, http_client,
        listing::{HttpListingService, ListingService},
    },
    config::{Cli, ClientConfig, Command, ServerConfig},
    db,
    models::{listing::ContainerListing, upload::SourceFile},
    server,
};
use clap::Parser;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // --- Logging setup ---
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    match Cli::parse().command {
        Command::Serve(args) => {
            let cfg = ServerConfig::from_env_and_args(args)?;
            tracing::info!("Starting blob-upload with config: {:?}", cfg);
            server::run(cfg).await
        }
        Command::Migrate(args) => {
            let cfg = ServerConfig::from_env_and_args(args)?;
            let pool = db::connect(&cfg.database_url).await?;
            db::run_migrations(&pool).await?;
            tracing::info!("Database migration complete.");
            Ok(())
        }
        Command::Upload(args) => {
            let config = ClientConfig::from_env_and_args(args.client)?;
            let file = SourceFile::from_path(&args.file)
                .await
                .with_context(|| format!("reading {}", args.file.display()))?;
            let client = UploadClient::new(config)?;
            let strategy = client.strategy(args.mode.into());

            let result = client.orchestrator.upload(file, strategy).await;
            let status = client.orchestrator.status().await;
            match client.orchestrator.transfer_path().await {
                Some(path) => println!("status: {} ({} path)", status, path),
                None => println!("status: {}", status),
            }
            if let Some(text) = client.orchestrator.status_text().await {
                println!("{}", text);
            }
            let report = result?;
            match (&report.listing, &report.listing_error) {
                (Some(listing), _) => print_listing(listing),
                (None, Some(err)) => eprintln!("listing not refreshed: {}", err),
                (None, None) => {}
            }
            Ok(())
        }
        Command::List(args) => {
            let config = ClientConfig::from_env_and_args(args)?;
            let service = HttpListingService::new(http_client()?, config.api_url.clone());
            let listing = service.list(&config.container).await?;
            print_listing(&listing);
            Ok(())
        }
    }
}

fn print_listing(listing: &ContainerListing) {
    println!("{} ({} entries)", listing.container_name, listing.entries.len());
    for entry in &listing.entries {
        let kind = if ContainerListing::is_image(entry) {
            "image"
        } else {
            "file "
        };
        println!("  [{}] {}", kind, entry);
    }
}
