use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tierras_map::aggregate::{self, MatchReport};
use tierras_map::matcher::MatchStage;
use tierras_map::{config, data, output};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the GeoJSON layers and stats.json for the viewer
    Prepare {
        #[arg(short, long, value_name = "FILE", default_value = "config.toml")]
        config: PathBuf,
    },
    /// Show how department polygons matched, without writing anything
    Report {
        #[arg(short, long, value_name = "FILE", default_value = "config.toml")]
        config: PathBuf,
        /// Print the reports as JSON
        #[arg(long)]
        json: bool,
    },
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    match &cli.command {
        Commands::Prepare { config } => {
            info!("Preparing data with config: {:?}", config);
            let app_config = config::AppConfig::load_from_file(config)?;
            app_config.validate_inputs()?;

            // 1. Load sources and build indices
            let source = data::load_data(&app_config)?;

            // 2. Match and assemble
            let assembled = aggregate::assemble(&source)?;
            let summary = &assembled.outputs.stats.summary;

            // 3. Write everything at once
            output::write_outputs(&app_config.output.dir, &assembled.outputs)?;

            info!(
                "Done: {} points with data (alto {}, sobre promedio {}, normal {})",
                summary.total_departamentos, summary.alto_nivel, summary.sobre_promedio, summary.normal
            );
        }
        Commands::Report { config, json } => {
            let app_config = config::AppConfig::load_from_file(config)?;
            app_config.validate_inputs()?;
            let source = data::load_data(&app_config)?;
            let assembled = aggregate::assemble(&source)?;

            if *json {
                let reports = serde_json::json!({
                    "provincias": assembled.provincias,
                    "departamentos": assembled.departamentos,
                });
                println!("{}", serde_json::to_string_pretty(&reports)?);
            } else {
                print_report("Provincias", &assembled.provincias);
                print_report("Departamentos", &assembled.departamentos);
            }
        }
    }

    Ok(())
}

fn print_report(title: &str, report: &MatchReport) {
    println!("{}: {}/{} matched", title, report.matched, report.total);
    for stage in MatchStage::ALL {
        if let Some(n) = report.by_stage.get(&stage) {
            println!("  {:<12} {}", format!("{:?}", stage), n);
        }
    }
    if !report.unmatched.is_empty() {
        println!("  unmatched:");
        for name in &report.unmatched {
            println!("    {}", name);
        }
    }
}
