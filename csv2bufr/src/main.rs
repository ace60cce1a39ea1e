//! csv2bufr CLI - Convert CSV observations to WMO BUFR edition 4
//!
//! # Main Commands
//!
//! ```bash
//! csv2bufr transform obs.csv --bufr-template aws-template --metadata station.json
//! csv2bufr validate my-template.json
//! csv2bufr mappings list
//! csv2bufr serve --port 5000
//! ```

use clap::{ArgAction, Parser, Subcommand};
use csv2bufr::logging::{init_logging, LogConfig, LogFormat};
use csv2bufr::{
    column_names, read_file_auto, transform_file, CsvLayout, EccodesToolEncoder, MappingTemplate, Settings,
    TemplateError, TemplateOrigin, TemplateRegistry,
};
use serde_json::Value;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::warn;

#[derive(Parser)]
#[command(name = "csv2bufr")]
#[command(version, about = "Convert CSV observations to WMO BUFR4 messages", long_about = None)]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Convert a CSV file, writing one <id>.bufr4 file per row
    Transform {
        /// Input CSV file
        input: PathBuf,

        /// Template name or path to a template JSON file
        #[arg(short = 't', long)]
        bufr_template: String,

        /// Station metadata JSON file
        #[arg(short, long)]
        metadata: Option<PathBuf>,

        /// Directory for the BUFR files
        #[arg(short, long, default_value = ".")]
        output_dir: PathBuf,
    },

    /// Check a mapping template against the schema
    Validate {
        /// Template JSON file
        input: PathBuf,
    },

    /// Manage mapping templates
    Mappings {
        #[command(subcommand)]
        action: MappingsAction,
    },

    /// Start HTTP server
    Serve {
        /// Port to listen on (default: CSV2BUFR_PORT or 5000)
        #[arg(short, long)]
        port: Option<u16>,
    },
}

#[derive(Subcommand)]
enum MappingsAction {
    /// List available templates
    List,

    /// Print a template
    Show {
        /// Template name
        name: String,
    },

    /// Validate a template file and add it to the store
    Import {
        /// Template JSON file to import
        file: PathBuf,
        /// Name for the template (default: file stem)
        #[arg(short, long)]
        name: Option<String>,
    },

    /// Delete a stored template
    Delete {
        /// Template name
        name: String,
    },

    /// Rank templates by how many of their columns a CSV provides
    Match {
        /// Input CSV file
        input: PathBuf,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let format = if cli.log_json { LogFormat::Json } else { LogFormat::Pretty };
    if let Err(e) = init_logging(&LogConfig::from_verbosity(cli.verbose).with_format(format)) {
        eprintln!("warning: logging not initialised: {}", e);
    }

    let settings = Settings::from_env();

    let result = match cli.command {
        Commands::Transform {
            input,
            bufr_template,
            metadata,
            output_dir,
        } => cmd_transform(&settings, &input, &bufr_template, metadata.as_deref(), &output_dir),

        Commands::Validate { input } => cmd_validate(&input),

        Commands::Mappings { action } => cmd_mappings(&settings, action),

        Commands::Serve { port } => {
            let port = port.unwrap_or(settings.port);
            csv2bufr::server::start_server(port, settings).await
        }
    };

    if let Err(e) = result {
        eprintln!("❌ Error: {}", e);
        std::process::exit(1);
    }
}

fn cmd_transform(
    settings: &Settings,
    input: &Path,
    template_ref: &str,
    metadata_path: Option<&Path>,
    output_dir: &Path,
) -> Result<(), Box<dyn std::error::Error>> {
    eprintln!("📄 Processing: {}", input.display());

    let registry = TemplateRegistry::from_settings(settings);
    let template = registry.resolve(template_ref)?;

    let metadata: Value = match metadata_path {
        Some(path) => serde_json::from_str(&fs::read_to_string(path)?)?,
        None => Value::Object(Default::default()),
    };

    let encoder = EccodesToolEncoder::from_settings(&settings.eccodes)?;
    fs::create_dir_all(output_dir)?;

    let mut written = HashSet::new();
    let mut run = transform_file(input, metadata, template, encoder)?;
    for result in run.by_ref() {
        match result {
            Ok(record) => {
                let path = output_path(output_dir, &record.meta.id, &record.checksum, &mut written);
                fs::write(&path, &record.bufr4)?;
                eprintln!("   💾 {}", path.display());
            }
            Err(e) => eprintln!("   ❌ {}", e),
        }
    }

    let summary = run.summary();
    eprintln!(
        "\n📊 Results: {} converted, {} failed, {} values rejected by QC",
        summary.converted, summary.failed, summary.qc_rejections
    );

    if summary.failed > 0 {
        return Err(format!("{} of {} rows failed", summary.failed, summary.rows_read).into());
    }
    Ok(())
}

/// `<id>.bufr4`, or `<id>_<checksum prefix>.bufr4` when an earlier row of this run took the name.
fn output_path(dir: &Path, id: &str, checksum: &str, written: &mut HashSet<PathBuf>) -> PathBuf {
    let path = dir.join(format!("{}.bufr4", id));
    if written.insert(path.clone()) {
        return path;
    }
    let prefix = &checksum[..checksum.len().min(12)];
    let renamed = dir.join(format!("{}_{}.bufr4", id, prefix));
    warn!(
        first = %path.display(),
        renamed = %renamed.display(),
        "duplicate message id, writing under a checksum suffix"
    );
    written.insert(renamed.clone());
    renamed
}

fn cmd_validate(input: &Path) -> Result<(), Box<dyn std::error::Error>> {
    eprintln!("✔️  Validating: {}", input.display());

    match MappingTemplate::from_path(input) {
        Ok(template) => {
            eprintln!(
                "✅ Valid: {} header and {} data elements",
                template.header.len(),
                template.data.len()
            );
            Ok(())
        }
        Err(TemplateError::SchemaValidation { violations }) => {
            for violation in violations.iter() {
                eprintln!("   - {}", violation);
            }
            Err(format!("{} schema violations", violations.len()).into())
        }
        Err(e) => Err(e.into()),
    }
}

fn cmd_mappings(settings: &Settings, action: MappingsAction) -> Result<(), Box<dyn std::error::Error>> {
    let registry = TemplateRegistry::from_settings(settings);

    match action {
        MappingsAction::List => {
            let templates = registry.list();
            if templates.is_empty() {
                eprintln!("📋 No templates available.");
                return Ok(());
            }
            for entry in templates {
                let origin = match entry.origin {
                    TemplateOrigin::SearchPath(path) | TemplateOrigin::Store(path) => path.display().to_string(),
                    TemplateOrigin::Builtin => "built-in".to_string(),
                };
                println!("{:<24} {}", entry.name, origin);
            }
        }

        MappingsAction::Show { name } => {
            let raw = registry.get_raw(&name)?;
            println!("{}", serde_json::to_string_pretty(&raw)?);
        }

        MappingsAction::Import { file, name } => {
            eprintln!("📥 Importing template from: {}", file.display());
            let stored = registry.import(&file, name.as_deref())?;
            eprintln!("✅ Template saved as: {}", stored);
        }

        MappingsAction::Delete { name } => {
            registry.delete(&name)?;
            eprintln!("🗑️  Template deleted: {}", name);
        }

        MappingsAction::Match { input } => {
            let (text, _) = read_file_auto(&input)?;
            let columns = column_names(&text, &CsvLayout::default())?;
            let matches = registry.find_compatible(&columns);
            if matches.is_empty() {
                eprintln!("📋 No compatible templates for {}", input.display());
            }
            for (name, score) in matches {
                println!("{:<24} {:.0}%", name, score * 100.0);
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duplicate_ids_do_not_overwrite() {
        let dir = Path::new("out");
        let mut written = HashSet::new();

        let first = output_path(dir, "WIGOS_0-20000-0-06700_20220331T120000", "abcdef0123456789", &mut written);
        let second = output_path(dir, "WIGOS_0-20000-0-06700_20220331T120000", "fedcba9876543210", &mut written);
        let other = output_path(dir, "WIGOS_0-20000-0-06700_20220331T130000", "0011", &mut written);

        assert_eq!(first, dir.join("WIGOS_0-20000-0-06700_20220331T120000.bufr4"));
        assert_eq!(second, dir.join("WIGOS_0-20000-0-06700_20220331T120000_fedcba987654.bufr4"));
        assert_eq!(other, dir.join("WIGOS_0-20000-0-06700_20220331T130000.bufr4"));
    }
}
