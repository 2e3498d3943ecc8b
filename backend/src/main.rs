//! xmlgate CLI
//!
//! ```bash
//! xmlgate serve                        # Start HTTP server (port 3000)
//! xmlgate resolve /mnt/data/a.xml      # Show where a client path lands
//! xmlgate convert catalog.xml          # Offline XML <-> JSON conversion
//! xmlgate bump-version                 # Bump minor version in version.json
//! ```

use clap::{Parser, Subcommand};
use std::fs;
use std::path::{Path, PathBuf};
use xmlgate::{
    bump_version_file, json_to_xml, pretty_json, transform_path, xml_to_json, Config, FileKind,
    XmlOptions,
};

#[derive(Parser)]
#[command(name = "xmlgate")]
#[command(about = "HTTP gateway for XML and JSON command-line tools", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start HTTP server
    Serve {
        /// Port to listen on (overrides PORT)
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Print the server-local path for a client path
    Resolve {
        /// Path as a client would send it
        path: String,
    },

    /// Convert an XML file to JSON or a JSON file to XML
    Convert {
        /// Input .xml or .json file
        input: PathBuf,

        /// Output file (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Wrapper element for JSON without a single root key
        #[arg(long, default_value = "root")]
        root: String,

        /// Do not indent XML output
        #[arg(long)]
        compact: bool,
    },

    /// Bump the minor version in version.json and add a changelog stub
    BumpVersion {
        /// Version file (default: XMLGATE_VERSION_FILE or version.json)
        #[arg(short, long)]
        file: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() {
    // Load .env file (if present)
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Serve { port } => cmd_serve(port).await,
        Commands::Resolve { path } => cmd_resolve(&path),
        Commands::Convert {
            input,
            output,
            root,
            compact,
        } => cmd_convert(&input, output.as_deref(), root, compact),
        Commands::BumpVersion { file } => cmd_bump_version(file),
    };

    if let Err(e) = result {
        eprintln!("❌ Error: {}", e);
        std::process::exit(1);
    }
}

async fn cmd_serve(port: Option<u16>) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = Config::from_env()?;
    if let Some(port) = port {
        config = config.with_port(port);
    }
    xmlgate::server::start_server(config).await
}

fn cmd_resolve(path: &str) -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::from_env()?;
    let local = transform_path(&config, path)?;
    println!("{}", local.display());
    Ok(())
}

fn cmd_convert(
    input: &Path,
    output: Option<&Path>,
    root: String,
    compact: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    eprintln!("🔄 Converting: {}", input.display());
    let content = fs::read_to_string(input)?;

    let converted = match FileKind::from_path(input) {
        FileKind::Xml => pretty_json(&xml_to_json(&content)?, 2)?,
        FileKind::Json => {
            let value: serde_json::Value = serde_json::from_str(&content)?;
            json_to_xml(&value, &XmlOptions { root, pretty: !compact })?
        }
        _ => return Err(format!("Expected a .xml or .json file: {}", input.display()).into()),
    };

    write_output(&converted, output)
}

fn cmd_bump_version(file: Option<PathBuf>) -> Result<(), Box<dyn std::error::Error>> {
    let path = match file {
        Some(path) => path,
        None => Config::from_env()?.version_file,
    };
    let version = bump_version_file(&path, env!("CARGO_PKG_VERSION"))?;
    eprintln!("✅ Updated {} to version {}", path.display(), version);
    Ok(())
}

fn write_output(content: &str, path: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    match path {
        Some(p) => {
            fs::write(p, content)?;
            eprintln!("💾 Output written to: {}", p.display());
        }
        None => {
            print!("{}", content);
        }
    }
    Ok(())
}
