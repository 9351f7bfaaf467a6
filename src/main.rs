use clap::{Parser, ValueEnum};
use linkgate::config::Settings;
use linkgate::model::{self, ProxyModel};
use linkgate::process::{ProxyCommand, ProxySupervisor};
use linkgate::render::ConfigRenderer;
use linkgate::snapshot::EnvSnapshot;
use std::path::{Path, PathBuf};
use tracing::{error, info};

/// Generate an nginx reverse-proxy config from linked-container environment
/// variables, then run nginx.
#[derive(Debug, Parser)]
#[command(name = "linkgate", version, about, long_about = None)]
struct Cli {
    /// Test against the environment without writing any files.
    ///   conf:  preview the generated config file's contents.
    ///   parse: view a detailed parsing of the environment.
    #[arg(short, long, value_enum, verbatim_doc_comment)]
    test: Option<TestMode>,

    /// Where the generated config file is written
    #[arg(short, long)]
    output_file: Option<PathBuf>,

    /// Settings file (TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Directory SSL certificate names are resolved against
    #[arg(long)]
    ssl_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum TestMode {
    Conf,
    Parse,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("linkgate=info".parse().expect("valid log directive")),
        )
        .init();

    let cli = Cli::parse();

    let settings = Settings::load_or_default(cli.config.as_deref()).map_err(|e| {
        error!(path = ?cli.config, error = %e, "Failed to load settings");
        e
    })?;
    let output_path = cli.output_file.clone().unwrap_or_else(|| settings.output_path());
    let ssl_dir = cli.ssl_dir.clone().unwrap_or_else(|| settings.ssl_path());

    let env = EnvSnapshot::from_process();
    if env.prefix().is_empty() {
        info!("No link prefix found");
    } else {
        info!(prefix = env.prefix(), "Using link prefix");
    }

    let model = model::parse_env(&env, &ssl_dir).map_err(|e| {
        error!(code = e.code().as_str(), error = %e, "Invalid environment");
        anyhow::Error::new(e)
    })?;

    info!(
        services = model.services.len(),
        hosts = model.hosts.len(),
        "Environment parsed"
    );

    if cli.test == Some(TestMode::Parse) {
        print_model(&model)?;
        return Ok(());
    }

    let renderer = match settings.template.as_deref() {
        Some(path) => ConfigRenderer::from_file(Path::new(path))?,
        None => ConfigRenderer::new(),
    };
    let contents = renderer.render(&model, &ssl_dir)?;

    if cli.test == Some(TestMode::Conf) {
        println!(
            "Contents of {}:\n    {}",
            output_path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_else(|| output_path.display().to_string()),
            contents.replace('\n', "\n    ")
        );
        return Ok(());
    }

    write_config(&output_path, &contents)?;
    info!(path = %output_path.display(), bytes = contents.len(), "Proxy config written");

    let command = ProxyCommand::from_settings(&settings.proxy)?;
    info!(program = %command.program, "Starting proxy");
    let status = ProxySupervisor::new(command).run().await?;

    if !status.success() {
        error!(?status, "Proxy exited with failure");
        std::process::exit(status.code().unwrap_or(1));
    }

    info!("Shutdown complete");
    Ok(())
}

fn print_model(model: &ProxyModel) -> anyhow::Result<()> {
    println!("Services:");
    println!("{}\n", model.services_json()?);
    println!("Hosts:");
    println!("{}", model.hosts_json()?);
    Ok(())
}

fn write_config(path: &Path, contents: &str) -> anyhow::Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| {
            anyhow::anyhow!("Failed to create directory '{}': {}", parent.display(), e)
        })?;
    }
    std::fs::write(path, contents)
        .map_err(|e| anyhow::anyhow!("Failed to write config '{}': {}", path.display(), e))
}
