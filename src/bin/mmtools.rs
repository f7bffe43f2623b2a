use std::path::PathBuf;

use clap::{Parser, Subcommand};
use mmtools::logging::LoggingConfig;
use mmtools::{builtin_catalog, generate_path, CatalogEntry};

#[derive(Parser)]
#[command(name = "mmtools", version, about = "Pretrained model tools for agents", author)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    Tools {
        #[command(subcommand)]
        command: ToolsCommand,
    },
    /// Print a fresh output path derived from a template
    Path {
        template: PathBuf,
        #[arg(long, default_value = "output")]
        tag: String,
    },
    /// Run a tool through the remote inference endpoint
    #[cfg(feature = "remote-client")]
    Run {
        key: String,
        input: String,
        #[arg(long)]
        endpoint: Option<String>,
        #[arg(long, default_value = "")]
        token: String,
        #[arg(long)]
        output_dir: Option<PathBuf>,
    },
}

#[derive(Subcommand)]
enum ToolsCommand {
    List,
    Show { key: String },
}

fn main() -> anyhow::Result<()> {
    LoggingConfig::init();

    let cli = Cli::parse();
    match cli.command {
        Command::Tools { command } => match command {
            ToolsCommand::List => render_tool_table(builtin_catalog()),
            ToolsCommand::Show { key } => handle_tools_show(&key)?,
        },
        Command::Path { template, tag } => {
            println!("{}", generate_path(&template, &tag).display());
        }
        #[cfg(feature = "remote-client")]
        Command::Run {
            key,
            input,
            endpoint,
            token,
            output_dir,
        } => handle_run(key, input, endpoint, token, output_dir)?,
    }
    Ok(())
}

fn render_tool_table(entries: &[CatalogEntry]) {
    println!(
        "{:<20} {:<46} {:<48} {}",
        "Key", "Name", "Model", "Remote"
    );
    for entry in entries {
        let model = entry
            .meta
            .model
            .as_ref()
            .map(|m| match m.setting {
                Some(setting) => format!("{}[{}]", m.name, setting),
                None => m.name.clone(),
            })
            .unwrap_or_else(|| "-".to_string());
        println!(
            "{:<20} {:<46} {:<48} {}",
            entry.key,
            entry.meta.name,
            model,
            if entry.remote { "yes" } else { "no" }
        );
    }
}

fn handle_tools_show(key: &str) -> anyhow::Result<()> {
    let entry = builtin_catalog()
        .iter()
        .find(|e| e.key.eq_ignore_ascii_case(key))
        .ok_or_else(|| anyhow::anyhow!("tool `{key}` not registered"))?;
    println!("{}", serde_json::to_string_pretty(entry)?);
    Ok(())
}

#[cfg(feature = "remote-client")]
fn handle_run(
    key: String,
    input: String,
    endpoint: Option<String>,
    token: String,
    output_dir: Option<PathBuf>,
) -> anyhow::Result<()> {
    use std::sync::Arc;

    use mmtools::{load_tool, Backends, EnvConfig, HttpRemoteInference, ToolValue};
    use serde_json::json;

    let endpoint = endpoint
        .or_else(EnvConfig::remote_endpoint)
        .ok_or_else(|| anyhow::anyhow!("no endpoint given and MMTOOLS_REMOTE_ENDPOINT is not set"))?;
    let client = HttpRemoteInference::new(endpoint)?;
    let client = if token.is_empty() && EnvConfig::remote_token().is_none() {
        client
    } else {
        client.with_api_key(&token)?
    };

    let mut config = json!({ "remote": true });
    if let Some(dir) = output_dir {
        config["output_dir"] = json!(dir);
    }

    let backends = Backends::new().with_remote(Arc::new(client));
    let mut tool = load_tool(&key, &backends, Some(config))?;
    let call = tool.invoke(ToolValue::Text(input))?;
    match call.output {
        ToolValue::Text(text) => println!("{text}"),
        other => println!("{}", other.to_json()?),
    }
    Ok(())
}
