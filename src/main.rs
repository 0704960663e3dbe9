use std::io::SeekFrom;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand, ValueEnum};
use tokio::io::{AsyncBufReadExt, AsyncSeekExt, BufReader};

use fnhost_runtime::Engine;
use fnhost_server::AppState;
use fnhost_store::{Command as FnCommand, FunctionSpec, FunctionStore, Language};

const LUA_TEMPLATE: &str = include_str!("../templates/handler.lua");
const EXEC_TEMPLATE: &str = include_str!("../templates/handler.sh");

/// fnhost - a self-hosted function runtime
#[derive(Parser)]
#[command(name = "fnhost")]
#[command(version, about, long_about = None)]
struct Cli {
  /// Path to the data directory (default: $FNHOST_HOME or ~/.fnhost)
  #[arg(long, global = true)]
  data_dir: Option<PathBuf>,

  #[command(subcommand)]
  command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum Lang {
  Lua,
  Exec,
}

#[derive(Subcommand)]
enum Commands {
  /// Create a new function with a template handler
  Create {
    name: String,

    /// Backend the function runs on
    #[arg(long, value_enum, default_value = "lua")]
    lang: Lang,

    /// For exec: command to run
    #[arg(long)]
    command: Option<String>,

    /// Disable audit logging for this function
    #[arg(long)]
    no_logs: bool,
  },

  /// Destroy a function
  Destroy {
    name: String,

    /// Also remove the function's audit log
    #[arg(long)]
    purge_logs: bool,
  },

  /// List functions
  List,

  /// Run the HTTP server
  Serve {
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    #[arg(long, default_value_t = 8080)]
    port: u16,

    /// Suppress access logs
    #[arg(long)]
    quiet: bool,
  },

  /// Show or follow a function's audit log
  Logs {
    name: String,

    #[arg(short, long)]
    follow: bool,
  },

  /// Enable audit logging for a function
  EnableLogs { name: String },

  /// Disable audit logging for a function
  DisableLogs { name: String },
}

fn main() -> Result<()> {
  let cli = Cli::parse();

  let data_dir = cli
    .data_dir
    .or_else(|| std::env::var_os("FNHOST_HOME").map(PathBuf::from))
    .unwrap_or_else(|| {
      dirs::home_dir()
        .expect("could not determine home directory")
        .join(".fnhost")
    });
  let store = FunctionStore::new(data_dir);

  let rt = tokio::runtime::Runtime::new()?;
  rt.block_on(async {
    match cli.command {
      Commands::Create {
        name,
        lang,
        command,
        no_logs,
      } => cmd_create(&store, name, lang, command, no_logs).await,
      Commands::Destroy { name, purge_logs } => cmd_destroy(&store, name, purge_logs).await,
      Commands::List => cmd_list(&store).await,
      Commands::Serve { host, port, quiet } => cmd_serve(store, host, port, quiet).await,
      Commands::Logs { name, follow } => cmd_logs(&store, name, follow).await,
      Commands::EnableLogs { name } => cmd_set_logging(&store, name, true).await,
      Commands::DisableLogs { name } => cmd_set_logging(&store, name, false).await,
    }
  })
}

async fn cmd_create(
  store: &FunctionStore,
  name: String,
  lang: Lang,
  command: Option<String>,
  no_logs: bool,
) -> Result<()> {
  store.ensure_dirs().await.context("failed to create data directories")?;

  let base = store.function_dir(&name);
  if base.exists() {
    bail!("function '{}' already exists at {}", name, base.display());
  }
  tokio::fs::create_dir_all(&base).await?;

  let spec = match lang {
    Lang::Lua => {
      tokio::fs::write(base.join("handler.lua"), LUA_TEMPLATE).await?;
      FunctionSpec {
        name: name.clone(),
        language: Language::Lua,
        entrypoint: Some("handler.lua:handler".to_string()),
        command: None,
        logging: !no_logs,
      }
    }
    Lang::Exec => {
      let script = base.join("handler.sh");
      tokio::fs::write(&script, EXEC_TEMPLATE).await?;
      #[cfg(unix)]
      {
        use std::os::unix::fs::PermissionsExt;
        tokio::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).await?;
      }
      FunctionSpec {
        name: name.clone(),
        language: Language::Exec,
        entrypoint: None,
        command: Some(FnCommand::Shell(
          command.unwrap_or_else(|| "./handler.sh".to_string()),
        )),
        logging: !no_logs,
      }
    }
  };

  store.write_spec(&spec).await?;

  println!("Created function '{}' in {}", name, base.display());
  println!("Try it: start the server and curl it:");
  println!("  fnhost serve &");
  println!("  curl -s http://127.0.0.1:8080/fn/{name}");
  Ok(())
}

async fn cmd_destroy(store: &FunctionStore, name: String, purge_logs: bool) -> Result<()> {
  store
    .remove_function(&name, purge_logs)
    .await
    .with_context(|| format!("failed to destroy '{name}'"))?;
  println!("Destroyed function '{name}'");
  Ok(())
}

async fn cmd_list(store: &FunctionStore) -> Result<()> {
  store.ensure_dirs().await?;
  let specs = store.list_specs().await?;
  if specs.is_empty() {
    println!("No functions found. Create one with: fnhost create <name>");
    return Ok(());
  }

  let mut rows: Vec<[String; 3]> = vec![];
  for spec in &specs {
    rows.push([
      spec.name.clone(),
      spec.language.to_string(),
      spec.logging.to_string(),
    ]);
  }

  let headers = ["NAME", "LANG", "LOGGING"];
  let widths: Vec<usize> = (0..headers.len())
    .map(|i| {
      rows
        .iter()
        .map(|row| row[i].len())
        .chain(std::iter::once(headers[i].len()))
        .max()
        .unwrap_or(0)
    })
    .collect();

  let fmt_row = |cells: [&str; 3]| {
    cells
      .iter()
      .enumerate()
      .map(|(i, cell)| format!("{cell:<width$}", width = widths[i]))
      .collect::<Vec<_>>()
      .join("  ")
  };

  println!("{}", fmt_row(headers));
  for row in &rows {
    println!(
      "{}",
      fmt_row([row[0].as_str(), row[1].as_str(), row[2].as_str()])
    );
  }
  Ok(())
}

async fn cmd_serve(store: FunctionStore, host: String, port: u16, quiet: bool) -> Result<()> {
  let default_filter = if quiet { "warn" } else { "info" };
  let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_filter));
  tracing_subscriber::fmt().with_env_filter(env_filter).init();

  store.ensure_dirs().await?;

  let ip: IpAddr = host
    .parse()
    .with_context(|| format!("invalid host address: {host}"))?;
  let addr = SocketAddr::new(ip, port);

  let state = AppState::new(store, Engine::new());
  fnhost_server::serve(addr, state)
    .await
    .context("server failed")?;
  Ok(())
}

async fn cmd_logs(store: &FunctionStore, name: String, follow: bool) -> Result<()> {
  let path = store.log_path(&name);
  if !path.exists() {
    println!("No logs for '{}' yet at {}", name, path.display());
    return Ok(());
  }

  if !follow {
    let content = tokio::fs::read_to_string(&path).await?;
    print!("{content}");
    return Ok(());
  }

  // tail -f: start at the end and poll for new lines until interrupted.
  let file = tokio::fs::File::open(&path).await?;
  let mut reader = BufReader::new(file);
  reader.seek(SeekFrom::End(0)).await?;
  let mut line = String::new();
  loop {
    line.clear();
    let read = reader.read_line(&mut line).await?;
    if read == 0 {
      tokio::time::sleep(std::time::Duration::from_millis(500)).await;
      continue;
    }
    print!("{line}");
  }
}

async fn cmd_set_logging(store: &FunctionStore, name: String, enabled: bool) -> Result<()> {
  let mut spec = store
    .load_spec(&name)
    .await
    .with_context(|| format!("function '{name}' does not exist"))?;
  spec.logging = enabled;
  store.write_spec(&spec).await?;
  println!(
    "{} logging for '{}'",
    if enabled { "Enabled" } else { "Disabled" },
    name
  );
  Ok(())
}
