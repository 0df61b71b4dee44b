use clap::{Parser, Subcommand};
use lib::api::ApiClient;
use lib::config::{AuthMode, Config};
use lib::credentials::CredentialStore;
use lib::message::{Message, Role};
use lib::session::{SessionController, Status};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "parley")]
#[command(about = "Parley CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Show version
    Version,

    /// Create the configuration directory and a default config file.
    Init {
        /// Config file path (default: PARLEY_CONFIG_PATH or ~/.parley/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<PathBuf>,
    },

    /// Save a server URL and credential, then discover the model. With `auth: "login"`, pass --username and --password instead of --api-key.
    Connect {
        /// Config file path (default: PARLEY_CONFIG_PATH or ~/.parley/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<PathBuf>,

        /// Server URL; `/api` is appended when missing. Defaults to server.defaultBase or PARLEY_SERVER_URL.
        #[arg(long, short, value_name = "URL")]
        server: Option<String>,

        /// API key sent as the bearer token.
        #[arg(long, value_name = "KEY")]
        api_key: Option<String>,

        /// Username for login auth.
        #[arg(long, short)]
        username: Option<String>,

        /// Password for login auth.
        #[arg(long, short)]
        password: Option<String>,
    },

    /// Chat with the server using the saved credential (interactive).
    Chat {
        /// Config file path (default: PARLEY_CONFIG_PATH or ~/.parley/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<PathBuf>,
    },

    /// Print the server-side history for the saved credential.
    History {
        /// Config file path (default: PARLEY_CONFIG_PATH or ~/.parley/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Version) => {
            println!("parley {}", env!("CARGO_PKG_VERSION"));
        }
        Some(Commands::Init { config }) => {
            if let Err(e) = run_init(config) {
                log::error!("init failed: {}", e);
                std::process::exit(1);
            }
        }
        Some(Commands::Connect {
            config,
            server,
            api_key,
            username,
            password,
        }) => {
            if let Err(e) = run_connect(config, server, api_key, username, password).await {
                log::error!("connect failed: {}", e);
                eprintln!("error: {}", e);
                std::process::exit(1);
            }
        }
        Some(Commands::Chat { config }) => {
            if let Err(e) = run_chat(config).await {
                log::error!("chat failed: {}", e);
                eprintln!("error: {}", e);
                std::process::exit(1);
            }
        }
        Some(Commands::History { config }) => {
            if let Err(e) = run_history(config).await {
                log::error!("history failed: {}", e);
                eprintln!("error: {}", e);
                std::process::exit(1);
            }
        }
        None => {
            println!("Run with --help for usage");
        }
    }
}

fn run_init(config_path: Option<PathBuf>) -> anyhow::Result<()> {
    let path = config_path.unwrap_or_else(lib::config::default_config_path);
    let dir = lib::init::init_config_dir(&path)?;
    println!("initialized configuration at {}", dir.display());
    Ok(())
}

/// Load config and build a controller over the configured dialect and credential file.
fn controller(
    config_path: Option<PathBuf>,
) -> anyhow::Result<(Config, SessionController<ApiClient>)> {
    let (config, path) = lib::config::load_config(config_path)?;
    let store = CredentialStore::new(lib::config::resolve_credentials_path(&config, &path));
    log::debug!(
        "dialect {}, credentials at {}",
        config.server.dialect.as_str(),
        store.path().display()
    );
    let controller = SessionController::new(ApiClient::new(config.server.dialect), store);
    Ok((config, controller))
}

/// Resume the saved credential and require a discovered model.
async fn resumed(config_path: Option<PathBuf>) -> anyhow::Result<(Config, SessionController<ApiClient>)> {
    let (config, mut controller) = controller(config_path)?;
    controller.resume().await;
    match controller.session().status() {
        Status::Ready => Ok((config, controller)),
        Status::Disconnected => {
            anyhow::bail!("no saved credential; run `parley connect` first")
        }
        Status::Discovering => anyhow::bail!(
            "{}",
            controller
                .session()
                .error()
                .unwrap_or(lib::session::DISCOVERY_FAILED)
        ),
    }
}

async fn run_connect(
    config_path: Option<PathBuf>,
    server: Option<String>,
    api_key: Option<String>,
    username: Option<String>,
    password: Option<String>,
) -> anyhow::Result<()> {
    let (config, mut controller) = controller(config_path)?;
    let server = server
        .or_else(|| lib::config::resolve_default_base(&config))
        .unwrap_or_default();

    match config.server.auth {
        AuthMode::ApiKey => {
            controller
                .connect(&server, api_key.as_deref().unwrap_or(""))
                .await?;
        }
        AuthMode::Login => {
            controller
                .connect_with_login(
                    &server,
                    username.as_deref().unwrap_or(""),
                    password.as_deref().unwrap_or(""),
                )
                .await?;
        }
    }

    let session = controller.session();
    if let Some(err) = session.error() {
        anyhow::bail!("{}", err);
    }
    println!(
        "connected to {} (model: {})",
        server.trim(),
        session.model().unwrap_or("—")
    );
    Ok(())
}

async fn run_history(config_path: Option<PathBuf>) -> anyhow::Result<()> {
    let (config, controller) = resumed(config_path).await?;
    if !config.server.dialect.supports_history() {
        println!(
            "the {} dialect has no server-side history",
            config.server.dialect.as_str()
        );
        return Ok(());
    }
    if let Some(err) = controller.session().error() {
        anyhow::bail!("{}", err);
    }
    for m in controller.session().conversation() {
        print_message(m);
    }
    Ok(())
}

fn print_message(m: &Message) {
    let prefix = match m.role {
        Role::User => ">",
        Role::Assistant => "<",
    };
    println!("{} {}", prefix, m.text.trim());
}

async fn run_chat(config_path: Option<PathBuf>) -> anyhow::Result<()> {
    use std::io::{self, Write};

    let (_config, mut controller) = resumed(config_path).await?;
    println!(
        "connected (model: {}). /help for commands.",
        controller.session().model().unwrap_or("—")
    );
    for m in controller.session().conversation() {
        print_message(m);
    }
    if let Some(err) = controller.session().error() {
        eprintln!("chat error: {}", err);
        controller.clear_error();
    }

    let stdin = io::stdin();
    let mut stdout = io::stdout();

    loop {
        write!(stdout, "> ")?;
        stdout.flush()?;
        let mut line = String::new();
        if stdin.read_line(&mut line)? == 0 {
            break;
        }
        let input = line.trim();
        if input.is_empty() {
            continue;
        }
        if input.eq_ignore_ascii_case("/exit") || input.eq_ignore_ascii_case("/quit") {
            break;
        }
        if input.eq_ignore_ascii_case("/new") {
            controller.reset_conversation();
            println!("conversation cleared");
            continue;
        }
        if input.eq_ignore_ascii_case("/help") {
            println!("/new - start a new conversation\n/help - show this help message\n/exit - quit");
            continue;
        }

        let before = controller.session().conversation().len();
        controller.send_message(input).await?;
        // Skip the echoed user message; print only what the server added.
        for m in controller.session().conversation().iter().skip(before + 1) {
            println!("< {}", m.text.trim());
        }
        if let Some(err) = controller.session().error() {
            eprintln!("chat error: {}", err);
            controller.clear_error();
        }
    }

    Ok(())
}
