use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};
use color_eyre::eyre::eyre;
use otp_client::{HttpApi, MockApi, OtpApi};
use otp_core::TotpAttempt;
use otp_panel::state::RegistrationForm;
use otp_panel::view::{self, DeviceCard, Screen};
use otp_panel::{
    ApiConfig, Command, CommandError, Config, Dashboard, Flow, PanelConfig, PasswordGate, Poller,
    Session, Tab,
};
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};
use tracing::info;

#[derive(Parser)]
#[command(name = "otp-panel")]
#[command(about = "Administration console for the OTP authentication service")]
struct Cli {
    /// Path to the configuration file
    #[arg(short, long, default_value = "otp-panel.toml")]
    config: PathBuf,

    /// Override the API base URL from the configuration
    #[arg(long, global = true)]
    api_url: Option<String>,

    /// Panel password; asked for on stdin when one is configured and this is absent
    #[arg(long, global = true)]
    password: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Live dashboard with interactive commands (the default)
    Watch {
        /// Tab to open first
        #[arg(long)]
        tab: Option<Tab>,
    },
    /// Manage devices
    #[command(subcommand)]
    Devices(DeviceCommand),
    /// Manage users
    #[command(subcommand)]
    Users(UserCommand),
    /// Show the access log
    Logs {
        /// Maximum number of entries
        #[arg(short, long)]
        limit: Option<u32>,
    },
    /// Ask the service to check a one-time code
    Validate {
        user_id: String,
        otp: String,
        /// Device the login is attempted from
        #[arg(long)]
        device: String,
    },
    /// Show the service banner
    Info,
}

#[derive(Subcommand)]
enum DeviceCommand {
    /// List devices and recent accesses
    List,
    /// Add an enabled device with a new six-digit code
    Add { name: String },
    /// Enable or disable a device, by name or id
    Toggle { device: String },
    /// Delete a device
    Delete {
        device: String,
        /// Do not ask for confirmation
        #[arg(short, long)]
        yes: bool,
    },
    /// Register a device by host name, keeping it if it already exists
    Register { name: String },
    /// Check whether a device may log in
    Status { name: String },
}

#[derive(Subcommand)]
enum UserCommand {
    /// List users
    List,
    /// Register a user
    Add {
        #[arg(long)]
        user_id: String,
        #[arg(long)]
        full_name: String,
        #[arg(long)]
        email: String,
        #[arg(long)]
        cedula: String,
    },
    /// Activate or block a user
    Toggle { user_id: String },
    /// Fetch a user's enrollment QR code
    Qr {
        user_id: String,
        /// Write the PNG to this file instead of printing a data URL
        #[arg(short, long)]
        out: Option<PathBuf>,
    },
}

/// Line-oriented stdin shared by prompts and the interactive console.
struct Console {
    lines: Lines<BufReader<Stdin>>,
}

impl Console {
    fn new() -> Self {
        Self {
            lines: BufReader::new(tokio::io::stdin()).lines(),
        }
    }

    async fn next_line(&mut self) -> std::io::Result<Option<String>> {
        self.lines.next_line().await
    }

    async fn ask(&mut self, prompt: &str) -> color_eyre::Result<Option<String>> {
        print!("{prompt} ");
        std::io::stdout().flush()?;
        Ok(self.next_line().await?)
    }
}

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
    color_eyre::install()?;

    let filter = std::env::var("RUST_LOG")
        .unwrap_or_else(|_| "otp_panel=info,otp_client=info".to_owned());
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let mut config = if cli.config.exists() {
        info!(path = ?cli.config, "Loading configuration");
        Config::load(&cli.config)?
    } else {
        info!("No configuration file found, using defaults");
        Config::default()
    };

    if let Some(base_url) = cli.api_url {
        config.api = match config.api {
            ApiConfig::Http {
                timeout_secs,
                device_update,
                ..
            } => ApiConfig::Http {
                base_url,
                timeout_secs,
                device_update,
            },
            ApiConfig::Mock { .. } => ApiConfig::http(base_url),
        };
    }

    let mut console = Console::new();
    let gate = PasswordGate::new(config.panel.password.clone());
    if !gate.is_open() {
        let attempt = match cli.password {
            Some(password) => password,
            None => console
                .ask("🔒 Contraseña:")
                .await?
                .ok_or_else(|| eyre!("no password given"))?,
        };
        gate.check(&attempt)?;
    }

    let command = cli.command.unwrap_or(Commands::Watch { tab: None });

    match config.api.clone() {
        ApiConfig::Http {
            base_url,
            timeout_secs,
            device_update,
        } => {
            info!(%base_url, ?device_update, "Using HTTP API");
            let api = HttpApi::new(&base_url, Duration::from_secs(timeout_secs))?
                .with_update_verb(device_update);
            run(api, command, &config.panel, &mut console).await?;
        }
        ApiConfig::Mock { demo } => {
            info!(demo, "Using in-memory mock API");
            let api = if demo {
                MockApi::with_demo_data()
            } else {
                MockApi::new()
            };
            run(api, command, &config.panel, &mut console).await?;
        }
    }

    Ok(())
}

async fn run<A: OtpApi>(
    api: A,
    command: Commands,
    panel: &PanelConfig,
    console: &mut Console,
) -> color_eyre::Result<()> {
    let initial_tab = match &command {
        Commands::Watch { tab: Some(tab) } => *tab,
        _ => panel.initial_tab,
    };
    let dashboard = Dashboard::new(api, initial_tab).with_log_limit(panel.log_limit);

    match command {
        Commands::Watch { .. } => watch(dashboard, panel.refresh_interval(), console).await,
        Commands::Devices(command) => devices(&dashboard, command, console).await,
        Commands::Users(command) => users(&dashboard, command).await,
        Commands::Logs { limit } => {
            let dashboard = dashboard.with_log_limit(limit.or(panel.log_limit));
            dashboard.set_tab(Tab::Logs).await?;
            print_tab(&dashboard, Tab::Logs).await;
            Ok(())
        }
        Commands::Validate {
            user_id,
            otp,
            device,
        } => {
            let attempt = TotpAttempt {
                user_id,
                otp,
                device_name: device,
            };
            let verdict = dashboard.validate_totp(&attempt).await?;
            let message = verdict.message.or(verdict.error);
            if !verdict.valid {
                return Err(eyre!(
                    "{}",
                    message.unwrap_or_else(|| "Código rechazado".to_owned())
                ));
            }
            println!("✅ {}", message.as_deref().unwrap_or("Código válido"));
            if let Some(user) = verdict.user {
                println!("   {}", user.full_name.as_deref().unwrap_or(&user.user_id));
            }
            Ok(())
        }
        Commands::Info => {
            let info = dashboard.service_info().await?;
            println!("{} v{} [{}]", info.service, info.version, info.status);
            if let Some(security) = info.security {
                println!("Seguridad: {security}");
            }
            Ok(())
        }
    }
}

async fn devices<A: OtpApi>(
    dashboard: &Dashboard<A>,
    command: DeviceCommand,
    console: &mut Console,
) -> color_eyre::Result<()> {
    match command {
        DeviceCommand::List => {
            dashboard.set_tab(Tab::Devices).await?;
            print_tab(dashboard, Tab::Devices).await;
        }
        DeviceCommand::Add { name } => {
            let added = dashboard.add_device(&name).await?;
            println!("✅ Dispositivo agregado: {}", added.name);
            println!("OTP: {}", added.preview);
            if let Some(code) = added
                .confirmed_code()
                .filter(|code| *code != added.preview.as_str())
            {
                println!("OTP registrado por el servicio: {code}");
            }
        }
        DeviceCommand::Toggle { device } => {
            dashboard.refresh_all().await?;
            let enabled = dashboard.toggle_device(&device).await?;
            println!("{device} → {}", if enabled { "Activo" } else { "Bloqueado" });
        }
        DeviceCommand::Delete { device, yes } => {
            dashboard.refresh_all().await?;
            let pending = dashboard.request_delete(&device).await?;
            if !yes {
                let answer = console.ask(&pending.prompt()).await?.unwrap_or_default();
                if answer.parse::<Command>() != Ok(Command::Confirm(true)) {
                    println!("Eliminación cancelada");
                    return Ok(());
                }
            }
            let name = pending.name().to_owned();
            dashboard.confirm_delete(pending).await?;
            println!("🗑 Dispositivo {name} eliminado");
        }
        DeviceCommand::Register { name } => {
            let registration = dashboard.register_device(&name).await?;
            println!(
                "{}",
                registration.message.as_deref().unwrap_or("Dispositivo registrado")
            );
            if let Some(device) = &registration.device {
                println!("{}", DeviceCard::new(device));
            }
        }
        DeviceCommand::Status { name } => {
            let status = dashboard.device_status(&name).await?;
            if status.authorized {
                println!("✔ {name}: autorizado");
            } else {
                println!(
                    "✖ {name}: {}",
                    status.message.as_deref().unwrap_or("no autorizado")
                );
            }
        }
    }
    Ok(())
}

async fn users<A: OtpApi>(
    dashboard: &Dashboard<A>,
    command: UserCommand,
) -> color_eyre::Result<()> {
    match command {
        UserCommand::List => {
            dashboard.set_tab(Tab::Users).await?;
            print_tab(dashboard, Tab::Users).await;
        }
        UserCommand::Add {
            user_id,
            full_name,
            email,
            cedula,
        } => {
            dashboard
                .set_registration(RegistrationForm {
                    user_id,
                    full_name,
                    email,
                    cedula,
                })
                .await;
            let user_id = dashboard.register_user().await?;
            println!("✅ Usuario registrado: {user_id}");
        }
        UserCommand::Toggle { user_id } => {
            dashboard.set_tab(Tab::Users).await?;
            let enabled = dashboard.toggle_user(&user_id).await?;
            println!("{user_id} → {}", if enabled { "Activo" } else { "Bloqueado" });
        }
        UserCommand::Qr { user_id, out } => {
            let image = dashboard.fetch_qr(&user_id).await?;
            match out {
                Some(path) => {
                    tokio::fs::write(&path, image.as_bytes()).await?;
                    println!("QR de {user_id} guardado en {}", path.display());
                }
                None => println!("{}", image.data_url()),
            }
        }
    }
    Ok(())
}

async fn print_tab<A: OtpApi>(dashboard: &Dashboard<A>, tab: Tab) {
    let snapshot = dashboard.snapshot().await;
    print!("{}", view::render_tab(&snapshot, tab));
}

async fn draw<A: OtpApi>(dashboard: &Dashboard<A>, notice: Option<&str>) -> color_eyre::Result<()> {
    let snapshot = dashboard.snapshot().await;
    let mut out = std::io::stdout().lock();
    write!(out, "\x1b[2J\x1b[H{}", Screen(&snapshot))?;
    if let Some(notice) = notice {
        writeln!(out, "\n{notice}")?;
    }
    write!(out, "\n> ")?;
    out.flush()?;
    Ok(())
}

async fn watch<A: OtpApi>(
    dashboard: Dashboard<A>,
    every: Duration,
    console: &mut Console,
) -> color_eyre::Result<()> {
    let mut revisions = dashboard.state().subscribe();
    let poller = Poller::spawn(dashboard.clone(), every);
    let mut session = Session::new(dashboard.clone());
    let mut notice = Some("Escribe `help` para ver los comandos".to_owned());

    info!(interval_secs = every.as_secs(), "Dashboard started");
    draw(&dashboard, notice.as_deref()).await?;

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            _ = &mut ctrl_c => {
                info!("Received Ctrl+C, shutting down...");
                break;
            }
            changed = revisions.changed() => {
                if changed.is_err() {
                    break;
                }
            }
            line = console.next_line() => {
                let Some(line) = line? else {
                    break;
                };
                notice = match line.parse::<Command>() {
                    Ok(command) => match session.handle(command).await {
                        Flow::Quit => break,
                        Flow::Continue(text) => text,
                    },
                    Err(CommandError::Empty) => None,
                    Err(e) => Some(format!("❌ {e}")),
                };
            }
        }
        draw(&dashboard, notice.as_deref()).await?;
    }

    poller.shutdown().await;
    info!("otp-panel shut down complete");
    Ok(())
}
