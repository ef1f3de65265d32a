use clap::{Parser, Subcommand};
use client::auth::{AuthContext, AuthFlow, Navigator};
use client::config::ClientConfig;
use client::detect::{DetectionSession, detect_selected};
use client::session::{FileStore, MemoryStore, SessionStore};
use client::transport::ReqwestTransport;
use shared::{SortDirection, SortKey, SortState};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "client", about = "Sign in and run object detection against the detect API")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Sign in with email and password
    Login {
        #[arg(long, env = "DETECT_EMAIL")]
        email: String,
        #[arg(long, env = "DETECT_PASSWORD", hide_env_values = true)]
        password: String,
        /// Keep the refresh token on disk
        #[arg(long)]
        remember: bool,
    },
    /// Create an account
    Signup {
        #[arg(long)]
        fullname: String,
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: String,
        #[arg(long)]
        confirm: String,
    },
    /// Email a one-time passcode for password recovery
    SendOtp {
        #[arg(long)]
        email: String,
    },
    VerifyOtp {
        #[arg(long)]
        email: String,
        #[arg(long)]
        otp: String,
    },
    ReplacePassword {
        #[arg(long)]
        email: String,
        #[arg(long)]
        otp: String,
        #[arg(long)]
        password: String,
        #[arg(long)]
        confirm: String,
    },
    Whoami,
    Logout,
    /// Upload an image and print the detections
    Detect {
        image: PathBuf,
        /// label, confidence or bbox
        #[arg(long, default_value = "confidence")]
        sort: SortKey,
        #[arg(long)]
        ascending: bool,
    },
}

struct PrintNavigator;

impl Navigator for PrintNavigator {
    fn navigate(&self, path: &str) {
        println!("next: {}", path);
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    dotenv::dotenv().ok();
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    let cli = Cli::parse();
    if let Err(e) = run(cli).await {
        log::error!("{}", e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let config = ClientConfig::from_env()?;
    log::info!(
        "Using API at {} (state in {})",
        config.base_url,
        config.storage_dir.display()
    );

    let transport = ReqwestTransport::new(config.base_url.clone(), config.timeout)?;
    let session = SessionStore::new(
        Arc::new(FileStore::new(&config.storage_dir)),
        Arc::new(MemoryStore::new()),
    );

    if let Command::Detect {
        image,
        sort,
        ascending,
    } = cli.command
    {
        let direction = if ascending {
            SortDirection::Asc
        } else {
            SortDirection::Desc
        };
        return detect(&transport, image, SortState { key: sort, direction }).await;
    }

    let flow = AuthFlow::new(
        transport,
        AuthContext {
            session,
            navigator: Arc::new(PrintNavigator),
        },
    );

    match cli.command {
        Command::Login {
            email,
            password,
            remember,
        } => {
            let user = flow.sign_in(&email, &password, remember).await?;
            println!("Signed in as {} <{}>", user.fullname, user.email);
        }
        Command::Signup {
            fullname,
            email,
            password,
            confirm,
        } => {
            let user = flow.sign_up(&fullname, &email, &password, &confirm).await?;
            println!("Account created for {}", user.email);
        }
        Command::SendOtp { email } => {
            flow.send_otp(&email).await?;
            println!("OTP sent to {}", email);
        }
        Command::VerifyOtp { email, otp } => {
            flow.verify_otp(&email, &otp).await?;
            println!("OTP verified");
        }
        Command::ReplacePassword {
            email,
            otp,
            password,
            confirm,
        } => {
            flow.replace_password(&email, &otp, &password, &confirm)
                .await?;
            println!("Password replaced");
        }
        Command::Whoami => match flow.session().session() {
            Some(current) => {
                println!("{} <{}>", current.user.fullname, current.user.email);
                println!(
                    "refresh token remembered: {}",
                    flow.session().durable_refresh_token().is_some()
                );
            }
            None => println!("Not signed in"),
        },
        Command::Logout => flow.logout()?,
        Command::Detect { .. } => {}
    }

    Ok(())
}

async fn detect(
    transport: &ReqwestTransport,
    path: PathBuf,
    sort: SortState,
) -> Result<(), Box<dyn std::error::Error>> {
    let mime_type = image::ImageFormat::from_path(&path)?.to_mime_type();
    let bytes = std::fs::read(&path)?;
    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "image".to_string());

    let mut session = DetectionSession::new();
    session.select_image(file_name, mime_type, bytes)?;
    session.set_sort(sort);

    detect_selected(&mut session, transport).await?;
    if let Some(message) = session.error() {
        return Err(message.to_string().into());
    }

    let table = session.table();
    for record in table.sorted() {
        println!(
            "{:<20} {:>3}%  {:<24} {}",
            record.label,
            record.confidence_percent,
            record.bounding_box,
            record.color_key.as_ref()
        );
    }

    let aggregates = table.aggregates();
    println!(
        "{} objects, {} with confidence >= {}%",
        aggregates.total,
        aggregates.confident,
        client::detect::CONFIDENT_THRESHOLD
    );
    if let Some(source) = session.image_source() {
        println!("annotated image: {}", source);
    }

    Ok(())
}
