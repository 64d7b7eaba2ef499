mod settings;

use std::{path::PathBuf, sync::Arc, time::Duration};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use client_core::{AccountService, MediaStore, ProfileController, ProfileStore};
use rest_backend::RestBackend;
use url::Url;

#[derive(Parser, Debug)]
struct Cli {
    /// Backend base URL (overrides fitsync.toml / APP__BASE_URL).
    #[arg(long)]
    base_url: Option<String>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    Login {
        email: String,
        password: String,
    },
    Signup {
        email: String,
        password: String,
        display_name: String,
    },
    ResetPassword {
        email: String,
    },
    Fetch {
        email: String,
        password: String,
    },
    Save {
        email: String,
        password: String,
        weight: String,
        height: String,
        age: String,
        gender: String,
        bmi: String,
    },
    SetName {
        email: String,
        password: String,
        name: String,
    },
    SetPassword {
        email: String,
        password: String,
        new_password: String,
    },
    UploadImage {
        email: String,
        password: String,
        file: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let cli = Cli::parse();
    let mut settings = settings::load_settings();
    if let Some(base_url) = cli.base_url {
        settings.base_url = base_url;
    }

    let base_url = Url::parse(&settings.base_url)
        .with_context(|| format!("invalid base url {}", settings.base_url))?;
    let backend = Arc::new(RestBackend::new(base_url, settings.api_key));
    let controller = ProfileController::with_services(
        backend.clone() as Arc<dyn AccountService>,
        backend.clone() as Arc<dyn ProfileStore>,
        backend as Arc<dyn MediaStore>,
    );

    match cli.command {
        Command::Login { email, password } => {
            controller.sign_in(&email, &password).await;
            wait_for_session(&controller).await;
        }
        Command::Signup {
            email,
            password,
            display_name,
        } => {
            controller.sign_up(&email, &password, &display_name).await;
            wait_for_session(&controller).await;
        }
        Command::ResetPassword { email } => {
            controller.request_password_reset(&email).await;
        }
        Command::Fetch { email, password } => {
            sign_in(&controller, &email, &password).await?;
            controller.fetch_profile().await;
        }
        Command::Save {
            email,
            password,
            weight,
            height,
            age,
            gender,
            bmi,
        } => {
            sign_in(&controller, &email, &password).await?;
            controller
                .save_profile(&weight, &height, &age, &gender, &bmi)
                .await;
        }
        Command::SetName {
            email,
            password,
            name,
        } => {
            sign_in(&controller, &email, &password).await?;
            controller.update_display_name(&name).await;
        }
        Command::SetPassword {
            email,
            password,
            new_password,
        } => {
            sign_in(&controller, &email, &password).await?;
            controller.update_password(&new_password).await;
        }
        Command::UploadImage {
            email,
            password,
            file,
        } => {
            sign_in(&controller, &email, &password).await?;
            let bytes = std::fs::read(&file)
                .with_context(|| format!("reading {}", file.display()))?;
            controller.upload_profile_image(bytes).await;
        }
    }

    while let Some(message) = controller.consume_notification().await {
        println!("{message}");
    }

    let session = controller.session();
    if session.is_authenticated {
        println!(
            "signed in as {} ({})",
            session.display_name.as_deref().unwrap_or("<unnamed>"),
            session
                .identity
                .as_ref()
                .map(|id| id.as_str())
                .unwrap_or("<no identity>"),
        );
    }

    let profile = controller.profile();
    if profile != shared::domain::ProfileAttributes::default() {
        println!(
            "profile: weight={:?} height={:?} age={:?} gender={:?} bmi={:?} image={:?}",
            profile.weight,
            profile.height,
            profile.age,
            profile.gender,
            profile.bmi,
            profile.profile_image_url,
        );
    }

    Ok(())
}

/// Signs in and drains the login notification so command output only
/// carries messages from the command itself.
async fn sign_in(controller: &Arc<ProfileController>, email: &str, password: &str) -> Result<()> {
    controller.sign_in(email, password).await;
    wait_for_session(controller).await;
    let message = controller.consume_notification().await;
    if !controller.session().is_authenticated {
        anyhow::bail!(
            "{}",
            message.unwrap_or_else(|| "login failed".into())
        );
    }
    Ok(())
}

/// Session updates arrive through the listener task; give it a moment
/// to apply the result of an auth call before reading the mirror.
async fn wait_for_session(controller: &Arc<ProfileController>) {
    let mut session = controller.subscribe_session();
    let _ = tokio::time::timeout(
        Duration::from_secs(2),
        session.wait_for(|s| s.is_authenticated),
    )
    .await;
}
