//! Dockyard - image and container orchestration over a Docker-compatible engine
//!
//! This is the main CLI entry point for Dockyard.

use clap::{Parser, Subcommand};
use dockyard::daemon::{DaemonConfig, DockyardDaemon, DEFAULT_LISTEN_ADDR};
use dockyard::engine::{self, EngineConfig, EngineKind, DEFAULT_ENGINE_TIMEOUT};
use dockyard::error::{DockyardError, Result};
use dockyard::orchestrator::Orchestrator;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// Dockyard - image and container orchestration
#[derive(Parser)]
#[command(name = "dockyard")]
#[command(author = "Evoker Industries")]
#[command(version)]
#[command(about = "Build images and drive containers through a Docker-compatible engine", long_about = None)]
struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,

    /// Engine implementation
    #[arg(long, global = true, value_enum, env = "DOCKYARD_ENGINE", default_value = "docker")]
    engine: EngineKind,

    /// Engine daemon address (unix socket path, tcp:// or http:// URL)
    #[arg(long, global = true, env = "DOCKER_HOST")]
    docker_host: Option<String>,

    /// Engine request timeout in seconds
    #[arg(long, global = true, env = "DOCKYARD_ENGINE_TIMEOUT", default_value_t = DEFAULT_ENGINE_TIMEOUT)]
    engine_timeout: u64,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the HTTP API
    Serve {
        /// Address to listen on
        #[arg(long, env = "DOCKYARD_LISTEN", default_value = DEFAULT_LISTEN_ADDR)]
        listen: SocketAddr,
    },

    /// Build an image from a directory containing a Dockerfile
    Build {
        /// Build context path
        #[arg(default_value = ".")]
        path: PathBuf,
        /// Image tag
        #[arg(short, long)]
        tag: String,
    },

    /// Manage images
    Image {
        #[command(subcommand)]
        command: ImageCommands,
    },

    /// Create a container publishing one TCP port
    Create {
        /// Image tag or ID
        image: String,
        /// Host address to bind
        #[arg(long, default_value = "0.0.0.0")]
        address: String,
        /// Port published on the host and the container
        #[arg(short, long)]
        port: String,
    },

    /// Start a container
    Start {
        /// Container ID
        container: String,
    },

    /// Stop a container
    Stop {
        /// Container ID
        container: String,
    },

    /// Pause a container
    Pause {
        /// Container ID
        container: String,
    },

    /// Unpause a container
    Unpause {
        /// Container ID
        container: String,
    },

    /// Remove a container
    #[command(name = "rm")]
    Remove {
        /// Container ID
        container: String,
    },

    /// Check whether a container exists
    Exists {
        /// Container ID
        container: String,
    },

    /// Show a container as JSON
    Inspect {
        /// Container ID
        container: String,
    },

    /// Stop every container created from an image
    StopByImage {
        /// Image ID
        image_id: String,
    },
}

#[derive(Subcommand)]
enum ImageCommands {
    /// Confirm an image with this exact tag exists
    Find {
        /// Image tag
        tag: String,
    },
    /// Print the ID of the image with this tag
    Id {
        /// Image tag
        tag: String,
    },
    /// Remove an image by tag
    #[command(name = "rm")]
    Remove {
        /// Image tag
        tag: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if cli.debug {
            EnvFilter::new("debug")
        } else {
            EnvFilter::new("info")
        }
    });

    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config = EngineConfig {
        kind: cli.engine,
        docker_host: cli.docker_host,
        timeout: Duration::from_secs(cli.engine_timeout),
    };

    let engine = engine::connect(&config).await?;
    let orchestrator = Orchestrator::new(engine);

    match cli.command {
        Commands::Serve { listen } => {
            let daemon = DockyardDaemon::new(DaemonConfig { listen_addr: listen }, orchestrator);
            daemon.run().await?;
        }

        Commands::Build { path, tag } => {
            let tag = orchestrator.create_image(&tag, &path).await?;
            println!("Successfully built {}", tag);
        }

        Commands::Image { command } => match command {
            ImageCommands::Find { tag } => {
                println!("{}", orchestrator.find_image(&tag).await?);
            }
            ImageCommands::Id { tag } => {
                println!("{}", orchestrator.image_id(&tag).await?);
            }
            ImageCommands::Remove { tag } => {
                orchestrator.delete_image(&tag).await?;
                println!("Deleted {}", tag);
            }
        },

        Commands::Create {
            image,
            address,
            port,
        } => {
            let id = orchestrator.create_container(&image, &address, &port).await?;
            println!("{}", id);
        }

        Commands::Start { container } => {
            orchestrator.start_container(&container).await?;
            println!("{}", container);
        }

        Commands::Stop { container } => {
            orchestrator.stop_container(&container).await?;
            println!("{}", container);
        }

        Commands::Pause { container } => {
            orchestrator.pause_container(&container).await?;
            println!("{}", container);
        }

        Commands::Unpause { container } => {
            orchestrator.unpause_container(&container).await?;
            println!("{}", container);
        }

        Commands::Remove { container } => {
            orchestrator.delete_container(&container).await?;
            println!("{}", container);
        }

        Commands::Exists { container } => {
            if orchestrator.container_exists(&container).await? {
                println!("Container exists");
            } else {
                println!("Container not found");
                std::process::exit(1);
            }
        }

        Commands::Inspect { container } => {
            let descriptor = orchestrator.get_container(&container).await?;
            let json = serde_json::to_string_pretty(&descriptor)
                .map_err(|e| DockyardError::Internal(e.to_string()))?;
            println!("{}", json);
        }

        Commands::StopByImage { image_id } => {
            let stopped = orchestrator.stop_containers_by_image(&image_id).await?;
            println!("Stopped {} containers", stopped);
        }
    }

    Ok(())
}
