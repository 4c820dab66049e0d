use clap::Parser;
use client::network::Client;
use log::{error, info};
use macroquad::window::Conf;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// WebSocket URL of the game server
    #[arg(short = 's', long, default_value = "wss://codepath-mmorg.onrender.com")]
    server: String,

    /// Display name sent when joining
    #[arg(short = 'u', long, default_value = "Guest")]
    username: String,

    /// Background map image
    #[arg(short = 'm', long, default_value = "world.jpg")]
    map: String,

    /// Window width
    #[arg(short = 'w', long, default_value = "1024")]
    width: i32,

    /// Window height (no short flag to avoid conflict with --help)
    #[arg(long, default_value = "768")]
    height: i32,
}

fn window_conf() -> Conf {
    let args = Args::parse();
    Conf {
        window_title: "World Viewer".to_string(),
        window_width: args.width,
        window_height: args.height,
        window_resizable: true,
        ..Default::default()
    }
}

#[macroquad::main(window_conf)]
async fn main() {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();

    info!("Starting client...");
    info!("Connecting to: {}", args.server);
    info!("Controls: arrows/WASD to move, Tab to toggle the player list");

    match Client::new(&args.server, &args.username, &args.map) {
        Ok(mut client) => client.run().await,
        Err(e) => error!("Failed to start client: {}", e),
    }
}
