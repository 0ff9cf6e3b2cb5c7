use clap::Parser;
use log::{info, warn};
use rand::seq::SliceRandom;
use std::time::Duration;

use client::commands::ReadyOutcome;
use client::engine::GameClient;
use client::session::{GameMode, Phase};
use client::transport::HttpTransport;
use shared::{Cell, Coord, BOARD_SIZE};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// API root of the game server
    #[arg(short = 's', long, default_value = "http://127.0.0.1:8080/api")]
    server: String,

    /// Player name to register under
    #[arg(short = 'n', long, default_value = "player1")]
    name: String,

    /// Game mode for a new session: PVE or PVP
    #[arg(short = 'm', long, default_value = "PVE")]
    mode: GameMode,

    /// Join this existing session instead of creating one
    #[arg(short = 'j', long)]
    join: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();

    info!("Starting sea battle client...");
    info!("Server: {}", args.server);

    let transport = HttpTransport::new(&args.server)?;
    let mut game = GameClient::new(transport);

    match &args.join {
        Some(session_id) => {
            info!("Joining session {session_id} as {}", args.name);
            game.join_game(session_id, &args.name).await?;
        }
        None => {
            info!("Creating a {:?} session as {}", args.mode, args.name);
            game.create_new_game(&args.name, args.mode).await?;
            game.auto_place_ships().await?;
            if let ReadyOutcome::Degraded = game.mark_ready().await? {
                warn!("Server skipped the ready handshake, continuing locally");
            }
        }
    }

    let mut ticker = tokio::time::interval(Duration::from_millis(500));
    let mut rng = rand::thread_rng();

    loop {
        ticker.tick().await;
        game.pump_events();

        if let Err(e) = game.load_game_state().await {
            warn!("state refresh failed: {e}");
            continue;
        }

        let shown: Vec<u64> = game
            .notifications()
            .iter()
            .map(|note| {
                info!("[{:?}] {}", note.severity, note.message);
                note.id
            })
            .collect();
        for id in shown {
            game.dismiss_notification(id);
        }

        match game.session().phase() {
            Phase::Finished => {
                match game.session().winner() {
                    Some(winner) => info!("Game over, winner: {winner}"),
                    None => info!("Game over"),
                }
                break;
            }
            Phase::InProgress if game.session().is_my_turn() => {
                let targets: Vec<Coord> = (0..BOARD_SIZE)
                    .flat_map(|row| (0..BOARD_SIZE).map(move |col| Coord::new(row, col)))
                    .filter(|c| game.opponent_board().get(*c) == Some(Cell::Empty))
                    .collect();
                let Some(target) = targets.choose(&mut rng).copied() else {
                    warn!("no cells left to fire at");
                    break;
                };
                match game.fire(target.row, target.col).await {
                    Ok(hit) => info!(
                        "Fired at {}{}: {}",
                        (b'A' + target.col as u8) as char,
                        target.row + 1,
                        if hit { "hit!" } else { "miss" }
                    ),
                    Err(e) => warn!("shot rejected: {e}"),
                }
            }
            phase => {
                info!("Waiting ({phase})...");
            }
        }
    }

    Ok(())
}
