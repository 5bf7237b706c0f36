//! `lsnp` — a bare-bones command-line driver for the LSNP peer.
//!
//! Deliberately unstyled: one line of stdin in, one line of stdout out, no
//! color and no grid rendering. The interactive CLI is an external
//! collaborator to the core (spec §1); this binary exists only so the
//! peer controller is exercisable from a terminal, not as a polished UI.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use lsnp_controller::{Config, FileSendOutcome, NullGameSink, PeerController};
use lsnp_network::ResolveError;
use lsnp_types::{FullId, LSNP_DEFAULT_PORT};
use tokio::io::{AsyncBufReadExt, BufReader};
use uuid::Uuid;

#[derive(Parser, Debug)]
#[command(name = "lsnp", about = "A serverless LAN social-networking peer")]
struct Args {
    /// Short handle this peer advertises itself as, e.g. "alice".
    #[arg(long, env = "LSNP_USER")]
    user: String,

    /// UDP listen port.
    #[arg(long, env = "LSNP_PORT", default_value_t = LSNP_DEFAULT_PORT)]
    port: u16,

    /// Directory downloaded files are written under.
    #[arg(long, env = "LSNP_DATA_DIR", default_value = "./lsnp_data")]
    data_dir: PathBuf,

    /// Default TTL (seconds) applied to new posts.
    #[arg(long, env = "LSNP_TTL", default_value_t = 3600)]
    ttl: u32,

    #[arg(long, env = "LSNP_VERBOSE")]
    verbose: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let filter = if args.verbose {
        tracing_subscriber::EnvFilter::new("debug")
    } else {
        tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"))
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let mut config = Config::new(args.user);
    config.port = args.port;
    config.data_dir = args.data_dir;
    config.default_ttl_secs = args.ttl;
    config.verbose = args.verbose;

    let controller = match PeerController::bind(config, Arc::new(NullGameSink)).await {
        Ok(c) => c,
        Err(e) => {
            eprintln!("fatal: failed to bind UDP socket: {e}");
            std::process::exit(1);
        }
    };
    println!("listening as {} on {}", controller.id, controller.local_addr());
    let _tasks = controller.spawn_tasks();

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    println!("type `help` for the command list");
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if handle_command(&controller, line).await {
            break;
        }
    }
    Ok(())
}

/// Runs one command line. Returns `true` if the caller should exit.
async fn handle_command(controller: &Arc<PeerController>, line: &str) -> bool {
    let mut parts = line.splitn(3, ' ');
    let verb = parts.next().unwrap_or("");
    let rest: Vec<&str> = parts.collect();

    match verb {
        "help" => print_help(),
        "quit" => return true,
        "peers" => {
            for peer in controller.peers().await {
                println!("{}\t{}\t{}", peer.user_id, peer.display_name, peer.addr);
            }
        }
        "dms" => {
            for entry in controller.dms().await {
                println!("[{}] {}: {}", entry.timestamp, entry.from, entry.content);
            }
        }
        "dm" => match rest.as_slice() {
            [user, message] => match resolve(controller, user).await {
                Ok(to) => match controller.send_dm(to, message.to_string()).await {
                    Ok(outcome) => println!("{outcome:?}"),
                    Err(e) => println!("error: {e}"),
                },
                Err(e) => println!("{e}"),
            },
            _ => println!("usage: dm <user> <message>"),
        },
        "post" => match rest.as_slice() {
            [content] => {
                let post = controller.send_post(content.to_string(), None).await;
                println!("posted {}", post.post_id);
            }
            _ => println!("usage: post <content>"),
        },
        "like" => match rest.as_slice() {
            [post_id, user] => match resolve(controller, user).await {
                Ok(owner) => match controller.send_like(post_id.to_string(), owner).await {
                    Ok(outcome) => println!("{outcome:?}"),
                    Err(e) => println!("error: {e}"),
                },
                Err(e) => println!("{e}"),
            },
            _ => println!("usage: like <post_ts> <user>"),
        },
        "follow" => match rest.as_slice() {
            [user] => match resolve(controller, user).await {
                Ok(to) => match controller.send_follow(to).await {
                    Ok(outcome) => println!("{outcome:?}"),
                    Err(e) => println!("error: {e}"),
                },
                Err(e) => println!("{e}"),
            },
            _ => println!("usage: follow <user>"),
        },
        "unfollow" => match rest.as_slice() {
            [user] => match resolve(controller, user).await {
                Ok(to) => match controller.send_unfollow(to).await {
                    Ok(outcome) => println!("{outcome:?}"),
                    Err(e) => println!("error: {e}"),
                },
                Err(e) => println!("{e}"),
            },
            _ => println!("usage: unfollow <user>"),
        },
        "broadcast" => controller.broadcast_profile().await,
        "ping" => controller.send_ping_all().await,
        "ttl" => match rest.as_slice() {
            [secs] => match secs.parse() {
                Ok(secs) => controller.set_ttl(secs),
                Err(_) => println!("usage: ttl <seconds>"),
            },
            _ => println!("usage: ttl <seconds>"),
        },
        "sendfile" => match rest.as_slice() {
            [user, path] => send_file(controller, user, path, None).await,
            [user, path, desc] => send_file(controller, user, path, Some(desc.to_string())).await,
            _ => println!("usage: sendfile <user> <path> [desc]"),
        },
        "acceptfile" => match rest.as_slice() {
            [file_id] => respond_to_offer(controller, file_id, true).await,
            _ => println!("usage: acceptfile <fileid>"),
        },
        "rejectfile" => match rest.as_slice() {
            [file_id] => respond_to_offer(controller, file_id, false).await,
            _ => println!("usage: rejectfile <fileid>"),
        },
        "pendingfiles" => {
            for offer in controller.pending_files().await {
                println!("{}\t{}\t{} bytes\tfrom {}", offer.file_id, offer.filename, offer.filesize, offer.sender);
            }
        }
        "transfers" => {
            for transfer in controller.transfers().await {
                println!("{}\t{}\t{:?}", transfer.file_id, transfer.filename, transfer.state);
            }
        }
        "verbose" => {
            let now = controller.toggle_verbose();
            println!("verbose = {now}");
        }
        other => println!("unknown command {other:?}; type `help`"),
    }
    false
}

async fn resolve(controller: &PeerController, handle: &str) -> Result<FullId, String> {
    if let Ok(full) = handle.parse::<FullId>() {
        return Ok(full);
    }
    match controller.resolve_short(handle).await {
        Ok(id) => Ok(id),
        Err(ResolveError::NotFound) => Err(format!("unknown peer {handle:?}")),
        Err(ResolveError::Ambiguous(matches)) => Err(format!(
            "{handle:?} is ambiguous; use the full id: {}",
            matches.iter().map(FullId::to_string).collect::<Vec<_>>().join(", ")
        )),
    }
}

async fn send_file(controller: &Arc<PeerController>, user: &str, path: &str, desc: Option<String>) {
    let to = match resolve(controller, user).await {
        Ok(to) => to,
        Err(e) => {
            println!("{e}");
            return;
        }
    };
    let controller = controller.clone();
    let path = PathBuf::from(path);
    tokio::spawn(async move {
        match controller.send_file(to, path, desc).await {
            Ok(FileSendOutcome::Accepted) => println!("file transfer accepted"),
            Ok(FileSendOutcome::Rejected) => println!("file transfer rejected"),
            Ok(FileSendOutcome::TimedOut) => println!("file offer timed out"),
            Err(e) => println!("sendfile failed: {e}"),
        }
    });
}

async fn respond_to_offer(controller: &PeerController, file_id: &str, accept: bool) {
    let Ok(file_id) = Uuid::parse_str(file_id) else {
        println!("not a valid fileid: {file_id:?}");
        return;
    };
    let Some(offer) = controller
        .pending_files()
        .await
        .into_iter()
        .find(|o| o.file_id == file_id)
    else {
        println!("no pending offer {file_id}");
        return;
    };
    let result = if accept {
        controller.accept_file(file_id, offer.sender).await
    } else {
        controller.reject_file(file_id, offer.sender).await
    };
    match result {
        Ok(outcome) => println!("{outcome:?}"),
        Err(e) => println!("error: {e}"),
    }
}

fn print_help() {
    println!(
        "peers | dms | dm <user> <message> | post <content> | like <post_ts> <user> | \
follow <user> | unfollow <user> | broadcast | ping | ttl <seconds> | \
sendfile <user> <path> [desc] | acceptfile <fileid> | rejectfile <fileid> | \
pendingfiles | transfers | verbose | quit"
    );
}
