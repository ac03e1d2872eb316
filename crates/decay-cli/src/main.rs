use std::env;
use std::net::SocketAddr;

use contracts::{CampaignConfig, ChannelContext, DAY_SECONDS};
use decay_api::{serve, EngineApi};
use tracing::info;

fn print_usage() {
    println!("decay-cli <command>");
    println!("commands:");
    println!("  status [now]");
    println!("  tick [now] [recent_message_count]");
    println!("  diagnostic [now]");
    println!("  serve [addr]");
    println!("    default addr: 127.0.0.1:8080");
    println!("  simulate <campaign_id> <seed> [days] [sqlite_path]");
    println!("    drives a deterministic campaign with a ten-minute tick cadence");
    println!("    and persists every state change to sqlite");
}

fn parse_i64(value: Option<&String>, label: &str, fallback: i64) -> Result<i64, String> {
    match value {
        None => Ok(fallback),
        Some(raw) => raw
            .parse::<i64>()
            .map_err(|_| format!("invalid {label}: {raw}")),
    }
}

fn parse_socket_addr(value: Option<&String>) -> Result<SocketAddr, String> {
    let raw = value.map(String::as_str).unwrap_or("127.0.0.1:8080");
    raw.parse::<SocketAddr>()
        .map_err(|_| format!("invalid addr: {raw}"))
}

fn parse_seed(value: Option<&String>) -> Result<u64, String> {
    let raw = value.ok_or_else(|| "missing seed".to_string())?;
    raw.parse::<u64>()
        .map_err(|_| format!("invalid seed: {raw}"))
}

fn default_sqlite_path() -> String {
    std::env::var("DECAY_SQLITE_PATH")
        .ok()
        .filter(|value| !value.trim().is_empty())
        .unwrap_or_else(|| "decay_campaigns.sqlite".to_string())
}

fn parse_sqlite_path(value: Option<&String>) -> String {
    value
        .map(String::to_string)
        .filter(|path| !path.trim().is_empty())
        .unwrap_or_else(default_sqlite_path)
}

fn wall_clock_now() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs() as i64)
        .unwrap_or(0)
}

fn run_simulation(args: &[String]) -> Result<(), String> {
    let campaign_id = args
        .get(2)
        .cloned()
        .ok_or_else(|| "missing campaign_id".to_string())?;
    let seed = parse_seed(args.get(3))?;
    let days = args
        .get(4)
        .map(|value| {
            value
                .parse::<u32>()
                .map_err(|_| format!("invalid days: {value}"))
        })
        .transpose()?
        .unwrap_or(31)
        .clamp(1, 31);
    let sqlite_path = parse_sqlite_path(args.get(5));

    let mut config = CampaignConfig::default();
    config.campaign_id = campaign_id.clone();
    config.seed = seed;
    config.start_at = 0;

    let mut api = EngineApi::from_config(config).map_err(|err| format!("invalid config: {err}"))?;
    api.attach_sqlite_store(&sqlite_path)
        .map_err(|err| format!("failed to attach sqlite store: {err}"))?;
    api.initialize_campaign_storage(0, true)
        .map_err(|err| format!("failed to initialize campaign storage: {err}"))?;

    let context = ChannelContext {
        recent_message_count: 20,
    };
    let mut announced = 0_u64;
    let mut now = 0_i64;
    let end = i64::from(days) * DAY_SECONDS;
    while now < end {
        let report = api.tick(now, &context);
        announced += report.announcements.len() as u64;

        // From day five onward observers start answering: alternate days
        // solve the challenge, the rest fail it, and every fourth day tries
        // a plain reboot instead.
        if now % DAY_SECONDS == 0 && now >= 5 * DAY_SECONDS {
            let day = now / DAY_SECONDS;
            if day % 4 == 0 {
                let _ = api.reboot(now, "observer:drill");
            } else {
                let descriptor = api.request_challenge(None, now, "observer:drill");
                let answer = if day % 2 == 0 {
                    api.challenge_reference_answer(&descriptor.instance_id)
                        .unwrap_or_default()
                } else {
                    "deliberately wrong".to_string()
                };
                let _ = api.submit_challenge(
                    &descriptor.instance_id,
                    &answer,
                    now + 30,
                    "observer:drill",
                );
            }
        }

        now += 600;
    }

    if let Some(error) = api.last_persistence_error() {
        return Err(format!("persistence error after simulation: {error}"));
    }

    let status = api.status(end - 1);
    println!(
        "simulated campaign_id={} seed={} days={} announced={} final: {} sqlite={}",
        campaign_id, seed, days, announced, status, sqlite_path
    );
    Ok(())
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args: Vec<String> = env::args().collect();
    let command = args.get(1).map(String::as_str);

    match command {
        Some("status") => match parse_i64(args.get(2), "now", wall_clock_now()) {
            Ok(now) => match EngineApi::from_config(CampaignConfig::default()) {
                Ok(api) => println!("{}", api.status(now)),
                Err(err) => {
                    eprintln!("error: {err}");
                    std::process::exit(2);
                }
            },
            Err(err) => {
                eprintln!("error: {err}");
                print_usage();
                std::process::exit(2);
            }
        },
        Some("tick") => {
            let now = match parse_i64(args.get(2), "now", wall_clock_now()) {
                Ok(now) => now,
                Err(err) => {
                    eprintln!("error: {err}");
                    print_usage();
                    std::process::exit(2);
                }
            };
            let recent = args
                .get(3)
                .and_then(|value| value.parse::<u32>().ok())
                .unwrap_or(0);
            match EngineApi::from_config(CampaignConfig::default()) {
                Ok(mut api) => {
                    let report = api.tick(
                        now,
                        &ChannelContext {
                            recent_message_count: recent,
                        },
                    );
                    info!(
                        campaign_day = ?report.campaign_day,
                        drift = ?report.drift_raised_to,
                        announcements = report.announcements.len(),
                        "tick applied"
                    );
                    for announcement in report.announcements {
                        println!("[{}] {}", announcement.severity, announcement.payload);
                    }
                    println!("{}", api.status(now));
                }
                Err(err) => {
                    eprintln!("error: {err}");
                    std::process::exit(2);
                }
            }
        }
        Some("diagnostic") => match parse_i64(args.get(2), "now", wall_clock_now()) {
            Ok(now) => match EngineApi::from_config(CampaignConfig::default()) {
                Ok(api) => println!("{}", api.diagnostic_report(now)),
                Err(err) => {
                    eprintln!("error: {err}");
                    std::process::exit(2);
                }
            },
            Err(err) => {
                eprintln!("error: {err}");
                print_usage();
                std::process::exit(2);
            }
        },
        Some("serve") => match parse_socket_addr(args.get(2)) {
            Ok(addr) => {
                println!("serving api on http://{addr}");
                if let Err(err) = serve(addr).await {
                    eprintln!("server error: {err}");
                    std::process::exit(1);
                }
            }
            Err(err) => {
                eprintln!("error: {err}");
                print_usage();
                std::process::exit(2);
            }
        },
        Some("simulate") => {
            if let Err(err) = run_simulation(&args) {
                eprintln!("error: {err}");
                print_usage();
                std::process::exit(2);
            }
        }
        _ => {
            print_usage();
        }
    }
}
