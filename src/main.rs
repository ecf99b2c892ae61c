use clap::{Arg, ArgAction, Command};
use log::LevelFilter;
use sms_guardian::disposition::{BackgroundTask, DispositionRouter, IncomingSms};
use sms_guardian::store::{ContactSource, MemoryStore, SpamSource, SpamType};
use sms_guardian::{AnalysisResult, Config, SmsAnalyzer};
use std::process;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};

#[tokio::main]
async fn main() {
    let matches = Command::new("sms-guardian")
        .version(env!("CARGO_PKG_VERSION"))
        .about("SMS threat scoring: smishing, vishing and premium-rate fraud detection")
        .long_about(
            "Scores an SMS (sender + body) and decides whether it is safe, should be \
             quarantined for review, or blocked.\n\n\
             Without --sender/--body, reads newline-delimited JSON tasks \
             ({\"phoneNumber\": ..., \"messageBody\": ...}) from stdin.",
        )
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("Configuration file path")
                .default_value("/etc/sms-guardian.yaml"),
        )
        .arg(
            Arg::new("generate-config")
                .long("generate-config")
                .value_name("FILE")
                .help("Generate a default configuration file")
                .action(ArgAction::Set),
        )
        .arg(
            Arg::new("test-config")
                .long("test-config")
                .help("Validate the configuration and pattern library, then exit")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("sender")
                .short('s')
                .long("sender")
                .value_name("NUMBER")
                .help("Sender of the message to analyze")
                .requires("body")
                .action(ArgAction::Set),
        )
        .arg(
            Arg::new("body")
                .short('b')
                .long("body")
                .value_name("TEXT")
                .help("Body of the message to analyze")
                .requires("sender")
                .action(ArgAction::Set),
        )
        .arg(
            Arg::new("contact")
                .long("contact")
                .value_name("NUMBER")
                .help("Treat NUMBER as a known contact (repeatable)")
                .action(ArgAction::Append),
        )
        .arg(
            Arg::new("spam-number")
                .long("spam-number")
                .value_name("NUMBER")
                .help("Treat NUMBER as a reported spammer (repeatable)")
                .action(ArgAction::Append),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .help("Enable verbose logging with per-signal scoring detail")
                .action(ArgAction::SetTrue),
        )
        .get_matches();

    if let Some(generate_path) = matches.get_one::<String>("generate-config") {
        init_logger(matches.get_flag("verbose"), None);
        generate_default_config(generate_path);
        return;
    }

    let config_path = matches
        .get_one::<String>("config")
        .map(String::as_str)
        .unwrap_or("/etc/sms-guardian.yaml");
    let config_exists = std::path::Path::new(config_path).exists();

    let config = match load_config(config_path, config_exists) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error loading configuration: {e:#}");
            process::exit(1);
        }
    };

    init_logger(matches.get_flag("verbose"), config.log_level());
    if !config_exists {
        log::warn!("Configuration file '{config_path}' not found, using default configuration");
    }

    if matches.get_flag("test-config") {
        test_config(&config);
        return;
    }

    // Store keys follow the pattern library's local country code
    let local_prefix = match config.load_patterns() {
        Ok(patterns) => patterns.local_prefix,
        Err(e) => {
            eprintln!("Error loading pattern library: {e:#}");
            process::exit(1);
        }
    };
    let store = Arc::new(MemoryStore::with_local_prefix(&local_prefix));
    if let Some(contacts) = matches.get_many::<String>("contact") {
        for number in contacts {
            store.add_contact(number, number, ContactSource::Manual).await;
        }
    }
    if let Some(numbers) = matches.get_many::<String>("spam-number") {
        for number in numbers {
            store
                .add_spam_number(number, SpamType::UserBlocked, SpamSource::Manual)
                .await;
        }
    }

    let analyzer = match SmsAnalyzer::from_config(&config, store.clone(), store.clone()) {
        Ok(analyzer) => Arc::new(analyzer),
        Err(e) => {
            eprintln!("Error building analyzer: {e:#}");
            process::exit(1);
        }
    };
    let router = DispositionRouter::new(analyzer, store.clone());

    match (
        matches.get_one::<String>("sender"),
        matches.get_one::<String>("body"),
    ) {
        (Some(sender), Some(body)) => {
            let result = router
                .handle_incoming(IncomingSms {
                    phone_number: sender.clone(),
                    message_body: body.clone(),
                    timestamp: None,
                })
                .await;
            print_result(&result, true);
        }
        _ => {
            if let Err(e) = process_stdin(&router).await {
                eprintln!("Error reading tasks: {e}");
                process::exit(1);
            }
        }
    }

    let pending = store.pending_quarantine_count().await;
    if pending > 0 {
        log::info!("{} message(s) waiting in quarantine", pending);
    }
}

fn init_logger(verbose: bool, configured: Option<LevelFilter>) {
    let log_level = if verbose {
        LevelFilter::Debug
    } else {
        configured.unwrap_or(LevelFilter::Info)
    };

    env_logger::Builder::from_default_env()
        .filter_level(log_level)
        .init();
}

fn load_config(path: &str, exists: bool) -> anyhow::Result<Config> {
    if exists {
        Config::load_from_file(path)
    } else {
        let mut config = Config::default();
        config.apply_env_overrides();
        Ok(config)
    }
}

fn generate_default_config(path: &str) {
    match Config::generate_default(path) {
        Ok(()) => {
            println!("Default configuration written to: {path}");
            println!("Please edit the configuration file to suit your needs.");
        }
        Err(e) => {
            eprintln!("Error writing configuration file: {e:#}");
            process::exit(1);
        }
    }
}

fn test_config(config: &Config) {
    println!("🔍 Testing configuration...");
    println!();
    println!(
        "Thresholds: suspicious >= {}, malicious >= {}",
        config.security.suspicious_threshold, config.security.malicious_threshold
    );
    println!(
        "Content pattern weight: {}",
        config.security.content_pattern_weight
    );

    let external = &config.external;
    let online: Vec<&str> = [
        ("virustotal", external.virustotal_key().is_some()),
        ("google_safe_browsing", external.safe_browsing_key().is_some()),
        ("phishtank", external.phishtank_enabled),
    ]
    .iter()
    .filter(|(_, enabled)| *enabled)
    .map(|(name, _)| *name)
    .collect();
    if online.is_empty() {
        println!("Online URL verification: disabled");
    } else {
        println!("Online URL verification: {}", online.join(", "));
    }

    match config.load_patterns() {
        Ok(patterns) => {
            println!(
                "Pattern library {} ({}): {} content patterns, {} brands, {} high-risk prefixes",
                patterns.version,
                patterns.locale,
                patterns.suspicious.len(),
                patterns.brands.len(),
                patterns.high_risk_prefixes.len()
            );
            println!("✅ Configuration is valid");
        }
        Err(e) => {
            println!("❌ Configuration validation failed:");
            println!("Error: {e:#}");
            process::exit(1);
        }
    }
}

async fn process_stdin(router: &DispositionRouter) -> std::io::Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        let task: BackgroundTask = match serde_json::from_str(&line) {
            Ok(task) => task,
            Err(e) => {
                log::warn!("Skipping malformed task: {e}");
                continue;
            }
        };
        if let Some(result) = router.handle_background(task).await {
            print_result(&result, false);
        }
    }
    Ok(())
}

fn print_result(result: &AnalysisResult, pretty: bool) {
    let rendered = if pretty {
        serde_json::to_string_pretty(result)
    } else {
        serde_json::to_string(result)
    };
    match rendered {
        Ok(json) => println!("{json}"),
        Err(e) => eprintln!("Error serializing result: {e}"),
    }
}
