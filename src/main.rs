use clap::{Arg, ArgAction, ArgMatches, Command};
use colored::*;
use std::process;
use std::str::FromStr;
use tokio_util::sync::CancellationToken;

use autorecon::{
    config::ReconConfig,
    recon::{Recon, ReconResults},
    techniques::NmapProfile,
};

const EXIT_INTERRUPTED: i32 = 130;

// Ulimit adjustment for Unix systems
#[cfg(unix)]
fn adjust_ulimit_size(ulimit: Option<u64>) -> u64 {
    use rlimit::Resource;

    if let Some(limit) = ulimit {
        if Resource::NOFILE.set(limit, limit).is_ok() {
            println!(
                "{} {}",
                "[~] Increasing ulimit value to".bright_blue(),
                limit.to_string().bright_cyan().bold()
            );
        } else {
            eprintln!("{}", "[!] ERROR: Failed to set ulimit value.".bright_red());
        }
    }

    match Resource::NOFILE.get() {
        Ok((soft, _)) => soft,
        Err(_) => {
            eprintln!("{}", "[!] WARNING: Could not get file descriptor limit".bright_yellow());
            65535
        }
    }
}

#[cfg(not(unix))]
fn adjust_ulimit_size(_ulimit: Option<u64>) -> u64 {
    65535
}

fn print_banner() {
    println!("{}", "    _         _        ____                      ".truecolor(231, 76, 60).bold());
    println!("{}", "   / \\  _   _| |_ ___ |  _ \\ ___  ___ ___  _ __  ".truecolor(231, 76, 60).bold());
    println!("{}", "  / _ \\| | | | __/ _ \\| |_) / _ \\/ __/ _ \\| '_ \\ ".truecolor(231, 76, 60).bold());
    println!("{}", " / ___ \\ |_| | || (_) |  _ <  __/ (_| (_) | | | |".truecolor(231, 76, 60).bold());
    println!("{}", "/_/   \\_\\__,_|\\__\\___/|_| \\_\\___|\\___\\___/|_| |_|".truecolor(231, 76, 60).bold());
    println!();
    println!(
        "{}",
        format!("AutoRecon {} - subdomains, ports, technology", env!("CARGO_PKG_VERSION"))
            .truecolor(255, 215, 0)
            .bold()
    );
    println!("{}", "------------------------------------------------------".bright_blue());
    println!("{}", ": Only scan targets you are authorized to test.       :".bright_blue());
    println!("{}", "------------------------------------------------------".bright_blue());
    println!();
}

fn build_cli() -> Command {
    Command::new("autorecon")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Concurrent subdomain discovery, port scanning and technology fingerprinting")
        .arg(
            Arg::new("target-pos")
                .value_name("TARGET")
                .help("Target domain, host, or host:port")
                .index(1),
        )
        .arg(
            Arg::new("target")
                .short('t')
                .long("target")
                .value_name("TARGET")
                .help("Target domain, host, or host:port")
                .conflicts_with("target-pos"),
        )
        .arg(
            Arg::new("threads")
                .long("threads")
                .value_name("N")
                .help("Worker budget for each task")
                .value_parser(clap::value_parser!(usize)),
        )
        .arg(
            Arg::new("timeout")
                .long("timeout")
                .value_name("SECONDS")
                .help("Connect and HTTP timeout for each probe")
                .value_parser(clap::value_parser!(f64)),
        )
        .arg(
            Arg::new("output")
                .short('o')
                .long("output")
                .value_name("DIR")
                .help("Base directory for results"),
        )
        .arg(
            Arg::new("wordlist")
                .short('w')
                .long("wordlist")
                .value_name("FILE")
                .help("Extra subdomain labels, one per line"),
        )
        .arg(
            Arg::new("top-ports")
                .long("top-ports")
                .help("Add the top-ports list to the common ports")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("no-banner-grab")
                .long("no-banner-grab")
                .help("Do not read service banners from open ports")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("no-tools")
                .long("no-tools")
                .help("Never run external tools, even when installed")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("scan-profile")
                .long("scan-profile")
                .value_name("PROFILE")
                .help("nmap profile: basic, fast, comprehensive, stealth")
                .value_parser(["basic", "fast", "comprehensive", "stealth"]),
        )
        .arg(
            Arg::new("skip-subdomains")
                .long("skip-subdomains")
                .help("Skip subdomain enumeration")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("skip-ports")
                .long("skip-ports")
                .help("Skip port scanning")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("skip-tech")
                .long("skip-tech")
                .help("Skip technology detection")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("TOML configuration file (default: ~/.autorecon.toml)"),
        )
        .arg(
            Arg::new("ulimit")
                .short('u')
                .long("ulimit")
                .value_name("LIMIT")
                .help("Automatically increase ulimit to this value")
                .value_parser(clap::value_parser!(u64)),
        )
        .arg(
            Arg::new("no-banner")
                .long("no-banner")
                .help("Hide the startup banner")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("quiet")
                .short('q')
                .long("quiet")
                .help("Do not print discoveries as they happen")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .help("Debug logging")
                .action(ArgAction::SetTrue),
        )
}

/// File configuration with command line overrides applied
fn build_config(matches: &ArgMatches) -> anyhow::Result<ReconConfig> {
    let mut config = match matches.get_one::<String>("config") {
        Some(path) => ReconConfig::from_toml_file(path)?,
        None => ReconConfig::load_default_config(),
    };

    if let Some(target) = matches
        .get_one::<String>("target")
        .or_else(|| matches.get_one::<String>("target-pos"))
    {
        config.target = target.clone();
    }
    if let Some(threads) = matches.get_one::<usize>("threads") {
        config.threads = *threads;
    }
    if let Some(secs) = matches.get_one::<f64>("timeout") {
        let millis = (secs * 1000.0).round().max(0.0) as u64;
        config.timeout = millis;
        config.http_timeout = millis;
    }
    if let Some(output) = matches.get_one::<String>("output") {
        config.output_dir = output.into();
    }
    if let Some(wordlist) = matches.get_one::<String>("wordlist") {
        config.wordlist = Some(wordlist.into());
    }
    if let Some(profile) = matches.get_one::<String>("scan-profile") {
        config.scan_profile = NmapProfile::from_str(profile).map_err(anyhow::Error::msg)?;
    }
    if matches.get_flag("top-ports") {
        config.top_ports = true;
    }
    if matches.get_flag("no-banner-grab") {
        config.banner_grab = false;
    }
    if matches.get_flag("no-tools") {
        config.use_tools = false;
    }
    if matches.get_flag("skip-subdomains") {
        config.skip_subdomains = true;
    }
    if matches.get_flag("skip-ports") {
        config.skip_ports = true;
    }
    if matches.get_flag("skip-tech") {
        config.skip_tech = true;
    }
    if matches.get_flag("quiet") {
        config.realtime_notifications = false;
    }
    Ok(config)
}

fn print_summary(results: &ReconResults) {
    println!();
    println!("{}", "=".repeat(60).bright_blue());
    println!("{} {}", "Target:".bold(), results.target.to_string().bright_cyan());
    println!(
        "{} {}",
        "Subdomains:".bold(),
        results.subdomains.len().to_string().bright_green()
    );
    for report in &results.ports {
        if report.ports.is_empty() {
            continue;
        }
        let ports: Vec<String> = report.ports.iter().map(|p| p.port.to_string()).collect();
        println!("  {} {}", format!("{}:", report.host).bright_cyan(), ports.join(", "));
    }
    println!(
        "{} {}",
        "Open ports:".bold(),
        results.open_port_count().to_string().bright_green()
    );
    println!(
        "{} {}",
        "Fingerprinted hosts:".bold(),
        results.tech_stack.len().to_string().bright_green()
    );
    if !results.tools_missing.is_empty() {
        println!(
            "{} {}",
            "Tools not installed:".bold(),
            results.tools_missing.join(", ").bright_yellow()
        );
    }
    println!(
        "{} {:.2}s",
        "Elapsed:".bold(),
        results.elapsed.as_secs_f64()
    );
    println!("{}", "=".repeat(60).bright_blue());
}

async fn run(matches: ArgMatches) -> anyhow::Result<i32> {
    let config = build_config(&matches)?;
    if config.target.is_empty() {
        anyhow::bail!("no target given (use TARGET or --target)");
    }

    let fd_limit = adjust_ulimit_size(matches.get_one::<u64>("ulimit").copied());
    if (fd_limit as usize) < config.threads {
        eprintln!(
            "{}",
            format!(
                "[!] File descriptor limit {} is below the worker budget {}",
                fd_limit, config.threads
            )
            .bright_yellow()
        );
    }

    let cancel = CancellationToken::new();
    let interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!(
                "\n{}",
                "[!] Interrupted, stopping and writing partial results".bright_yellow()
            );
            interrupt.cancel();
        }
    });

    let recon = Recon::new(config, cancel)?;
    println!(
        "{} {}",
        "[*] Target:".bright_blue(),
        recon.target().to_string().bright_cyan().bold()
    );
    let available = recon.inventory().available();
    if !available.is_empty() {
        println!("{} {}", "[*] Tools:".bright_blue(), available.join(", "));
    }

    let (results, report) = recon.run().await?;
    print_summary(&results);
    println!(
        "{} {}",
        "[+] Report saved to".bright_green(),
        report.display().to_string().bold()
    );

    Ok(if results.cancelled { EXIT_INTERRUPTED } else { 0 })
}

#[tokio::main]
async fn main() {
    let matches = build_cli().get_matches();

    let level = if matches.get_flag("verbose") { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    if !matches.get_flag("no-banner") {
        print_banner();
    }

    match run(matches).await {
        Ok(code) => process::exit(code),
        Err(e) => {
            eprintln!("{} {:#}", "[!] Error:".bright_red(), e);
            process::exit(1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_definition_is_valid() {
        build_cli().debug_assert();
    }

    #[test]
    fn test_flags_override_config() {
        let matches = build_cli().get_matches_from([
            "autorecon",
            "example.com",
            "--threads",
            "5",
            "--timeout",
            "1.5",
            "--no-tools",
            "--scan-profile",
            "stealth",
            "--config",
            "/nonexistent/autorecon.toml",
        ]);
        // An explicit config file that cannot be read is an error
        assert!(build_config(&matches).is_err());

        let matches = build_cli().get_matches_from([
            "autorecon",
            "-t",
            "example.com",
            "--threads",
            "5",
            "--timeout",
            "1.5",
            "--no-tools",
            "--scan-profile",
            "stealth",
        ]);
        let config = build_config(&matches).unwrap();
        assert_eq!(config.target, "example.com");
        assert_eq!(config.threads, 5);
        assert_eq!(config.timeout, 1500);
        assert!(!config.use_tools);
        assert_eq!(config.scan_profile, NmapProfile::Stealth);
    }
}
