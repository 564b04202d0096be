use std::env;
use std::io;
use std::path;

use anyhow::bail;
use anyhow::Result;
use clap::builder::PossibleValuesParser;
use clap::value_parser;
use clap::Arg;
use clap::ArgAction;
use clap::Command;
use clap_complete::generate;
use clap_complete::Generator;
use clap_complete::Shell;
use owo_colors::OwoColorize;
use owo_colors::Stream;
use strum::VariantNames;
use tokio::fs;
use tokio::io::AsyncWriteExt;

use crate::application::console::help_text;
use crate::configuration::Config;
use crate::configuration::ConfigKey;
use crate::domain::models::BackendName;
use crate::domain::models::SenderRole;

fn print_completions<G: Generator>(gen: G, cmd: &mut Command) {
    generate(gen, cmd, cmd.get_name().to_string(), &mut io::stdout());
    std::process::exit(0);
}

/// Directory the debug log is written to when `RUST_LOG` mentions convofeed.
pub fn debug_log_dir() -> path::PathBuf {
    if let Ok(dir) = env::var("CONVOFEED_LOG_DIR") {
        return path::PathBuf::from(dir);
    }

    return dirs::cache_dir().unwrap_or_default().join("convofeed");
}

async fn create_config_file() -> Result<()> {
    let config_file_path_str = Config::default(ConfigKey::ConfigFile);
    let config_file_path = path::PathBuf::from(&config_file_path_str);
    if config_file_path.exists() {
        bail!(format!(
            "Config file already exists at {config_file_path_str}"
        ));
    }

    if let Some(parent) = config_file_path.parent() {
        if !parent.exists() {
            fs::create_dir_all(parent).await?;
        }
    }

    let mut file = fs::File::create(&config_file_path).await?;
    file.write_all(Config::serialize_default(build()).as_bytes())
        .await?;

    println!(
        "Created default config file at {}",
        config_file_path.display()
    );
    return Ok(());
}

fn subcommand_completions() -> Command {
    return Command::new("completions")
        .about("Generates shell completions.")
        .arg(
            clap::Arg::new("shell")
                .short('s')
                .long("shell")
                .help("Which shell to generate completions for.")
                .action(ArgAction::Set)
                .value_parser(value_parser!(Shell))
                .required(true),
        );
}

fn subcommand_config() -> Command {
    return Command::new("config")
        .about("Configuration file options.")
        .subcommand(
            Command::new("create").about("Saves the default config file to the configuration file path. This command will fail if the file exists already.")
        )
        .subcommand(
            Command::new("default").about("Outputs the default configuration file to stdout.")
        )
        .subcommand(
            Command::new("path").about("Returns the default path for the configuration file.")
        );
}

fn subcommand_debug() -> Command {
    return Command::new("debug")
        .about("Debug helpers for convofeed")
        .hide(true)
        .subcommand(
            Command::new("log-path").about("Output path to debug log file generated when running convofeed with environment variable RUST_LOG=convofeed")
        )
        .subcommand(
            Command::new("enum-config").about("List all config keys as strings.")
        );
}

fn arg_backend() -> Arg {
    return Arg::new(ConfigKey::Backend.to_string())
        .short('b')
        .long(ConfigKey::Backend.to_string())
        .env("CONVOFEED_BACKEND")
        .num_args(1)
        .help(format!(
            "The messaging backend the conversation is loaded from. [default: {}]",
            Config::default(ConfigKey::Backend)
        ))
        .value_parser(PossibleValuesParser::new(BackendName::VARIANTS));
}

fn arg_backend_url() -> Arg {
    return Arg::new(ConfigKey::BackendURL.to_string())
        .long(ConfigKey::BackendURL.to_string())
        .env("CONVOFEED_BACKEND_URL")
        .num_args(1)
        .help(format!(
            "Messaging API URL when using the HTTP backend. [default: {}]",
            Config::default(ConfigKey::BackendURL)
        ));
}

fn arg_conversation_id() -> Arg {
    return Arg::new(ConfigKey::ConversationID.to_string())
        .short('i')
        .long(ConfigKey::ConversationID.to_string())
        .env("CONVOFEED_CONVERSATION_ID")
        .num_args(1)
        .help(format!(
            "The conversation to open. [default: {}]",
            Config::default(ConfigKey::ConversationID)
        ));
}

fn arg_fetch_timeout() -> Arg {
    return Arg::new(ConfigKey::FetchTimeout.to_string())
        .long(ConfigKey::FetchTimeout.to_string())
        .env("CONVOFEED_FETCH_TIMEOUT")
        .num_args(1)
        .help(format!(
            "Time to wait in milliseconds for a page of older messages before giving up. [default: {}]",
            Config::default(ConfigKey::FetchTimeout)
        ));
}

fn arg_fixture_file() -> Arg {
    return Arg::new(ConfigKey::FixtureFile.to_string())
        .long(ConfigKey::FixtureFile.to_string())
        .env("CONVOFEED_FIXTURE_FILE")
        .num_args(1)
        .help("JSON file of messages to seed the memory backend with.");
}

fn arg_page_size() -> Arg {
    return Arg::new(ConfigKey::PageSize.to_string())
        .short('p')
        .long(ConfigKey::PageSize.to_string())
        .env("CONVOFEED_PAGE_SIZE")
        .num_args(1)
        .help(format!(
            "Number of messages requested per page of history. [default: {}]",
            Config::default(ConfigKey::PageSize)
        ));
}

fn arg_realtime_batch_size() -> Arg {
    return Arg::new(ConfigKey::RealtimeBatchSize.to_string())
        .long(ConfigKey::RealtimeBatchSize.to_string())
        .env("CONVOFEED_REALTIME_BATCH_SIZE")
        .num_args(1)
        .help(format!(
            "Most realtime messages merged into the feed at once. [default: {}]",
            Config::default(ConfigKey::RealtimeBatchSize)
        ));
}

fn arg_role() -> Arg {
    return Arg::new(ConfigKey::Role.to_string())
        .short('r')
        .long(ConfigKey::Role.to_string())
        .env("CONVOFEED_ROLE")
        .num_args(1)
        .help(format!(
            "Which side of the conversation messages you send are from. [default: {}]",
            Config::default(ConfigKey::Role)
        ))
        .value_parser(PossibleValuesParser::new(SenderRole::VARIANTS));
}

fn arg_unread_count() -> Arg {
    return Arg::new(ConfigKey::UnreadCount.to_string())
        .long(ConfigKey::UnreadCount.to_string())
        .env("CONVOFEED_UNREAD_COUNT")
        .num_args(1)
        .help(format!(
            "Unread messages the conversation starts with. [default: {}]",
            Config::default(ConfigKey::UnreadCount)
        ));
}

fn feed_args() -> Vec<Arg> {
    return vec![
        arg_backend(),
        arg_backend_url(),
        arg_conversation_id(),
        arg_fetch_timeout(),
        arg_fixture_file(),
        arg_page_size(),
        arg_realtime_batch_size(),
        arg_role(),
        arg_unread_count(),
    ];
}

fn subcommand_chat() -> Command {
    return Command::new("chat")
        .about("Open a conversation in the console.")
        .args(feed_args());
}

pub fn build() -> Command {
    let commands_text = help_text()
        .split('\n')
        .map(|line| {
            if line.starts_with('-') {
                return format!("  {line}");
            }
            if line.starts_with("COMMANDS:") {
                return format!("CHAT {line}")
                    .if_supports_color(Stream::Stdout, |text| {
                        return text.underline().bold().to_string();
                    })
                    .to_string();
            }
            return line.to_string();
        })
        .collect::<Vec<String>>()
        .join("\n");

    let about = format!(
        "{}\n\nVersion: {}",
        env!("CARGO_PKG_DESCRIPTION"),
        env!("CARGO_PKG_VERSION"),
    );

    return Command::new("convofeed")
        .about(about)
        .author(env!("CARGO_PKG_AUTHORS"))
        .version(env!("CARGO_PKG_VERSION"))
        .after_help(commands_text)
        .arg_required_else_help(false)
        .subcommand(subcommand_chat())
        .subcommand(subcommand_completions())
        .subcommand(subcommand_config())
        .subcommand(subcommand_debug())
        .args(feed_args())
        .arg(
            Arg::new(ConfigKey::ConfigFile.to_string())
                .short('c')
                .long(ConfigKey::ConfigFile.to_string())
                .env("CONVOFEED_CONFIG_FILE")
                .num_args(1)
                .help(format!("Path to configuration file [default: {}]", Config::default(ConfigKey::ConfigFile)))
                .global(true)
        );
}

pub async fn parse() -> Result<bool> {
    let matches = build().get_matches();

    match matches.subcommand() {
        Some(("debug", debug_matches)) => {
            match debug_matches.subcommand() {
                Some(("log-path", _)) => {
                    println!("{}", debug_log_dir().join("debug.log").display());
                }
                Some(("enum-config", _)) => {
                    println!("{}", ConfigKey::VARIANTS.join("\n"));
                }
                _ => {
                    subcommand_debug().print_long_help()?;
                }
            }

            return Ok(false);
        }
        Some(("chat", subcmd_matches)) => {
            Config::load(build(), vec![&matches, subcmd_matches]).await?;
        }
        Some(("completions", subcmd_matches)) => {
            if let Some(completions) = subcmd_matches.get_one::<Shell>("shell").copied() {
                let mut app = build();
                print_completions(completions, &mut app);
            }
            return Ok(false);
        }
        Some(("config", subcmd_matches)) => match subcmd_matches.subcommand() {
            Some(("create", _)) => {
                create_config_file().await?;
                return Ok(false);
            }
            Some(("default", _)) => {
                println!("{}", Config::serialize_default(build()));
                return Ok(false);
            }
            Some(("path", _)) => {
                println!("{}", Config::default(ConfigKey::ConfigFile));
                return Ok(false);
            }
            _ => {
                subcommand_config().print_long_help()?;
                return Ok(false);
            }
        },
        _ => {
            Config::load(build(), vec![&matches]).await?;
        }
    }

    return Ok(true);
}
