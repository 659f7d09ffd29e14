use clap::{Parser, Subcommand};
use std::path::PathBuf;

use share_parser::commands;
use share_parser::models::{LoginEvent, ParseResult, PlatformId};
use share_parser::utils::logger;
use share_parser::{AppState, ConfigService};

#[derive(Parser, Debug)]
#[clap(name = "share-parser", about = "聊天分享链接识别与媒体解析")]
struct Cli {
    /// `.env` 文件路径,默认在当前目录及上层目录查找
    #[clap(long)]
    env_file: Option<PathBuf>,

    /// 日志目录
    #[clap(long, default_value = "logs")]
    log_dir: PathBuf,

    #[clap(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// 解析消息中的全部链接
    Parse {
        text: String,
        /// 会话标识,用于开关与防抖
        #[clap(long, default_value = "cli")]
        scope: String,
    },
    /// 哔哩哔哩音频
    Bm { id: String },
    /// YouTube 音频
    Ym { url: String },
    /// 扫码登录
    Login { platform: String },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let _guard = logger::init(&cli.log_dir)?;

    let config_service = match cli.env_file {
        Some(path) => ConfigService::new(path),
        None => ConfigService::discover()?,
    };
    let config = config_service.load()?;
    let state = AppState::new(config, Some(config_service))?;
    state.restore().await;

    let outcome = run(&state, cli.command).await;
    state.shutdown().await;
    outcome
}

async fn run(state: &AppState, command: Command) -> Result<(), Box<dyn std::error::Error>> {
    match command {
        Command::Parse { text, scope } => {
            for result in commands::parse_message(state, &scope, &text).await {
                match result {
                    Ok(parsed) => print_result(&parsed)?,
                    Err(e) => eprintln!("{}", e),
                }
            }
        }
        Command::Bm { id } => print_result(&commands::bilibili_audio(state, &id).await?)?,
        Command::Ym { url } => print_result(&commands::youtube_audio(state, &url).await?)?,
        Command::Login { platform } => {
            let platform = PlatformId::from(platform.as_str());
            let (qr, mut events) = commands::start_login(state, platform).await?;
            println!("请使用客户端扫描: {}", qr.login_url);

            while let Some(event) = events.recv().await {
                print_event(&event);
                if event.is_final() {
                    break;
                }
            }
        }
    }
    Ok(())
}

fn print_result(result: &ParseResult) -> Result<(), serde_json::Error> {
    eprintln!("{}", result.summary());
    println!("{}", serde_json::to_string_pretty(result)?);
    Ok(())
}

fn print_event(event: &LoginEvent) {
    println!("[{}] {}", event.timestamp.format("%H:%M:%S"), event.message());
}
