use std::sync::Arc;

use teloxide::prelude::*;
use teloxide::utils::command::BotCommands;
use tracing::{debug, info, info_span, warn};
use tracing_subscriber::prelude::*;

use imgupload::config::Config;
use imgupload::storage::{UploadClient, http_client, is_valid_base_url};
use imgupload::telegram::{Command, PromptRegistry, TelegramSession, incoming_message, parse_args, quoted_message};
use imgupload::telegram_log;
use imgupload::transfer::{ChatSession, Transfer, TransferRequest, TransferSettings};

struct BotState {
    config: Config,
    settings: TransferSettings,
    /// Shared transport; each invocation still builds its own client.
    http: reqwest::Client,
    prompts: Arc<PromptRegistry>,
    bot_username: String,
}

#[tokio::main]
async fn main() {
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "imgupload.json".to_string());
    let config = match Config::load(&config_path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{e}");
            std::process::exit(1);
        }
    };

    let bot = Bot::new(&config.telegram_bot_token);

    // Setup logging
    let log_dir = config.data_dir.join("logs");
    std::fs::create_dir_all(&log_dir).ok();
    let log_file = match std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_dir.join("imgupload.log"))
    {
        Ok(file) => file,
        Err(e) => {
            eprintln!("Failed to open log file in {}: {e}", log_dir.display());
            std::process::exit(1);
        }
    };
    let (non_blocking, _guard) = tracing_appender::non_blocking(log_file);

    let registry = tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stdout)
                .with_filter(
                    tracing_subscriber::EnvFilter::from_default_env()
                        .add_directive(tracing::Level::INFO.into()),
                ),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(false)
                .with_filter(
                    tracing_subscriber::EnvFilter::from_default_env()
                        .add_directive(tracing::Level::INFO.into()),
                ),
        );

    if let Some(log_chat_id) = config.log_chat_id {
        let tg_layer = telegram_log::TelegramLogLayer::new(bot.clone(), log_chat_id);
        registry.with(tg_layer).init();
    } else {
        registry.init();
    }

    info!("🚀 Starting imgupload...");
    info!("Loaded config from {}", config.config_path.display());
    info!("Storage: {} (base path {})", config.storage_url, config.base_path);
    if !is_valid_base_url(&config.storage_url) {
        warn!("storage_url {} doesn't look like a URL; uploads will be refused", config.storage_url);
    }

    let bot_username = match bot.get_me().await {
        Ok(me) => {
            info!("Bot user ID: {}, username: @{}", me.id, me.username());
            me.username().to_string()
        }
        Err(e) => {
            warn!("Failed to get bot info: {e}");
            String::new()
        }
    };

    if let Err(e) = bot.set_my_commands(Command::bot_commands()).await {
        warn!("Failed to register bot commands: {e}");
    }

    let http = match http_client() {
        Ok(http) => http,
        Err(e) => {
            eprintln!("Failed to build HTTP client: {e}");
            std::process::exit(1);
        }
    };

    let state = Arc::new(BotState {
        settings: config.transfer_settings(),
        config,
        http,
        prompts: Arc::new(PromptRegistry::new()),
        bot_username,
    });

    let handler = dptree::entry().branch(Update::filter_message().endpoint(handle_message));

    Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![state])
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;
}

async fn handle_message(bot: Bot, msg: Message, state: Arc<BotState>) -> ResponseResult<()> {
    if !state.config.is_allowed_chat(msg.chat.id) {
        return Ok(());
    }

    let user = match msg.from {
        Some(ref u) => u,
        None => return Ok(()),
    };

    // An invocation prompting this user gets first pick of their messages.
    let key = (msg.chat.id.0, user.id.0 as i64);
    let incoming = match state.prompts.deliver(key, incoming_message(&msg)) {
        Ok(()) => {
            debug!("Queued message {} for open prompt", msg.id);
            return Ok(());
        }
        Err(incoming) => incoming,
    };

    let Some(text) = msg.text().or_else(|| msg.caption()) else {
        return Ok(());
    };
    let Ok(command) = Command::parse(text, &state.bot_username) else {
        return Ok(());
    };

    match command {
        Command::Help => {
            bot.send_message(msg.chat.id, Command::descriptions().to_string()).await?;
        }
        Command::Imgupload(args) => {
            let parsed = match parse_args(&args) {
                Ok(parsed) => parsed,
                Err(e) => {
                    bot.send_message(msg.chat.id, format!("{e}")).await?;
                    return Ok(());
                }
            };

            let username = user.username.as_deref().unwrap_or(&user.first_name);
            info!("📨 /imgupload from {} ({}) in chat {}", username, user.id, msg.chat.id);

            let mut request = TransferRequest::new(user.id.0.to_string(), parsed.options);
            request.argument = parsed.argument;
            if !incoming.attachments.is_empty() {
                request.inline = Some(incoming);
            }
            request.quoted = quoted_message(&msg).map(incoming_message);

            // Runs detached: the dispatcher serializes a chat's updates, and the
            // prompt needs the next one delivered while this waits.
            tokio::spawn(run_transfer(bot, msg.chat.id, user.id, request, state.clone()));
        }
    }

    Ok(())
}

async fn run_transfer(bot: Bot, chat_id: ChatId, user_id: UserId, request: TransferRequest, state: Arc<BotState>) {
    let span = info_span!("imgupload", chat = chat_id.0, user = user_id.0);

    let client = UploadClient::with_http(state.http.clone(), &state.config.storage_url, state.config.credentials())
        .with_span(span.clone());
    let session = TelegramSession::new(bot, chat_id, user_id, state.prompts.clone());

    let report = Transfer::new(&client, &session, &state.settings)
        .with_span(span.clone())
        .run(request)
        .await;

    info!(parent: &span, report = ?report, "transfer finished");
    session
        .send(&report.render(state.settings.share_url.as_deref()))
        .await;
}
