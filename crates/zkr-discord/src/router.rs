use std::sync::Arc;

use serenity::{all::Http, Client};
use tracing::info;

use zkr_core::{
    config::Config,
    domain::UserId,
    relay::{RelayLimits, RelayPort},
    services::Services,
    store::Store,
    translation::ProviderFactory,
};

use crate::{handlers::Handler, DiscordRelay};

pub struct AppState {
    pub services: Services,
    pub relay: Arc<DiscordRelay>,
}

/// Connects to the gateway and dispatches events until the client stops.
pub async fn run_gateway<S: Store + 'static>(
    cfg: Arc<Config>,
    store: Arc<S>,
    factory: Arc<dyn ProviderFactory>,
) -> anyhow::Result<()> {
    let http = Arc::new(Http::new(&cfg.discord_token));
    let me = http.get_current_user().await?;
    info!(bot_name = %me.name, bot_id = %me.id, "discord token accepted");

    let relay = Arc::new(DiscordRelay::new(
        http,
        UserId(me.id.get()),
        cfg.webhook_name.clone(),
        RelayLimits {
            message_chars: cfg.message_chars_limit,
            attachment_bytes: cfg.attachment_size_limit,
        },
    ));
    let port: Arc<dyn RelayPort> = relay.clone();
    let services = Services::new(cfg.clone(), store, port, factory)?;
    let state = Arc::new(AppState { services, relay });

    let mut client = Client::builder(&cfg.discord_token, Handler::intents())
        .event_handler(Handler::new(state))
        .await?;

    info!(link_limit = cfg.link_limit, "connecting to discord gateway");
    client.start_autosharded().await?;
    Ok(())
}
