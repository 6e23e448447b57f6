use std::collections::HashMap;

use serenity::all::{
    ChannelType, CommandInteraction, CommandOptionType, Context, CreateAutocompleteResponse,
    CreateCommand, CreateCommandOption, CreateEmbed, CreateInteractionResponse,
    CreateInteractionResponseFollowup, CreateInteractionResponseMessage, EditInteractionResponse,
    Permissions, ResolvedValue,
};
use tracing::{info, warn};

use zkr_core::{
    commands::{CommandReply, CommandService},
    domain::{ChannelId, GuildId},
    languages,
    links::LinkMode,
    relay::EMBED_COLOR,
    translation::ProviderKind,
    Result,
};

use crate::router::AppState;

/// Discord accepts at most this many embeds per message.
const EMBEDS_PER_MESSAGE: usize = 10;
const AUTOCOMPLETE_CHOICES: usize = 25;

const SOURCE_CHANNEL: &str = "source-channel";
const TARGET_CHANNEL: &str = "target-channel";

#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum OptionValue {
    Str(String),
    Channel(ChannelId),
}

/// A parsed slash command.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum CommandRequest {
    Help,
    SignIn { provider: ProviderKind, api_key: String },
    SignOut,
    Usage,
    Set { channel: ChannelId, language: String },
    Unset { channel: ChannelId },
    Link { source: ChannelId, target: ChannelId, mode: LinkMode },
    LinkMany { channels: Vec<ChannelId> },
    Unlink { source: ChannelId, target: ChannelId },
    UnlinkChannel { channel: ChannelId },
    ShowLinks { channel: Option<ChannelId> },
    ShowChannels,
}

impl CommandRequest {
    /// Replies that may echo credentials stay private.
    fn is_private(&self) -> bool {
        matches!(self, CommandRequest::SignIn { .. } | CommandRequest::SignOut)
    }
}

fn channel_option(name: &str, description: &str) -> CreateCommandOption {
    CreateCommandOption::new(CommandOptionType::Channel, name, description)
        .channel_types(vec![ChannelType::Text])
}

fn admin(command: CreateCommand) -> CreateCommand {
    command
        .default_member_permissions(Permissions::MANAGE_GUILD)
        .dm_permission(false)
}

pub(crate) fn definitions() -> Vec<CreateCommand> {
    let mode = CreateCommandOption::new(
        CommandOptionType::String,
        "mode",
        "Specify linking mode. Default is bidirectional.",
    )
    .add_string_choice("unidirectional", "unidirectional")
    .add_string_choice("bidirectional", "bidirectional")
    .add_string_choice("recursive", "recursive");

    vec![
        CreateCommand::new("help").description("Shows the command overview."),
        admin(
            CreateCommand::new("sign-in")
                .description("Sign in using a DeepL or OpenAI API key to start using the bot.")
                .add_option(
                    CreateCommandOption::new(
                        CommandOptionType::String,
                        "api-key",
                        "The API key. It is stored encrypted.",
                    )
                    .required(true),
                )
                .add_option(
                    CreateCommandOption::new(
                        CommandOptionType::String,
                        "provider",
                        "Translation provider. Default is DeepL.",
                    )
                    .add_string_choice("DeepL", "deepl")
                    .add_string_choice("OpenAI", "openai"),
                ),
        ),
        admin(CreateCommand::new("sign-out").description("Signs out the bot.")),
        CreateCommand::new("usage")
            .description("Shows current usage and remaining characters.")
            .dm_permission(false),
        admin(
            CreateCommand::new("set")
                .description("Set a channel's language.")
                .add_option(
                    CreateCommandOption::new(
                        CommandOptionType::String,
                        "language",
                        "The language to set.",
                    )
                    .set_autocomplete(true)
                    .required(true),
                )
                .add_option(channel_option(
                    "channel",
                    "The channel to set the language of.",
                )),
        ),
        admin(
            CreateCommand::new("unset")
                .description("Unset a channel's language.")
                .add_option(channel_option("channel", "The channel to unset.")),
        ),
        admin(
            CreateCommand::new("link")
                .description("Links two translation channels.")
                .add_option(
                    channel_option(TARGET_CHANNEL, "The target channel to link.").required(true),
                )
                .add_option(channel_option(
                    SOURCE_CHANNEL,
                    "The source channel to link. If not provided, takes the current channel as the source.",
                ))
                .add_option(mode),
        ),
        admin(
            CreateCommand::new("link-multiple")
                .description("Link multiple channels at once.")
                .add_option(
                    CreateCommandOption::new(
                        CommandOptionType::String,
                        "channels",
                        "List of channels to link. E.g. '#channel1 #channel2 ... #channelN'",
                    )
                    .required(true),
                ),
        ),
        admin(
            CreateCommand::new("unlink")
                .description("Unlinks two translation channels.")
                .add_option(
                    channel_option(TARGET_CHANNEL, "The target channel to unlink.").required(true),
                )
                .add_option(channel_option(
                    SOURCE_CHANNEL,
                    "The source channel to unlink. If not provided, takes the current channel as the source.",
                )),
        ),
        admin(
            CreateCommand::new("unlink-channel")
                .description("Unlinks channel from all other translate channels.")
                .add_option(channel_option(
                    "channel",
                    "The channel to unlink. If not provided, takes the current channel.",
                )),
        ),
        admin(
            CreateCommand::new("show-links")
                .description("Shows the linking of translate channels.")
                .add_option(channel_option(
                    "channel",
                    "Show the links of this channel only.",
                )),
        ),
        admin(CreateCommand::new("show-channels").description("Shows all translate channels.")),
    ]
}

/// Every `<#id>` mention in `raw`, in order.
pub(crate) fn channel_mentions(raw: &str) -> Vec<ChannelId> {
    raw.split("<#")
        .skip(1)
        .filter_map(|rest| {
            let (digits, _) = rest.split_once('>')?;
            digits.parse::<u64>().ok().map(ChannelId)
        })
        .collect()
}

/// Maps a command name and its options to a request. `Err` carries the reply
/// for malformed input.
pub(crate) fn parse_command(
    name: &str,
    invoked_in: ChannelId,
    options: &HashMap<String, OptionValue>,
) -> std::result::Result<CommandRequest, String> {
    let text = |key: &str| match options.get(key) {
        Some(OptionValue::Str(s)) => Some(s.clone()),
        _ => None,
    };
    let channel = |key: &str| match options.get(key) {
        Some(OptionValue::Channel(c)) => Some(*c),
        _ => None,
    };
    let required_channel = |key: &str| {
        channel(key).ok_or_else(|| format!("Missing required option `{key}`."))
    };

    Ok(match name {
        "help" => CommandRequest::Help,
        "sign-in" => {
            let provider = match text("provider") {
                Some(p) => p.parse().map_err(|_| format!("Unknown provider '{p}'."))?,
                None => ProviderKind::DeepL,
            };
            CommandRequest::SignIn {
                provider,
                api_key: text("api-key").unwrap_or_default(),
            }
        }
        "sign-out" => CommandRequest::SignOut,
        "usage" => CommandRequest::Usage,
        "set" => CommandRequest::Set {
            channel: channel("channel").unwrap_or(invoked_in),
            language: text("language").unwrap_or_default(),
        },
        "unset" => CommandRequest::Unset {
            channel: channel("channel").unwrap_or(invoked_in),
        },
        "link" => CommandRequest::Link {
            source: channel(SOURCE_CHANNEL).unwrap_or(invoked_in),
            target: required_channel(TARGET_CHANNEL)?,
            mode: text("mode")
                .unwrap_or_default()
                .parse()
                .map_err(|_| "Unknown linking mode.".to_string())?,
        },
        "link-multiple" => {
            let channels = channel_mentions(&text("channels").unwrap_or_default());
            if channels.is_empty() {
                return Err("Cannot link, you didn't provide any channels!".to_string());
            }
            CommandRequest::LinkMany { channels }
        }
        "unlink" => CommandRequest::Unlink {
            source: channel(SOURCE_CHANNEL).unwrap_or(invoked_in),
            target: required_channel(TARGET_CHANNEL)?,
        },
        "unlink-channel" => CommandRequest::UnlinkChannel {
            channel: channel("channel").unwrap_or(invoked_in),
        },
        "show-links" => CommandRequest::ShowLinks {
            channel: channel("channel"),
        },
        "show-channels" => CommandRequest::ShowChannels,
        other => return Err(format!("Unknown command `/{other}`.")),
    })
}

async fn execute(
    commands: &CommandService,
    guild_id: GuildId,
    request: CommandRequest,
) -> Result<CommandReply> {
    match request {
        CommandRequest::Help => Ok(commands.help()),
        CommandRequest::SignIn { provider, api_key } => {
            commands.sign_in(guild_id, provider, &api_key).await
        }
        CommandRequest::SignOut => commands.sign_out(guild_id).await,
        CommandRequest::Usage => commands.usage(guild_id).await,
        CommandRequest::Set { channel, language } => {
            commands.set_language(guild_id, channel, &language).await
        }
        CommandRequest::Unset { channel } => commands.unset_language(guild_id, channel).await,
        CommandRequest::Link {
            source,
            target,
            mode,
        } => commands.link(guild_id, source, target, mode).await,
        CommandRequest::LinkMany { channels } => commands.link_many(guild_id, &channels).await,
        CommandRequest::Unlink { source, target } => commands.unlink(guild_id, source, target).await,
        CommandRequest::UnlinkChannel { channel } => {
            commands.unlink_channel(guild_id, channel).await
        }
        CommandRequest::ShowLinks { channel } => commands.show_links(guild_id, channel).await,
        CommandRequest::ShowChannels => commands.show_channels(guild_id).await,
    }
}

fn collect_options(cmd: &CommandInteraction) -> HashMap<String, OptionValue> {
    cmd.data
        .options()
        .into_iter()
        .filter_map(|opt| {
            let value = match opt.value {
                ResolvedValue::String(s) => OptionValue::Str(s.to_string()),
                ResolvedValue::Channel(c) => OptionValue::Channel(ChannelId(c.id.get())),
                _ => return None,
            };
            Some((opt.name.to_string(), value))
        })
        .collect()
}

fn embed_batches(chunks: &[String]) -> Vec<Vec<CreateEmbed>> {
    chunks
        .chunks(EMBEDS_PER_MESSAGE)
        .map(|batch| {
            batch
                .iter()
                .map(|chunk| CreateEmbed::new().color(EMBED_COLOR).description(chunk.as_str()))
                .collect()
        })
        .collect()
}

async fn respond_now(ctx: &Context, cmd: &CommandInteraction, content: &str) {
    let message = CreateInteractionResponseMessage::new()
        .content(content)
        .ephemeral(true);
    if let Err(e) = cmd
        .create_response(&ctx.http, CreateInteractionResponse::Message(message))
        .await
    {
        warn!(command = %cmd.data.name, error = %e, "interaction response failed");
    }
}

async fn send_reply(
    ctx: &Context,
    cmd: &CommandInteraction,
    reply: CommandReply,
) -> serenity::Result<()> {
    match reply {
        CommandReply::Text(text) => {
            cmd.edit_response(&ctx.http, EditInteractionResponse::new().content(text))
                .await?;
        }
        CommandReply::Embeds(chunks) => {
            let mut batches = embed_batches(&chunks).into_iter();
            if let Some(first) = batches.next() {
                cmd.edit_response(&ctx.http, EditInteractionResponse::new().embeds(first))
                    .await?;
            }
            for batch in batches {
                cmd.create_followup(
                    &ctx.http,
                    CreateInteractionResponseFollowup::new().embeds(batch),
                )
                .await?;
            }
        }
    }
    Ok(())
}

pub(crate) async fn handle_command(ctx: &Context, cmd: &CommandInteraction, state: &AppState) {
    let Some(guild_id) = cmd.guild_id else {
        respond_now(ctx, cmd, "This command is only available on servers.").await;
        return;
    };
    let guild_id = GuildId(guild_id.get());

    let request = match parse_command(
        &cmd.data.name,
        ChannelId(cmd.channel_id.get()),
        &collect_options(cmd),
    ) {
        Ok(request) => request,
        Err(message) => {
            respond_now(ctx, cmd, &message).await;
            return;
        }
    };

    // Provider validation can outlast the three-second response window.
    let defer = CreateInteractionResponse::Defer(
        CreateInteractionResponseMessage::new().ephemeral(request.is_private()),
    );
    if let Err(e) = cmd.create_response(&ctx.http, defer).await {
        warn!(command = %cmd.data.name, error = %e, "interaction defer failed");
        return;
    }

    info!(command = %cmd.data.name, guild_id = %guild_id, user_id = %cmd.user.id, "slash command");
    let reply = match execute(&state.services.commands, guild_id, request).await {
        Ok(reply) => reply,
        Err(e) => {
            warn!(command = %cmd.data.name, error = %e, "command failed");
            CommandReply::Text("There was an error while executing this command!".to_string())
        }
    };
    if let Err(e) = send_reply(ctx, cmd, reply).await {
        warn!(command = %cmd.data.name, error = %e, "command reply failed");
    }
}

pub(crate) async fn handle_autocomplete(ctx: &Context, ac: &CommandInteraction) {
    let Some(focused) = ac.data.autocomplete() else {
        return;
    };
    if focused.name != "language" {
        return;
    }
    let response = languages::search(focused.value, AUTOCOMPLETE_CHOICES)
        .into_iter()
        .fold(CreateAutocompleteResponse::new(), |resp, lang| {
            resp.add_string_choice(lang.name, lang.name)
        });
    if let Err(e) = ac
        .create_response(&ctx.http, CreateInteractionResponse::Autocomplete(response))
        .await
    {
        warn!(error = %e, "autocomplete response failed");
    }
}
