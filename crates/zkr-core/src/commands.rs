//! User-facing operations behind the slash commands.
//!
//! Each operation validates first and mutates second, so a refused request
//! leaves every stored record as it was. Outcomes are returned as Discord
//! text; option parsing stays in the adapter.

use std::{collections::HashMap, sync::Arc};

use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{info, warn};

use crate::{
    domain::{ChannelId, GuildId},
    errors::Error,
    formatting::{group_thousands, join_channels, split_for_embeds},
    languages::{self, by_code},
    links::{ChannelLinkCache, ComponentNode, LinkEngine, LinkMode},
    model::{ChannelLink, TranslateChannel},
    registry::TranslateChannelRegistry,
    translation::{ProviderKind, TranslatorCache},
    Result,
};

pub const HELP: &str = "\
# Help
Start using the bot by signing in with the `/sign-in` command, providing a DeepL or OpenAI API key. Then set languages to your channels using the `/set` command, link them using the `/link` command, and finally start chatting!
## Commands
- `/sign-in`: Sign in using a DeepL or OpenAI API key to start using the bot.
- `/sign-out`: Signs out the bot.
- `/usage`: Shows the current usage and remaining characters.
- `/set`: Sets a channel's language.
- `/unset`: Unset a channel's language.
- `/link`: Links two translate channels unidirectionally, bidirectionally, or recursively.
- `/link-multiple`: Links multiple channels at once.
- `/unlink`: Unlinks two translate channels.
- `/unlink-channel`: Unlinks channel from all other translate channels.
- `/show-channels`: Shows a list of all translate channels.
- `/show-links`: Shows the linking of translate channels.";

/// What a command answers with.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CommandReply {
    Text(String),
    /// Output too long for one message, split into embed descriptions.
    Embeds(Vec<String>),
}

impl CommandReply {
    fn text(content: impl Into<String>) -> Self {
        CommandReply::Text(content.into())
    }

    fn long(content: String, limit: usize) -> Self {
        if content.chars().count() <= limit {
            CommandReply::Text(content)
        } else {
            CommandReply::Embeds(split_for_embeds(&content))
        }
    }

    /// The whole reply as one string.
    pub fn content(&self) -> String {
        match self {
            CommandReply::Text(text) => text.clone(),
            CommandReply::Embeds(chunks) => chunks.concat(),
        }
    }
}

/// One async mutex per guild; link mutations of a guild run one at a time.
#[derive(Default)]
pub struct GuildLocks {
    inner: Mutex<HashMap<GuildId, Arc<Mutex<()>>>>,
}

impl GuildLocks {
    pub async fn lock_guild(&self, guild_id: GuildId) -> OwnedMutexGuard<()> {
        let lock = {
            let mut map = self.inner.lock().await;
            map.entry(guild_id)
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };
        lock.lock_owned().await
    }
}

pub struct CommandService {
    registry: Arc<TranslateChannelRegistry>,
    links: Arc<ChannelLinkCache>,
    engine: LinkEngine,
    translators: Arc<TranslatorCache>,
    locks: GuildLocks,
    message_limit: usize,
}

impl CommandService {
    pub fn new(
        registry: Arc<TranslateChannelRegistry>,
        links: Arc<ChannelLinkCache>,
        translators: Arc<TranslatorCache>,
        link_limit: usize,
        message_limit: usize,
    ) -> Self {
        Self {
            engine: LinkEngine::new(links.clone(), registry.clone(), link_limit),
            registry,
            links,
            translators,
            locks: GuildLocks::default(),
            message_limit,
        }
    }

    // ============== Languages ==============

    pub async fn set_language(
        &self,
        guild_id: GuildId,
        channel: ChannelId,
        language: &str,
    ) -> Result<CommandReply> {
        let Some(lang) = languages::resolve(language) else {
            return Ok(CommandReply::text(format!("Invalid language '{language}'.")));
        };

        let previous = self.registry.get(channel).await?;
        if let Some(existing) = &previous {
            if existing.language_code == lang.code {
                return Ok(CommandReply::text(format!(
                    "{} is already set to `{}`!",
                    channel.mention(),
                    lang.name
                )));
            }
        }

        self.registry.set(channel, guild_id, lang.code).await?;
        info!(channel_id = %channel, language = lang.code, "channel language set");
        Ok(CommandReply::text(match previous {
            Some(old) => format!(
                "{} has been changed from `{}` to `{}`.",
                channel.mention(),
                language_name(&old.language_code),
                lang.name
            ),
            None => format!("{} has been set to `{}`.", channel.mention(), lang.name),
        }))
    }

    /// Removes the channel's language and every edge touching it.
    pub async fn unset_language(&self, guild_id: GuildId, channel: ChannelId) -> Result<CommandReply> {
        if self.registry.get(channel).await?.is_none() {
            return Ok(CommandReply::text(format!(
                "{} is not set to any language.",
                channel.mention()
            )));
        }

        let _guard = self.locks.lock_guild(guild_id).await;
        if let Some(mut link) = self.links.get(channel).await? {
            self.engine.unlink_all(&mut link).await?;
        }
        self.registry.unset(channel).await?;
        info!(channel_id = %channel, "channel language unset");
        Ok(CommandReply::text(format!(
            "{} has been successfully unset.",
            channel.mention()
        )))
    }

    // ============== Linking ==============

    pub async fn link(
        &self,
        guild_id: GuildId,
        source: ChannelId,
        target: ChannelId,
        mode: LinkMode,
    ) -> Result<CommandReply> {
        if source == target {
            return Ok(CommandReply::text(format!(
                "You cannot link {} with itself!",
                source.mention()
            )));
        }

        let (src, tgt) = match (self.registry.get(source).await?, self.registry.get(target).await?) {
            (Some(src), Some(tgt)) => (src, tgt),
            (None, None) => {
                return Ok(CommandReply::text(format!(
                    "Both {} and {} are not associated with any languages yet. Please use the `/set` command to set their languages.",
                    source.mention(),
                    target.mention()
                )))
            }
            (None, _) => return Ok(CommandReply::text(not_associated(source))),
            (_, None) => return Ok(CommandReply::text(not_associated(target))),
        };

        let _guard = self.locks.lock_guild(guild_id).await;
        let mut a = ComponentNode {
            link: self.engine.get_or_create(source, guild_id).await?,
            channel: src,
        };
        let mut b = ComponentNode {
            link: self.engine.get_or_create(target, guild_id).await?,
            channel: tgt,
        };
        let pair = format!("{} and {}", labelled(&a.channel), labelled(&b.channel));

        let mut map = self
            .engine
            .build_component_map(&[a.link.clone(), b.link.clone()])
            .await?;
        match self.engine.check_limit(&map, &[source, target]) {
            Ok(_) => {}
            Err(Error::LimitExceeded { limit, size }) => {
                info!(guild_id = %guild_id, limit, size, "link refused, component limit");
                return Ok(CommandReply::text(format!(
                    "{pair} are **not linked** because you already reached the linking limit of {limit}!"
                )));
            }
            Err(e) => return Err(e),
        }

        let reply = match mode {
            LinkMode::Unidirectional => {
                let linked = self.engine.link_unidirectional(&mut a.link, &b.channel).await?;
                if linked {
                    format!(
                        "{} is now linked **unidirectionally** to {}!",
                        labelled(&a.channel),
                        labelled(&b.channel)
                    )
                } else {
                    format!(
                        "{} is already linked with {}!",
                        labelled(&a.channel),
                        labelled(&b.channel)
                    )
                }
            }
            LinkMode::Bidirectional => {
                if self.engine.link_bidirectional(&mut a, &mut b).await? {
                    format!("{pair} are now linked!")
                } else {
                    format!("{pair} are already linked!")
                }
            }
            LinkMode::Recursive => {
                let direct = self.engine.link_bidirectional(&mut a, &mut b).await?;
                map.insert(a);
                map.insert(b);
                let all = self.engine.link_recursive(&mut map).await?;
                if direct || all {
                    format!("{pair} are now linked **recursively**!")
                } else {
                    format!("{pair} are already linked **recursively**!")
                }
            }
        };
        info!(guild_id = %guild_id, %source, %target, %mode, "link command handled");
        Ok(CommandReply::text(reply))
    }

    /// Links every given channel with every other one, together with the
    /// components they already belong to.
    pub async fn link_many(&self, guild_id: GuildId, channels: &[ChannelId]) -> Result<CommandReply> {
        let mut requested: Vec<TranslateChannel> = Vec::new();
        let mut without_language: Vec<ChannelId> = Vec::new();
        for &id in channels {
            if requested.iter().any(|c| c.id == id) || without_language.contains(&id) {
                continue;
            }
            match self.registry.get(id).await? {
                Some(channel) => requested.push(channel),
                None => without_language.push(id),
            }
        }

        let warning = if without_language.is_empty() {
            String::new()
        } else {
            let one = without_language.len() == 1;
            format!(
                "\n{} {} not linked because they are not set to any language. Please use the `/set` command to specify {}.",
                join_channels(&without_language),
                if one { "is" } else { "are" },
                if one { "its language" } else { "their languages" }
            )
        };

        if requested.len() <= 1 {
            let reason = if requested.is_empty() {
                "you didn't provide any translate channels!"
            } else {
                "please provide more than one translate channel!"
            };
            return Ok(CommandReply::text(format!("Cannot link, {reason}{warning}")));
        }

        let ids: Vec<ChannelId> = requested.iter().map(|c| c.id).collect();
        let listed = join_channels(&ids);

        let _guard = self.locks.lock_guild(guild_id).await;
        let mut nodes = Vec::with_capacity(requested.len());
        for channel in requested {
            nodes.push(ComponentNode {
                link: self.engine.get_or_create(channel.id, guild_id).await?,
                channel,
            });
        }
        let seeds: Vec<ChannelLink> = nodes.iter().map(|n| n.link.clone()).collect();
        let mut map = self.engine.build_component_map(&seeds).await?;
        match self.engine.check_limit(&map, &ids) {
            Ok(_) => {}
            Err(Error::LimitExceeded { limit, .. }) => {
                return Ok(CommandReply::text(format!(
                    "{listed} are **not linked** because you already reached the linking limit of {limit}!"
                )));
            }
            Err(e) => return Err(e),
        }

        for node in nodes {
            map.insert(node);
        }
        let linked = self.engine.link_recursive(&mut map).await?;
        info!(guild_id = %guild_id, channels = ids.len(), linked, "link-multiple handled");
        Ok(CommandReply::text(if linked {
            format!("{listed} are now linked!{warning}")
        } else {
            format!("{listed} are already linked!{warning}")
        }))
    }

    /// Removes the edges between two channels in both directions.
    pub async fn unlink(
        &self,
        guild_id: GuildId,
        source: ChannelId,
        target: ChannelId,
    ) -> Result<CommandReply> {
        if source == target {
            return Ok(CommandReply::text(format!(
                "You cannot unlink {} with itself!",
                source.mention()
            )));
        }

        let _guard = self.locks.lock_guild(guild_id).await;
        let (mut a, mut b) = match (self.links.get(source).await?, self.links.get(target).await?) {
            (Some(a), Some(b)) => (a, b),
            (None, None) => {
                return Ok(CommandReply::text(format!(
                    "Both {} and {} are not linked with any channels!",
                    source.mention(),
                    target.mention()
                )))
            }
            (None, _) => return Ok(CommandReply::text(not_linked(source))),
            (_, None) => return Ok(CommandReply::text(not_linked(target))),
        };

        let forward = self.engine.unlink_edge(&mut a, target).await?;
        let backward = self.engine.unlink_edge(&mut b, source).await?;
        Ok(CommandReply::text(if forward || backward {
            format!("{} and {} are now unlinked!", source.mention(), target.mention())
        } else {
            format!(
                "{} and {} are already unlinked!",
                source.mention(),
                target.mention()
            )
        }))
    }

    /// Detaches a channel from all of its neighbours.
    pub async fn unlink_channel(&self, guild_id: GuildId, channel: ChannelId) -> Result<CommandReply> {
        let _guard = self.locks.lock_guild(guild_id).await;
        let Some(mut link) = self.links.get(channel).await? else {
            let reason = if self.registry.get(channel).await?.is_some() {
                "is not linked with any channels!"
            } else {
                "is not a translate channel!"
            };
            return Ok(CommandReply::text(format!(
                "Cannot unlink! {} {reason}",
                channel.mention()
            )));
        };

        let detached = self.engine.unlink_all(&mut link).await?;
        info!(channel_id = %channel, detached = detached.len(), "channel unlinked");
        Ok(CommandReply::text(format!("{} is now unlinked!", channel.mention())))
    }

    // ============== Listings ==============

    pub async fn show_links(&self, guild_id: GuildId, channel: Option<ChannelId>) -> Result<CommandReply> {
        if let Some(id) = channel {
            let Some(tr) = self.registry.get(id).await? else {
                return Ok(CommandReply::text(format!(
                    "Cannot show links, {} is not a translate channel.",
                    id.mention()
                )));
            };
            let content = match self.links.get(id).await? {
                Some(link) => self.describe_links(&link, &tr).await?,
                None => format!("{} is not linked to any channels.", labelled(&tr)),
            };
            return Ok(CommandReply::long(content, self.message_limit));
        }

        let mut all = self.links.list(guild_id).await?;
        if all.is_empty() {
            return Ok(CommandReply::text(
                "Cannot show links, no channels are linked yet.",
            ));
        }
        all.sort_by_key(|l| l.id);

        let mut sections = Vec::with_capacity(all.len());
        for link in &all {
            if let Some(tr) = self.registry.get(link.id).await? {
                sections.push(self.describe_links(link, &tr).await?);
            }
        }
        let content = format!(
            "**Showing all translate channels links**\nThere are a total of {} channels that have links.\n\n{}",
            all.len(),
            sections.join("\n\n")
        );
        Ok(CommandReply::long(content, self.message_limit))
    }

    async fn describe_links(&self, link: &ChannelLink, tr: &TranslateChannel) -> Result<String> {
        let mut out = format!(
            "{} is linked to {} channels: ",
            labelled(tr),
            link.links.len()
        );
        for &id in &link.links {
            let code = self
                .registry
                .get(id)
                .await?
                .map(|c| c.language_code)
                .unwrap_or_else(|| "?".to_string());
            out.push_str(&format!("\n- {} **({code})**", id.mention()));
        }
        Ok(out)
    }

    pub async fn show_channels(&self, guild_id: GuildId) -> Result<CommandReply> {
        let mut channels = self.registry.list(guild_id).await?;
        if channels.is_empty() {
            return Ok(CommandReply::text(
                "There are no translate channels yet. You can start setting them by using the `/set` command.",
            ));
        }
        channels.sort_by_key(|c| c.id);

        let mut lines = Vec::with_capacity(channels.len());
        for channel in &channels {
            let linked = self
                .links
                .get(channel.id)
                .await?
                .map_or(0, |l| l.links.len());
            let suffix = if linked > 0 {
                format!(" and is linked to {linked} translate channels")
            } else {
                " and is **not linked** to any translate channels".to_string()
            };
            lines.push(format!(
                "- {} is set to `{}`{suffix}.",
                channel.id.mention(),
                language_name(&channel.language_code)
            ));
        }
        let content = format!(
            "**Showing all translate channels**\nThere are a total of {} translate channels.\n{}",
            channels.len(),
            lines.join("\n")
        );
        Ok(CommandReply::long(content, self.message_limit))
    }

    // ============== Credentials ==============

    pub async fn usage(&self, guild_id: GuildId) -> Result<CommandReply> {
        let translator = match self.translators.get(guild_id).await {
            Ok(Some(t)) => t,
            Ok(None) => {
                return Ok(CommandReply::text(
                    "Cannot get usage, no api key found. Please sign in using the `/sign-in` command.",
                ))
            }
            Err(e) if e.is_authorization() => {
                return Ok(CommandReply::text(
                    "Cannot get usage, the api key was rejected. Please sign in again using the `/sign-in` command.",
                ))
            }
            Err(e) => return Err(e),
        };

        let usage = match translator.usage().await {
            Ok(Some(usage)) => usage,
            Ok(None) => {
                return Ok(CommandReply::text(
                    "Usage is not available for the configured translation provider.",
                ))
            }
            Err(e) => {
                warn!(guild_id = %guild_id, error = %e, "could not fetch usage");
                return Ok(CommandReply::text("An error occurred. Could not get usage."));
            }
        };
        if usage.limit_reached() {
            return Ok(CommandReply::text("Usage limit has been reached!"));
        }
        Ok(CommandReply::text(format!(
            "Usage count: **{} / {} characters**; Remaining: **{} characters**.",
            group_thousands(usage.count),
            group_thousands(usage.limit),
            group_thousands(usage.remaining())
        )))
    }

    pub async fn sign_in(
        &self,
        guild_id: GuildId,
        provider: ProviderKind,
        api_key: &str,
    ) -> Result<CommandReply> {
        if self.translators.is_signed_in(guild_id).await? {
            return Ok(CommandReply::text(
                "You are already signed in. Please sign out using `/sign-out` command if you wish to sign in with another API key.",
            ));
        }
        let api_key = api_key.trim();
        if api_key.is_empty() {
            return Ok(CommandReply::text(format!(
                "Please provide a {} API key.",
                provider.display_name()
            )));
        }

        match self
            .translators
            .set(guild_id, &[(provider, api_key.to_string())], Some(provider))
            .await
        {
            Ok(_) => {
                info!(guild_id = %guild_id, %provider, "guild signed in");
                Ok(CommandReply::text(
                    "Bot has been successfully signed in. You can now translate!",
                ))
            }
            Err(e) if e.is_authorization() => Ok(CommandReply::text(format!(
                "Bot could not sign in. Invalid {} API key!",
                provider.display_name()
            ))),
            Err(e) => {
                warn!(guild_id = %guild_id, error = %e, "sign in failed");
                Ok(CommandReply::text(
                    "Bot could not sign in. Something went wrong!",
                ))
            }
        }
    }

    pub async fn sign_out(&self, guild_id: GuildId) -> Result<CommandReply> {
        if self.translators.unset(guild_id).await? {
            info!(guild_id = %guild_id, "guild signed out");
            return Ok(CommandReply::text("You have successfully signed out the bot."));
        }
        Ok(CommandReply::text("You are already signed out."))
    }

    pub fn help(&self) -> CommandReply {
        CommandReply::text(HELP)
    }
}

fn language_name(code: &str) -> String {
    by_code(code).map_or_else(|| code.to_string(), |l| l.name.to_string())
}

/// `<#id> **(code)**`
fn labelled(channel: &TranslateChannel) -> String {
    format!("{} **({})**", channel.id.mention(), channel.language_code)
}

fn not_associated(channel: ChannelId) -> String {
    format!(
        "{} is not associated with any languages yet. Please use the `/set` command to set its language.",
        channel.mention()
    )
}

fn not_linked(channel: ChannelId) -> String {
    format!("{} is not linked with any channels!", channel.mention())
}
