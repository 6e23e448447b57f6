use std::{
    collections::{HashMap, HashSet, VecDeque},
    fmt,
    str::FromStr,
    sync::Arc,
};

use tracing::{debug, warn};

use crate::{
    domain::{ChannelId, GuildId},
    errors::Error,
    links::ChannelLinkCache,
    model::{ChannelLink, TranslateChannel},
    registry::TranslateChannelRegistry,
    Result,
};

/// How two channels get connected.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum LinkMode {
    /// Source relays to target only.
    Unidirectional,
    /// Each relays to the other.
    #[default]
    Bidirectional,
    /// Every channel of both components relays to every other.
    Recursive,
}

impl LinkMode {
    pub fn as_str(self) -> &'static str {
        match self {
            LinkMode::Unidirectional => "unidirectional",
            LinkMode::Bidirectional => "bidirectional",
            LinkMode::Recursive => "recursive",
        }
    }
}

impl fmt::Display for LinkMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LinkMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "unidirectional" | "one-way" => Ok(LinkMode::Unidirectional),
            "bidirectional" | "" => Ok(LinkMode::Bidirectional),
            "recursive" => Ok(LinkMode::Recursive),
            other => Err(Error::Config(format!("unknown link mode: {other}"))),
        }
    }
}

/// A channel with both its adjacency record and its language.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ComponentNode {
    pub link: ChannelLink,
    pub channel: TranslateChannel,
}

/// Channels reachable from a seed set, keyed by id, in discovery order.
#[derive(Clone, Debug, Default)]
pub struct ComponentMap {
    order: Vec<ChannelId>,
    nodes: HashMap<ChannelId, ComponentNode>,
}

impl ComponentMap {
    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn contains(&self, id: ChannelId) -> bool {
        self.nodes.contains_key(&id)
    }

    pub fn get(&self, id: ChannelId) -> Option<&ComponentNode> {
        self.nodes.get(&id)
    }

    pub fn ids(&self) -> &[ChannelId] {
        &self.order
    }

    /// Adds a node, or replaces it in place when already present.
    pub fn insert(&mut self, node: ComponentNode) {
        let id = node.link.id;
        if self.nodes.insert(id, node).is_none() {
            self.order.push(id);
        }
    }

    pub fn merge(&mut self, other: ComponentMap) {
        let ComponentMap { order, mut nodes } = other;
        for id in order {
            if let Some(node) = nodes.remove(&id) {
                self.insert(node);
            }
        }
    }
}

/// Mutates the link graph.
///
/// Limit checks happen before any mutation, so a rejected operation leaves
/// every stored record untouched. Concurrent operations on one component are
/// serialised by the caller.
pub struct LinkEngine {
    links: Arc<ChannelLinkCache>,
    registry: Arc<TranslateChannelRegistry>,
    limit: usize,
}

impl LinkEngine {
    pub fn new(
        links: Arc<ChannelLinkCache>,
        registry: Arc<TranslateChannelRegistry>,
        limit: usize,
    ) -> Self {
        Self {
            links,
            registry,
            limit,
        }
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    /// The stored record, or a fresh empty one.
    ///
    /// A fresh record is not persisted until it gains its first edge, so an
    /// empty node is never visible to readers.
    pub async fn get_or_create(&self, id: ChannelId, guild_id: GuildId) -> Result<ChannelLink> {
        Ok(self
            .links
            .get(id)
            .await?
            .unwrap_or_else(|| ChannelLink::new(id, guild_id)))
    }

    /// Breadth-first walk over `links` edges starting from `seeds`.
    ///
    /// Seeds only enter the map when reached through an edge, so a lone seed
    /// yields an empty map. Neighbours without a translate channel are walked
    /// but left out of the map.
    pub async fn build_component_map(&self, seeds: &[ChannelLink]) -> Result<ComponentMap> {
        let mut map = ComponentMap::default();
        let mut visited = HashSet::new();
        let mut queue: VecDeque<ChannelLink> = seeds.iter().cloned().collect();

        while let Some(current) = queue.pop_front() {
            for &neighbour in &current.links {
                if !visited.insert(neighbour) {
                    continue;
                }

                let link = self.get_or_create(neighbour, current.guild_id).await?;
                queue.push_back(link.clone());

                match self.registry.get(neighbour).await? {
                    Some(channel) => map.insert(ComponentNode { link, channel }),
                    None => debug!(channel_id = %neighbour, "skipping stale link target"),
                }
            }
        }

        Ok(map)
    }

    /// Size of the component once `endpoints` join `map`; errors when it
    /// would exceed the limit.
    pub fn check_limit(&self, map: &ComponentMap, endpoints: &[ChannelId]) -> Result<usize> {
        let missing: HashSet<_> = endpoints.iter().filter(|id| !map.contains(**id)).collect();
        let size = map.len() + missing.len();
        if size > self.limit {
            return Err(Error::LimitExceeded {
                limit: self.limit,
                size,
            });
        }
        Ok(size)
    }

    /// Adds `source -> target`. Returns false (and writes nothing) when the
    /// edge already exists.
    pub async fn link_unidirectional(
        &self,
        source: &mut ChannelLink,
        target: &TranslateChannel,
    ) -> Result<bool> {
        if source.id == target.id || source.contains(target.id) {
            return Ok(false);
        }
        source.links.push(target.id);
        self.links.save(source).await?;
        Ok(true)
    }

    pub async fn link_bidirectional(
        &self,
        a: &mut ComponentNode,
        b: &mut ComponentNode,
    ) -> Result<bool> {
        let forward = self.link_unidirectional(&mut a.link, &b.channel).await?;
        let backward = self.link_unidirectional(&mut b.link, &a.channel).await?;
        Ok(forward || backward)
    }

    /// Connects every ordered pair in `map`, then persists each changed node
    /// once.
    pub async fn link_recursive(&self, map: &mut ComponentMap) -> Result<bool> {
        let ids = map.order.clone();
        let mut mutated = Vec::new();

        for source in &ids {
            let Some(node) = map.nodes.get_mut(source) else {
                continue;
            };
            let mut changed = false;
            for target in &ids {
                if target == source || node.link.contains(*target) {
                    continue;
                }
                node.link.links.push(*target);
                changed = true;
            }
            if changed {
                mutated.push(*source);
            }
        }

        for id in &mutated {
            if let Some(node) = map.nodes.get(id) {
                self.links.save(&node.link).await?;
            }
        }

        Ok(!mutated.is_empty())
    }

    /// Removes `link -> other`. The record is deleted when its last edge goes.
    pub async fn unlink_edge(&self, link: &mut ChannelLink, other: ChannelId) -> Result<bool> {
        let before = link.links.len();
        link.links.retain(|id| *id != other);
        if link.links.len() == before {
            return Ok(false);
        }
        self.links.save(link).await?;
        Ok(true)
    }

    /// Detaches `link` from every neighbour in both directions. Each neighbour
    /// is handled on its own; failures are logged and skipped.
    ///
    /// Returns the neighbours that were detached.
    pub async fn unlink_all(&self, link: &mut ChannelLink) -> Result<Vec<ChannelId>> {
        let neighbours = link.links.clone();
        let mut detached = Vec::with_capacity(neighbours.len());

        for neighbour in neighbours {
            let result = async {
                if let Some(mut other) = self.links.get(neighbour).await? {
                    self.unlink_edge(&mut other, link.id).await?;
                }
                self.unlink_edge(link, neighbour).await
            }
            .await;

            match result {
                Ok(_) => detached.push(neighbour),
                Err(e) => warn!(
                    channel_id = %link.id,
                    neighbour_id = %neighbour,
                    error = %e,
                    "failed to unlink neighbour"
                ),
            }
        }

        Ok(detached)
    }
}
