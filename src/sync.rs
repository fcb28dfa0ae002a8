//! Orchestration of resolution cycles.
//!
//! Every triggering event starts a cycle stamped with a monotonically
//! increasing sequence number. Store lookups complete in any order; a
//! completion older than the newest published cycle is discarded, so the
//! surface always ends on the most recently started cycle.
//!
//! The controller never performs I/O. Store round-trips are executed by the
//! caller, and commands for the rendering surface are queued in an outbox
//! that the caller drains.

use crate::cache::ContextTreeCache;
use crate::error::StoreError;
use crate::model::{ContextTree, DocumentSymbol, ItemType, Node, PathIdentity, Position, Product};
use crate::path_chain;
use crate::protocol::{Outbound, TreeView};
use crate::symbols;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, warn};

/// Session-wide values, built once at startup and passed in explicitly.
#[derive(Debug, Clone)]
pub struct SessionContext {
    pub product: Product,
    pub workspace_root: PathBuf,
    pub default_description: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    Idle,
    Resolving,
    Annotating,
    Published,
}

/// One resolution cycle between its start and its completion.
#[derive(Debug, Clone)]
pub struct Cycle {
    seq: u64,
    nodes: Vec<Node>,
    lookups: Vec<PathIdentity>,
}

impl Cycle {
    pub fn seq(&self) -> u64 {
        self.seq
    }

    /// Paths whose descriptions must come from the store.
    pub fn lookups(&self) -> &[PathIdentity] {
        &self.lookups
    }

    pub fn paths(&self) -> Vec<PathIdentity> {
        self.nodes.iter().map(|node| node.path.clone()).collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    Published,
    Stale,
}

/// A validated description edit waiting for its upsert.
#[derive(Debug, Clone)]
pub struct EditRequest {
    node: Node,
}

impl EditRequest {
    /// Node to persist, carrying the new description.
    pub fn node(&self) -> &Node {
        &self.node
    }
}

#[derive(Debug, Error)]
#[error("{0} is not part of the current context tree")]
pub struct EditRejected(pub PathIdentity);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditOutcome {
    Persisted,
    Failed,
}

#[derive(Debug, Clone)]
struct FileContext {
    absolute: PathBuf,
    chain: Vec<Node>,
}

#[derive(Debug, Clone)]
struct CommittedEdit {
    description: String,
    /// Cycles with a lower sequence number started before the edit landed.
    mark: u64,
}

pub struct SyncController {
    context: SessionContext,
    state: SyncState,
    cache: ContextTreeCache,
    file: Option<FileContext>,
    next_seq: u64,
    published_seq: u64,
    latest_target: Vec<PathIdentity>,
    lookups_in_flight: usize,
    edits: HashMap<PathIdentity, CommittedEdit>,
    outbox: Vec<Outbound>,
}

impl SyncController {
    pub fn new(context: SessionContext) -> Self {
        Self {
            context,
            state: SyncState::Idle,
            cache: ContextTreeCache::new(),
            file: None,
            next_seq: 1,
            published_seq: 0,
            latest_target: Vec::new(),
            lookups_in_flight: 0,
            edits: HashMap::new(),
            outbox: Vec::new(),
        }
    }

    pub fn context(&self) -> &SessionContext {
        &self.context
    }

    pub fn state(&self) -> SyncState {
        self.state
    }

    pub fn cache(&self) -> &ContextTreeCache {
        &self.cache
    }

    /// Absolute path of the file the current context was resolved for.
    pub fn active_file(&self) -> Option<&Path> {
        self.file.as_ref().map(|file| file.absolute.as_path())
    }

    pub fn published_seq(&self) -> u64 {
        self.published_seq
    }

    /// Commands queued for the rendering surface since the last drain.
    pub fn drain_outbox(&mut self) -> Vec<Outbound> {
        std::mem::take(&mut self.outbox)
    }

    /// Active file switched. Resets the symbol layer and starts a cycle for
    /// the new directory chain. `None` (no editor) leaves everything as is.
    pub fn file_changed(&mut self, absolute: Option<&Path>) -> Option<Cycle> {
        let absolute = absolute?;
        self.state = SyncState::Resolving;
        let chain = path_chain::resolve(absolute, &self.context.workspace_root);
        if chain.is_empty() {
            debug!("no context for {}", absolute.display());
            self.settle_state();
            return None;
        }

        let last = chain.len() - 1;
        let nodes: Vec<Node> = chain
            .into_iter()
            .enumerate()
            .map(|(idx, path)| {
                let item_type = if idx == last {
                    ItemType::File
                } else {
                    ItemType::Folder
                };
                Node::new(path, item_type, "")
            })
            .collect();

        self.file = Some(FileContext {
            absolute: absolute.to_path_buf(),
            chain: nodes.clone(),
        });
        Some(self.start_cycle(nodes))
    }

    /// Cursor moved inside the active file. Layers the enclosing symbol chain
    /// on top of the file chain. No-op before any file context exists or
    /// when the resulting tree has the same shape as the latest cycle.
    pub fn cursor_changed(
        &mut self,
        forest: Option<&[DocumentSymbol]>,
        position: Position,
    ) -> Option<Cycle> {
        let file = self.file.as_ref()?;
        let leaf = file.chain.last()?.path.clone();
        let mut nodes = file.chain.clone();

        let forest = forest.unwrap_or(&[]);
        let chain = symbols::resolve_chain(forest, position);
        for (path, symbol) in symbols::chain_identities(&leaf, &chain) {
            nodes.push(Node::new(path, symbol.kind.item_type(), ""));
        }

        let target: Vec<PathIdentity> = nodes.iter().map(|node| node.path.clone()).collect();
        if target == self.latest_target {
            return None;
        }
        self.state = SyncState::Resolving;
        Some(self.start_cycle(nodes))
    }

    fn start_cycle(&mut self, mut nodes: Vec<Node>) -> Cycle {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.latest_target = nodes.iter().map(|node| node.path.clone()).collect();

        let mut lookups = Vec::new();
        for node in nodes.iter_mut() {
            match self.cache.get(&node.path) {
                Some(cached) => node.description = cached.description.clone(),
                None => lookups.push(node.path.clone()),
            }
        }

        if !lookups.is_empty() {
            if self.lookups_in_flight == 0 {
                self.outbox.push(Outbound::SetLoading { is_loading: true });
            }
            self.lookups_in_flight += 1;
            self.state = SyncState::Annotating;
        }
        debug!("cycle {} started with {} lookups", seq, lookups.len());

        Cycle {
            seq,
            nodes,
            lookups,
        }
    }

    /// Finish a cycle with the result of its store lookup. Failed lookups
    /// fall back to the default description instead of blocking the tree.
    pub fn complete(
        &mut self,
        cycle: Cycle,
        fetched: Result<HashMap<PathIdentity, Option<String>>, StoreError>,
    ) -> CycleOutcome {
        if !cycle.lookups.is_empty() {
            self.lookups_in_flight = self.lookups_in_flight.saturating_sub(1);
            if self.lookups_in_flight == 0 {
                self.outbox.push(Outbound::SetLoading { is_loading: false });
            }
        }

        if cycle.seq < self.published_seq {
            debug!(
                "discarding cycle {} (already published {})",
                cycle.seq, self.published_seq
            );
            self.settle_state();
            return CycleOutcome::Stale;
        }

        let fetched = match fetched {
            Ok(found) => found,
            Err(err) => {
                warn!("description lookup failed for cycle {}: {}", cycle.seq, err);
                HashMap::new()
            }
        };

        let looked_up: HashSet<&PathIdentity> = cycle.lookups.iter().collect();
        let mut tree: ContextTree = Vec::with_capacity(cycle.nodes.len());
        for mut node in cycle.nodes {
            if looked_up.contains(&node.path) {
                node.description = fetched
                    .get(&node.path)
                    .cloned()
                    .flatten()
                    .unwrap_or_else(|| self.context.default_description.clone());
            }
            if let Some(edit) = self.edits.get(&node.path) {
                if cycle.seq < edit.mark {
                    node.description = edit.description.clone();
                }
            }
            tree.push(node);
        }

        self.cache.replace(tree);
        self.published_seq = cycle.seq;
        let published = self.published_seq;
        self.edits.retain(|_, edit| edit.mark > published + 1);
        self.publish_snapshot();
        self.settle_state();
        CycleOutcome::Published
    }

    /// Validate a user edit against the current tree.
    pub fn begin_edit(
        &mut self,
        path: &PathIdentity,
        description: &str,
    ) -> Result<EditRequest, EditRejected> {
        let Some(cached) = self.cache.get(path) else {
            warn!("rejecting edit for {}: not in the current context tree", path);
            return Err(EditRejected(path.clone()));
        };
        let mut node = cached.clone();
        node.description = description.to_string();
        Ok(EditRequest { node })
    }

    /// Apply the result of an edit's upsert. Success patches the cache in
    /// place; the surface already shows the edit, so nothing is re-sent.
    /// Failure leaves the cache alone, notifies the user and re-sends the
    /// stored state.
    pub fn complete_edit(
        &mut self,
        edit: EditRequest,
        result: Result<(), StoreError>,
    ) -> EditOutcome {
        let node = edit.node;
        match result {
            Ok(()) => {
                self.cache.patch_description(&node.path, &node.description);
                if self.next_seq > self.published_seq + 1 {
                    // Older cycles still in flight must not bring back the
                    // previous description.
                    self.edits.insert(
                        node.path.clone(),
                        CommittedEdit {
                            description: node.description.clone(),
                            mark: self.next_seq,
                        },
                    );
                }
                debug!("description for {} persisted", node.path);
                EditOutcome::Persisted
            }
            Err(err) => {
                warn!("failed to persist description for {}: {}", node.path, err);
                self.outbox.push(Outbound::error(format!(
                    "Description for {} was not saved: {}",
                    node.path, err
                )));
                self.publish_snapshot();
                EditOutcome::Failed
            }
        }
    }

    /// Re-send the cached tree, e.g. when the surface becomes visible again.
    pub fn redraw(&mut self) {
        self.publish_snapshot();
    }

    fn publish_snapshot(&mut self) {
        self.outbox.push(Outbound::UpdateInfo {
            data: TreeView {
                tree: self.cache.snapshot(),
                selected_symbol: self.cache.focused().cloned(),
            },
        });
    }

    fn settle_state(&mut self) {
        self.state = if self.lookups_in_flight > 0 {
            SyncState::Annotating
        } else if self.published_seq > 0 {
            SyncState::Published
        } else {
            SyncState::Idle
        };
    }
}
